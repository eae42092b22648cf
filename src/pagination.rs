//! Offset/limit paging over the task list.

use crate::cache::QueryKey;

/// Page sizes reachable with `+` / `-` in the list view
pub const PAGE_SIZES: [u64; 4] = [10, 20, 30, 50];

/// The visible window of a paged list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
  limit: u64,
  skip: u64,
}

impl Pager {
  pub fn new(limit: u64) -> Self {
    Self {
      limit: limit.max(1),
      skip: 0,
    }
  }

  pub fn limit(&self) -> u64 {
    self.limit
  }

  pub fn skip(&self) -> u64 {
    self.skip
  }

  pub fn key(&self) -> QueryKey {
    QueryKey::list(self.limit, self.skip)
  }

  pub fn has_next(&self, total: u64) -> bool {
    self.skip + self.limit < total
  }

  pub fn has_prev(&self) -> bool {
    self.skip > 0
  }

  /// Move one window forward. Returns false at the last page.
  pub fn next(&mut self, total: u64) -> bool {
    if !self.has_next(total) {
      return false;
    }
    self.skip += self.limit;
    true
  }

  /// Move one window back. Returns false at the first page.
  pub fn prev(&mut self) -> bool {
    if !self.has_prev() {
      return false;
    }
    self.skip = self.skip.saturating_sub(self.limit);
    true
  }

  /// Changing the page size always returns to the first page.
  pub fn set_limit(&mut self, limit: u64) {
    self.limit = limit.max(1);
    self.skip = 0;
  }

  pub fn page_count(&self, total: u64) -> u64 {
    total.div_ceil(self.limit)
  }

  /// One-based number of the current page
  pub fn current_page(&self) -> u64 {
    self.skip / self.limit + 1
  }

  /// One-based range of records shown, e.g. `(11, 20)`. None for an empty
  /// list or a window past the end.
  pub fn showing(&self, total: u64) -> Option<(u64, u64)> {
    if self.skip >= total {
      return None;
    }
    Some((self.skip + 1, (self.skip + self.limit).min(total)))
  }

  /// Step back while the window starts past the end of the list, so a
  /// delete that empties the last page lands on the one before it.
  /// Returns true if the window moved.
  pub fn clamp_to(&mut self, total: u64) -> bool {
    let before = self.skip;
    while self.skip > 0 && self.skip >= total {
      self.skip = self.skip.saturating_sub(self.limit);
    }
    self.skip != before
  }
}

/// The page size after `current` in `PAGE_SIZES`, wrapping around.
/// Sizes not in the list jump to the first larger one.
pub fn next_page_size(current: u64) -> u64 {
  PAGE_SIZES
    .iter()
    .copied()
    .find(|size| *size > current)
    .unwrap_or(PAGE_SIZES[0])
}

pub fn prev_page_size(current: u64) -> u64 {
  PAGE_SIZES
    .iter()
    .rev()
    .copied()
    .find(|size| *size < current)
    .unwrap_or(PAGE_SIZES[PAGE_SIZES.len() - 1])
}
