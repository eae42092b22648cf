//! Structural cache keys.

use std::fmt;

/// Identifies one cached read.
///
/// Equality is structural: two queries for the same page window or the same
/// record always land in the same cache slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryKey {
  /// A page of the full task list
  List { limit: u64, skip: u64 },
  /// Every task belonging to one owner
  Owner { owner_id: u64 },
  /// A single task by id
  Detail { id: u64 },
  /// A random task, fetched on demand
  Random,
}

impl QueryKey {
  pub fn list(limit: u64, skip: u64) -> Self {
    Self::List { limit, skip }
  }

  pub fn detail(id: u64) -> Self {
    Self::Detail { id }
  }

  /// List queries hold a `TaskListPage` and take part in mutation patches.
  pub fn is_list(&self) -> bool {
    matches!(self, Self::List { .. } | Self::Owner { .. })
  }

  pub fn is_detail(&self) -> bool {
    matches!(self, Self::Detail { .. })
  }

  pub fn detail_id(&self) -> Option<u64> {
    match self {
      Self::Detail { id } => Some(*id),
      _ => None,
    }
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::List { limit, skip } => write!(f, "tasks?limit={}&skip={}", limit, skip),
      Self::Owner { owner_id } => write!(f, "tasks/owner/{}", owner_id),
      Self::Detail { id } => write!(f, "tasks/{}", id),
      Self::Random => f.write_str("tasks/random"),
    }
  }
}

/// Selects a group of cache entries for invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
  All,
  /// `List` and `Owner` entries
  Lists,
  Details,
  Exact(QueryKey),
}

impl KeyPattern {
  pub fn matches(&self, key: &QueryKey) -> bool {
    match self {
      Self::All => true,
      Self::Lists => key.is_list(),
      Self::Details => key.is_detail(),
      Self::Exact(exact) => exact == key,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  #[test]
  fn test_equal_windows_share_a_slot() {
    let mut slots = HashMap::new();
    slots.insert(QueryKey::list(10, 0), "first");
    slots.insert(QueryKey::List { skip: 0, limit: 10 }, "second");
    assert_eq!(slots.len(), 1);
    assert_eq!(slots[&QueryKey::list(10, 0)], "second");
  }

  #[test]
  fn test_canonical_display() {
    assert_eq!(QueryKey::list(10, 20).to_string(), "tasks?limit=10&skip=20");
    assert_eq!(QueryKey::Owner { owner_id: 3 }.to_string(), "tasks/owner/3");
    assert_eq!(QueryKey::detail(7).to_string(), "tasks/7");
    assert_eq!(QueryKey::Random.to_string(), "tasks/random");
  }

  #[test]
  fn test_patterns() {
    let list = QueryKey::list(30, 0);
    let owner = QueryKey::Owner { owner_id: 1 };
    let detail = QueryKey::detail(1);

    assert!(KeyPattern::Lists.matches(&list));
    assert!(KeyPattern::Lists.matches(&owner));
    assert!(!KeyPattern::Lists.matches(&detail));
    assert!(!KeyPattern::Lists.matches(&QueryKey::Random));
    assert!(KeyPattern::Details.matches(&detail));
    assert!(KeyPattern::All.matches(&QueryKey::Random));
    assert!(KeyPattern::Exact(list.clone()).matches(&list));
    assert!(!KeyPattern::Exact(list).matches(&QueryKey::list(30, 30)));
  }
}
