use thiserror::Error;

/// Failures talking to the task service.
///
/// `Clone` so that a single failed fetch can be handed to every caller that
/// joined it, and stored on the cache entry it was populating.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
  /// The round-trip could not complete (DNS, connect, timeout, reset)
  #[error("network error: {0}")]
  Network(String),
  /// The service answered with a non-2xx status. The body is opaque.
  #[error("HTTP error! status: {status} ({message})")]
  Status { status: u16, message: String },
  /// The payload did not match the expected shape
  #[error("failed to decode {context}: {message}")]
  Decode {
    context: &'static str,
    message: String,
  },
  /// The background task running the request went away before finishing
  #[error("request aborted: {0}")]
  Aborted(String),
}

impl ApiError {
  pub fn from_status(status: reqwest::StatusCode) -> Self {
    Self::Status {
      status: status.as_u16(),
      message: status
        .canonical_reason()
        .unwrap_or("unknown status")
        .to_string(),
    }
  }

  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Status { status, .. } => Some(*status),
      _ => None,
    }
  }

  /// Whether a read may be attempted again after this failure.
  pub fn is_retryable(&self) -> bool {
    match self {
      Self::Network(_) => true,
      Self::Status { status, .. } => *status == 429 || *status >= 500,
      Self::Decode { .. } | Self::Aborted(_) => false,
    }
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(e: reqwest::Error) -> Self {
    match e.status() {
      Some(status) => Self::from_status(status),
      None => Self::Network(e.to_string()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_from_status_keeps_numeric_code() {
    let err = ApiError::from_status(reqwest::StatusCode::NOT_FOUND);
    assert_eq!(err.status(), Some(404));
    assert!(err.to_string().contains("404"));
  }

  #[test]
  fn test_retryable_classification() {
    assert!(ApiError::Network("reset".into()).is_retryable());
    assert!(ApiError::from_status(reqwest::StatusCode::SERVICE_UNAVAILABLE).is_retryable());
    assert!(ApiError::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS).is_retryable());
    assert!(!ApiError::from_status(reqwest::StatusCode::NOT_FOUND).is_retryable());
    assert!(!ApiError::Decode {
      context: "task",
      message: "missing field".into()
    }
    .is_retryable());
  }
}
