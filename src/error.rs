//! Failure types produced by the network transport.

use serde_json::Value;
use thiserror::Error;

/// A failed request, as reported by the transport.
#[derive(Debug, Clone, Error)]
pub enum RequestError {
  /// The server answered with a non-success status.
  #[error("HTTP {status}: {message}")]
  Http {
    status: u16,
    message: String,
    /// Decoded JSON body, if the server sent one
    body: Option<Value>,
  },
  /// The connection could not be established or was dropped.
  #[error("network error: {0}")]
  Network(String),
  /// The request timed out or was aborted by the transport.
  #[error("request timed out: {0}")]
  Timeout(String),
  /// Anything the transport could not classify.
  #[error("{0}")]
  Other(String),
}

impl RequestError {
  /// Build an HTTP failure from a status code and an optional decoded body.
  pub fn from_status(status: u16, body: Option<Value>) -> Self {
    let message = body
      .as_ref()
      .and_then(|b| first_string_field(b, &["detail", "message", "error"]))
      .or_else(|| status_text(status).map(String::from))
      .unwrap_or_else(|| format!("status {}", status));

    Self::Http {
      status,
      message,
      body,
    }
  }

  /// Build a failure from a non-success `reqwest` response, decoding its body when possible.
  pub async fn from_response(response: reqwest::Response) -> Self {
    let status = response.status().as_u16();
    let body = response.json::<Value>().await.ok();
    Self::from_status(status, body)
  }

  /// HTTP status carried by this failure, if any.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Http { status, .. } => Some(*status),
      _ => None,
    }
  }

  /// Decoded response body carried by this failure, if any.
  pub fn body(&self) -> Option<&Value> {
    match self {
      Self::Http { body, .. } => body.as_ref(),
      _ => None,
    }
  }

  /// The human-readable part of the failure, without the variant prefix.
  pub fn message(&self) -> &str {
    match self {
      Self::Http { message, .. } => message,
      Self::Network(m) | Self::Timeout(m) | Self::Other(m) => m,
    }
  }
}

impl From<reqwest::Error> for RequestError {
  fn from(err: reqwest::Error) -> Self {
    let message = err.to_string();
    if err.is_timeout() {
      Self::Timeout(message)
    } else if err.is_connect() {
      Self::Network(message)
    } else if let Some(status) = err.status() {
      Self::Http {
        status: status.as_u16(),
        message,
        body: None,
      }
    } else {
      Self::Other(message)
    }
  }
}

/// Classification of a failure for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
  /// HTTP 4xx other than 429; never retried
  ClientError,
  /// HTTP 429; retried under the normal budget
  RateLimited,
  /// HTTP 5xx; retried under the normal budget
  ServerError,
  /// Timeout or connection failure; retried at most once
  TransientNetwork,
  /// The client reports itself offline; never retried
  Offline,
  /// Anything else; retried under the normal budget
  Unclassified,
}

impl FailureClass {
  /// Classify a failure without consulting the network-state signal.
  pub fn of(error: &RequestError) -> Self {
    match error {
      RequestError::Http { status: 429, .. } => Self::RateLimited,
      RequestError::Http { status, .. } if (400..500).contains(status) => Self::ClientError,
      RequestError::Http { status, .. } if *status >= 500 => Self::ServerError,
      RequestError::Network(_) | RequestError::Timeout(_) => Self::TransientNetwork,
      _ => Self::Unclassified,
    }
  }
}

/// Canonical reason phrase for common HTTP status codes.
pub fn status_text(status: u16) -> Option<&'static str> {
  let text = match status {
    400 => "Bad Request",
    401 => "Unauthorized",
    403 => "Forbidden",
    404 => "Not Found",
    408 => "Request Timeout",
    409 => "Conflict",
    422 => "Unprocessable Entity",
    429 => "Too Many Requests",
    500 => "Internal Server Error",
    502 => "Bad Gateway",
    503 => "Service Unavailable",
    504 => "Gateway Timeout",
    _ => return None,
  };
  Some(text)
}

/// First field among `names` that holds a string.
pub(crate) fn first_string_field(value: &Value, names: &[&str]) -> Option<String> {
  names
    .iter()
    .find_map(|name| value.get(*name).and_then(Value::as_str))
    .map(String::from)
}
