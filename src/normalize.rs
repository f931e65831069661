//! Canonicalization of response and error envelopes.
//!
//! Backends answer either with a bare payload or with an envelope such as
//! `{ "success": true, "data": ... }`. Everything downstream (caches, views)
//! works with the bare payload, so bodies pass through [`normalize_response`]
//! before they are stored. Failures go through [`normalize_error`] before they
//! reach the UI.

use serde::Serialize;
use serde_json::Value;

use crate::error::{first_string_field, status_text, RequestError};

const DEFAULT_ERROR_MESSAGE: &str = "API request failed";
const DEFAULT_ERROR_STATUS: u16 = 500;

/// Return the canonical payload of a decoded response body, or `None`.
///
/// Rules, in order:
/// 1. absent or `null` input yields `None`
/// 2. an object with `success: false` yields `None`
/// 3. an object with a `data` field yields that field's value
/// 4. anything else is already the payload
pub fn normalize_response(response: Option<Value>) -> Option<Value> {
  let response = response?;

  match response {
    Value::Null => None,
    Value::Object(mut map) => {
      if map.get("success") == Some(&Value::Bool(false)) {
        return None;
      }
      match map.remove("data") {
        Some(Value::Null) => None,
        Some(data) => Some(data),
        None => Some(Value::Object(map)),
      }
    }
    other => Some(other),
  }
}

/// Whether a response body represents a successful call.
pub fn is_success_response(response: &Value) -> bool {
  match response.get("success") {
    Some(Value::Bool(flag)) => *flag,
    _ => !response.is_null(),
  }
}

/// Check that a response carries every expected key, either at the top level
/// or inside its `data` envelope.
pub fn validate_response(response: &Value, expected_keys: &[&str]) -> bool {
  let Some(map) = response.as_object() else {
    return false;
  };

  if expected_keys.iter().all(|key| map.contains_key(*key)) {
    return true;
  }

  match map.get("data").and_then(Value::as_object) {
    Some(data) => expected_keys.iter().all(|key| data.contains_key(*key)),
    None => false,
  }
}

/// Error shape handed to the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedError {
  pub message: String,
  pub status_code: u16,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub correlation_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<Value>,
}

/// Turn a transport failure into a [`NormalizedError`].
pub fn normalize_error(error: &RequestError) -> NormalizedError {
  match error {
    RequestError::Http {
      status,
      message,
      body,
    } => {
      let body = body.as_ref();
      let message = body
        .and_then(|b| first_string_field(b, &["detail", "message", "error"]))
        .or_else(|| (!message.is_empty()).then(|| message.clone()))
        .or_else(|| status_text(*status).map(String::from))
        .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string());

      NormalizedError {
        message,
        status_code: *status,
        correlation_id: body.and_then(|b| first_string_field(b, &["correlation_id", "correlationId"])),
        details: body.and_then(|b| b.get("details").or_else(|| b.get("errors")).cloned()),
      }
    }
    other => {
      let message = other.message();
      NormalizedError {
        message: if message.is_empty() {
          DEFAULT_ERROR_MESSAGE.to_string()
        } else {
          message.to_string()
        },
        status_code: DEFAULT_ERROR_STATUS,
        correlation_id: None,
        details: None,
      }
    }
  }
}

/// Broad category of a failure, used to pick user-facing wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
  Network,
  Server,
  Validation,
  Authentication,
  Authorization,
  Unknown,
}

impl ErrorCategory {
  pub fn user_message(self) -> &'static str {
    match self {
      Self::Network => {
        "Unable to connect to the server. Please check your internet connection and try again."
      }
      Self::Server => "The server encountered an error. Please try again in a few moments.",
      Self::Validation => {
        "The request contains invalid data. Please check your input and try again."
      }
      Self::Authentication => "Your session has expired. Please log in again.",
      Self::Authorization => "You don't have permission to perform this action.",
      Self::Unknown => {
        "An unexpected error occurred. Please try again or contact support if the problem persists."
      }
    }
  }

  pub fn recovery_suggestion(self) -> &'static str {
    match self {
      Self::Network => {
        "Check your internet connection, verify the server is accessible, and try again."
      }
      Self::Server => "Wait a few moments and try again. If the problem persists, contact support.",
      Self::Validation => {
        "Review the form fields for errors and ensure all required fields are filled correctly."
      }
      Self::Authentication => "Please log out and log back in to refresh your session.",
      Self::Authorization => {
        "Contact your administrator if you believe you should have access to this feature."
      }
      Self::Unknown => {
        "Try refreshing the page. If the problem continues, contact support with the error details."
      }
    }
  }

  /// Network and server failures are worth retrying by hand.
  pub fn is_retryable(self) -> bool {
    matches!(self, Self::Network | Self::Server)
  }
}

pub fn categorize_error(error: &RequestError) -> ErrorCategory {
  match error {
    RequestError::Network(_) | RequestError::Timeout(_) => ErrorCategory::Network,
    RequestError::Http { status: 401, .. } => ErrorCategory::Authentication,
    RequestError::Http { status: 403, .. } => ErrorCategory::Authorization,
    RequestError::Http { status, .. } if (400..500).contains(status) => ErrorCategory::Validation,
    RequestError::Http { status, .. } if *status >= 500 => ErrorCategory::Server,
    _ => ErrorCategory::Unknown,
  }
}

/// Everything an error banner needs to render a failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
  pub category: ErrorCategory,
  pub user_message: String,
  pub technical_message: String,
  pub recovery_suggestion: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub correlation_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status_code: Option<u16>,
  pub retryable: bool,
}

pub fn error_details(error: &RequestError) -> ErrorDetails {
  let category = categorize_error(error);
  let normalized = normalize_error(error);

  ErrorDetails {
    category,
    user_message: category.user_message().to_string(),
    technical_message: technical_message(error),
    recovery_suggestion: category.recovery_suggestion().to_string(),
    correlation_id: normalized.correlation_id,
    status_code: error.status(),
    retryable: category.is_retryable(),
  }
}

fn technical_message(error: &RequestError) -> String {
  match error {
    RequestError::Http {
      status, message, ..
    } => format!("API Error {}: {}", status, message),
    RequestError::Timeout(m) => format!("Request timeout: {}", m),
    RequestError::Network(m) => format!("Network error: {}", m),
    RequestError::Other(m) if m.is_empty() => "Unknown error".to_string(),
    RequestError::Other(m) => m.clone(),
  }
}
