use std::sync::Arc;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{FailureClass, RequestError};

use super::network::{AlwaysOnline, NetworkState};

/// Decides whether a failed request is retried and how long to wait first.
#[derive(Clone)]
pub struct RetryPolicy {
  config: RetryConfig,
  network: Arc<dyn NetworkState>,
}

impl RetryPolicy {
  pub fn new(config: RetryConfig, network: Arc<dyn NetworkState>) -> Self {
    Self { config, network }
  }

  /// Default budgets, never reporting offline.
  pub fn always_online() -> Self {
    Self::new(RetryConfig::default(), Arc::new(AlwaysOnline))
  }

  pub fn config(&self) -> &RetryConfig {
    &self.config
  }

  /// Classify a failure, taking the network-state signal into account.
  pub fn classify(&self, error: &RequestError) -> FailureClass {
    if self.network.is_offline() {
      return FailureClass::Offline;
    }
    FailureClass::of(error)
  }

  /// `failure_count` is the number of retries already made for this request.
  pub fn should_retry(&self, failure_count: u32, error: &RequestError) -> bool {
    match self.classify(error) {
      FailureClass::Offline => {
        tracing::debug!("network is offline, skipping retry");
        false
      }
      FailureClass::ClientError => false,
      // The offline signal can be wrong, so connectivity failures get a
      // smaller budget than server errors.
      FailureClass::TransientNetwork => failure_count < self.config.max_network_retries,
      FailureClass::RateLimited | FailureClass::ServerError | FailureClass::Unclassified => {
        failure_count < self.config.max_retries
      }
    }
  }

  /// `min(base * 2^attempt, cap)`; saturates instead of overflowing.
  pub fn backoff_delay(&self, attempt: u32) -> Duration {
    let cap = self.config.max_delay();
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    self
      .config
      .base_delay()
      .checked_mul(factor)
      .map_or(cap, |delay| delay.min(cap))
  }
}

impl std::fmt::Debug for RetryPolicy {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RetryPolicy")
      .field("config", &self.config)
      .field("offline", &self.network.is_offline())
      .finish()
  }
}

/// Whether a failure is a connectivity problem rather than a server answer.
///
/// Looser than the policy's own classification: untyped failures whose
/// message points at the network also count.
pub fn is_transient_network_error(error: &RequestError) -> bool {
  match error {
    RequestError::Network(_) | RequestError::Timeout(_) => true,
    RequestError::Other(message) => {
      let lower = message.to_lowercase();
      lower.contains("network") || lower.contains("timeout") || message.contains("ECONN")
    }
    RequestError::Http { .. } => false,
  }
}
