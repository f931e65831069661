//! Async retry loop driven by a [`RetryPolicy`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::error::RequestError;

use super::policy::RetryPolicy;

/// Cancellation flag shared between a request and whoever may abort it.
///
/// Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
  inner: Arc<AbortInner>,
}

#[derive(Debug, Default)]
struct AbortInner {
  aborted: AtomicBool,
  notify: Notify,
}

impl AbortSignal {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn abort(&self) {
    self.inner.aborted.store(true, Ordering::SeqCst);
    self.inner.notify.notify_waiters();
  }

  pub fn is_aborted(&self) -> bool {
    self.inner.aborted.load(Ordering::SeqCst)
  }

  /// Resolves once `abort` has been called.
  pub async fn aborted(&self) {
    loop {
      let notified = self.inner.notify.notified();
      if self.is_aborted() {
        return;
      }
      notified.await;
    }
  }
}

/// Run `operation` until it succeeds, the policy gives up, or `abort` fires.
///
/// The last failure is returned unchanged when retries stop; only
/// intermediate failures are absorbed.
pub async fn run_with_retry<T, F, Fut>(
  policy: &RetryPolicy,
  abort: Option<&AbortSignal>,
  mut operation: F,
) -> Result<T, RequestError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, RequestError>>,
{
  let mut failure_count = 0u32;

  loop {
    let error = match operation().await {
      Ok(value) => {
        if failure_count > 0 {
          tracing::debug!(retries = failure_count, "request succeeded after retrying");
        }
        return Ok(value);
      }
      Err(e) => e,
    };

    if abort.is_some_and(AbortSignal::is_aborted) {
      tracing::debug!("request aborted, not retrying");
      return Err(error);
    }

    if !policy.should_retry(failure_count, &error) {
      return Err(error);
    }

    let delay = policy.backoff_delay(failure_count);
    tracing::warn!(
      attempt = failure_count + 1,
      delay_ms = delay.as_millis() as u64,
      error = %error,
      "request failed, retrying"
    );

    match abort {
      Some(signal) => {
        tokio::select! {
          _ = tokio::time::sleep(delay) => {}
          _ = signal.aborted() => {
            tracing::debug!("request aborted during backoff");
            return Err(error);
          }
        }
      }
      None => tokio::time::sleep(delay).await,
    }

    failure_count += 1;
  }
}
