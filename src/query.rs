//! Async query abstraction for data fetching with retry support.
//!
//! A `Query<T>` owns a fetcher closure, runs it through the retry policy on a
//! spawned task and exposes the outcome as a small state machine that a UI
//! tick can poll.
//!
//! # Example
//!
//! ```ignore
//! let api = api_client.clone();
//! let mut query = Query::new(policy.clone(), move || {
//!     let api = api.clone();
//!     async move { api.get_json("/customers").await }
//! });
//!
//! // Start fetching
//! query.fetch();
//!
//! // In the event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! match query.state() {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success(data) => render_data(data),
//!     QueryState::Error(e) => render_error(&e.message),
//!     QueryState::Idle => {}
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::RequestError;
use crate::normalize::{normalize_error, NormalizedError};
use crate::retry::{run_with_retry, AbortSignal, RetryPolicy};

/// The state of a query
#[derive(Debug, Clone)]
pub enum QueryState<T> {
  /// Query has not been started
  Idle,
  /// Query is fetching, possibly between retries
  Loading,
  /// Query completed successfully
  Success(T),
  /// Query failed after exhausting its retries
  Error(NormalizedError),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&NormalizedError> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, RequestError>> + Send>>;

type FetcherFn<T> = Arc<dyn Fn() -> BoxFuture<T> + Send + Sync>;

pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(60);

/// Async query for data fetching with state management.
pub struct Query<T> {
  state: QueryState<T>,
  /// State before the pending fetch started, restored by `cancel`
  settled: Option<QueryState<T>>,
  fetcher: FetcherFn<T>,
  policy: RetryPolicy,
  receiver: Option<mpsc::UnboundedReceiver<Result<T, RequestError>>>,
  abort: Option<AbortSignal>,
  fetched_at: Option<Instant>,
  stale_time: Duration,
}

impl<T: Send + 'static> Query<T> {
  /// Create a new query with the given retry policy and fetcher.
  ///
  /// The fetcher is called once per attempt, so a fetch that is retried
  /// three times calls it four times.
  pub fn new<F, Fut>(policy: RetryPolicy, fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, RequestError>> + Send + 'static,
  {
    Self {
      state: QueryState::Idle,
      settled: None,
      fetcher: Arc::new(move || Box::pin(fetcher())),
      policy,
      receiver: None,
      abort: None,
      fetched_at: None,
      stale_time: DEFAULT_STALE_TIME,
    }
  }

  /// After this duration successful data counts as stale.
  pub fn with_stale_time(mut self, duration: Duration) -> Self {
    self.stale_time = duration;
    self
  }

  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  pub fn is_success(&self) -> bool {
    self.state.is_success()
  }

  pub fn is_error(&self) -> bool {
    self.state.is_error()
  }

  pub fn error(&self) -> Option<&NormalizedError> {
    self.state.error()
  }

  /// Check if the data is stale (older than stale_time).
  pub fn is_stale(&self) -> bool {
    match &self.state {
      QueryState::Success(_) => self
        .fetched_at
        .map(|t| t.elapsed() > self.stale_time)
        .unwrap_or(true),
      _ => false,
    }
  }

  /// Start fetching data if not already loading.
  pub fn fetch(&mut self) {
    if self.state.is_loading() {
      return;
    }
    self.start_fetch();
  }

  /// Force a refetch, even if already loading or data exists.
  ///
  /// A pending fetch stops retrying and its result is discarded.
  pub fn refetch(&mut self) {
    self.cancel_pending();
    self.start_fetch();
  }

  /// Abort the pending fetch, if any, and return to the state it replaced
  /// (`Idle` when nothing had settled yet).
  pub fn cancel(&mut self) {
    if self.cancel_pending() && self.state.is_loading() {
      self.state = self.settled.take().unwrap_or(QueryState::Idle);
    }
  }

  /// Poll for results from a pending fetch.
  ///
  /// Returns `true` if the state changed. Call this in the event loop tick.
  pub fn poll(&mut self) -> bool {
    let receiver = match &mut self.receiver {
      Some(rx) => rx,
      None => return false,
    };

    match receiver.try_recv() {
      Ok(Ok(data)) => {
        self.state = QueryState::Success(data);
        self.fetched_at = Some(Instant::now());
      }
      Ok(Err(error)) => {
        self.state = QueryState::Error(normalize_error(&error));
      }
      Err(mpsc::error::TryRecvError::Empty) => return false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        // Task ended without sending, e.g. it panicked
        self.state = QueryState::Error(normalize_error(&RequestError::Other(
          "Query was cancelled".to_string(),
        )));
      }
    }

    self.receiver = None;
    self.abort = None;
    self.settled = None;
    true
  }

  fn cancel_pending(&mut self) -> bool {
    if let Some(signal) = self.abort.take() {
      signal.abort();
    }
    self.receiver.take().is_some()
  }

  fn start_fetch(&mut self) {
    let (tx, rx) = mpsc::unbounded_channel();
    let abort = AbortSignal::new();
    self.receiver = Some(rx);
    self.abort = Some(abort.clone());
    let prior = std::mem::replace(&mut self.state, QueryState::Loading);
    if !prior.is_loading() {
      self.settled = Some(prior);
    }

    let fetcher = self.fetcher.clone();
    let policy = self.policy.clone();
    tokio::spawn(async move {
      let result = run_with_retry(&policy, Some(&abort), || fetcher()).await;
      // Receiver is gone if the query was refetched or dropped
      let _ = tx.send(result);
    });
  }
}

impl<T> Drop for Query<T> {
  fn drop(&mut self) {
    if let Some(signal) = self.abort.take() {
      signal.abort();
    }
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("state", &self.state)
      .field("fetched_at", &self.fetched_at)
      .field("stale_time", &self.stale_time)
      .finish_non_exhaustive()
  }
}
