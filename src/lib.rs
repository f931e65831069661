//! Client-side resilience layer for data dashboards.
//!
//! Sits between UI components and a backend API and provides:
//!
//! - response and error normalization ([`normalize`])
//! - a retry policy with capped exponential backoff ([`retry`])
//! - a short-lived TTL cache and a persisted query cache ([`cache`])
//! - a bounded undo/redo history of user actions ([`history`])
//!
//! [`Resilience`] ties them together for an application.

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod logging;
pub mod normalize;
pub mod query;
pub mod retry;

pub use config::Config;
pub use context::Resilience;
pub use error::RequestError;
pub use normalize::{normalize_error, normalize_response, NormalizedError};
pub use query::{Query, QueryState};
pub use retry::{run_with_retry, AbortSignal, RetryPolicy};
