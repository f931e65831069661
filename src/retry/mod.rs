//! Retry decisions for failed requests.
//!
//! [`RetryPolicy`] answers "should this failure be retried, and after how long",
//! taking the client's network state into account. [`run_with_retry`] drives an
//! async operation through that policy on the tokio timer.

mod executor;
mod network;
mod policy;

pub use executor::{run_with_retry, AbortSignal};
pub use network::{AlwaysOnline, NetworkMonitor, NetworkState};
pub use policy::{is_transient_network_error, RetryPolicy};
