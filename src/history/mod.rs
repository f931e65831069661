mod action;
mod manager;

pub use action::{Action, ActionKind, Change};
pub use manager::{ActionApplier, ActionHistory, DEFAULT_CAPACITY};
