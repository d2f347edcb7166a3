//! Persisted subscription list.

mod subscriptions;

pub use subscriptions::{load, parse, render, save, StorageError, Subscription};
