//! Feed aggregation core: streaming markup dispatch, RSS/Atom normalization,
//! per-feed refresh state and an ordered, persisted feed registry.

pub mod config;
pub mod feed;
pub mod markup;
pub mod model;
pub mod registry;
pub mod storage;

pub use config::Config;
pub use feed::{Fetcher, HttpFetcher, RefreshError, RefreshOptions};
pub use model::{Feed, FeedId, Item, RefreshState};
pub use registry::{Listener, Registry};
