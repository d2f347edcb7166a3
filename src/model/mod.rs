//! Canonical feed and item model.
//!
//! - [`Item`]: one normalized entry, regardless of RSS or Atom origin
//! - [`Feed`]: a source with its items, read-id set and refresh state machine

mod item;
mod source;

pub use item::Item;
pub use source::{Feed, FeedId, FeedMeta, ParsedFeed, RefreshRequest, RefreshState};

pub(crate) use source::FeedDraft;
