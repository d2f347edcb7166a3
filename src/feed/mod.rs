//! Feed retrieval and normalization.
//!
//! - [`parser`] - RSS and Atom handler chains writing into [`FeedSink`]/[`ItemSink`]
//! - [`date`] - RFC 822 / RFC 3339 timestamps to one display form
//! - [`fetcher`] - the [`Fetcher`] primitive, body decoding and one full refresh
//! - [`icon`] - favicon lookup through the feed's site link

pub mod date;
mod fetcher;
mod icon;
mod parser;

pub use fetcher::{
    decode_body, load_feed, FetchError, Fetcher, HttpFetcher, RefreshError, RefreshOptions,
    MAX_RESPONSE_BYTES,
};
pub use icon::{decode_icon, resolve_icon};
pub use parser::{parse_document, FeedSink, ItemSink};
