//! Bluesky XRPC client on top of the shared transport.

pub mod client;
pub mod error;
pub mod records;
pub mod richtext;
pub mod uri;

pub use client::{BlueskyClient, DEFAULT_LIST_PURPOSE, TimelinePage, summarize_timeline};
pub use error::ApiError;
pub use records::{Record, ReplyRef, StrongRef, ThreadgateRule};
pub use richtext::{Facet, parse_facets};
pub use uri::AtUri;
