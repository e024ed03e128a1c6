use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A post captured from the firehose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    /// `at://{did}/{collection}/{rkey}`, unique across the store
    pub uri: String,
    pub cid: Option<String>,
    pub author_did: String,
    /// Not carried by the firehose; stays `None` for ingested posts
    pub author_handle: Option<String>,
    pub text: String,
    /// Author-supplied creation timestamp, as sent
    pub created_at: Option<String>,
    pub reply_parent: Option<String>,
    pub reply_root: Option<String>,
    /// Local ingestion time, seconds since the Unix epoch
    pub indexed_at: f64,
}

/// Persistence backend for ingested posts
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Backend name
    fn name(&self) -> &str;

    /// Insert a post unless its URI is already stored.
    ///
    /// Returns `true` when a new row was written.
    async fn insert(&self, post: &PostRecord) -> anyhow::Result<bool>;

    /// Newest posts first, optionally restricted to those whose text contains
    /// `keyword` (case-sensitive). An empty keyword matches everything.
    async fn search(&self, keyword: Option<&str>, limit: usize)
        -> anyhow::Result<Vec<PostRecord>>;

    async fn get(&self, uri: &str) -> anyhow::Result<Option<PostRecord>>;

    async fn count(&self) -> anyhow::Result<usize>;
}
