use super::context::Args;
use super::traits::{Tool, ToolResult};
use crate::store::EventStore;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

const DEFAULT_LIMIT: u32 = 50;

/// Keyword search over posts captured from the firehose.
pub struct LocalSearchTool {
    store: Arc<dyn EventStore>,
}

impl LocalSearchTool {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for LocalSearchTool {
    fn name(&self) -> &str {
        "bsky_search_local_posts"
    }

    fn description(&self) -> &str {
        "Search posts collected from the firehose into the local database. Without a \
         keyword returns the newest posts."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "keyword": {
                    "type": "string",
                    "description": "Case-sensitive substring to look for in post text"
                },
                "limit": {
                    "type": "integer",
                    "description": "Max posts to return (default: 50)"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let args = Args(&args);
        let keyword = args.opt_str("keyword");
        let limit = args.u32_or("limit", DEFAULT_LIMIT) as usize;

        match self.store.search(keyword, limit).await {
            Ok(posts) => Ok(ToolResult::json(&serde_json::to_value(posts)?)),
            Err(e) => Ok(ToolResult::fail(format!("Local search failed: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{PostRecord, SqlitePostStore};

    async fn seeded() -> Arc<dyn EventStore> {
        let store: Arc<dyn EventStore> = Arc::new(SqlitePostStore::in_memory().unwrap());
        for (i, text) in ["猫の日", "犬の日", "猫と犬"].iter().enumerate() {
            store
                .insert(&PostRecord {
                    uri: format!("at://did:plc:a/app.bsky.feed.post/{i}"),
                    cid: None,
                    author_did: "did:plc:a".into(),
                    author_handle: None,
                    text: (*text).into(),
                    created_at: Some(format!("2024-01-0{}T00:00:00Z", i + 1)),
                    reply_parent: None,
                    reply_root: None,
                    indexed_at: 0.0,
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn keyword_search_returns_json_newest_first() {
        let tool = LocalSearchTool::new(seeded().await);
        let result = tool.execute(json!({"keyword": "猫"})).await.unwrap();
        assert!(result.success);

        let posts: Vec<PostRecord> = serde_json::from_str(&result.output).unwrap();
        let texts: Vec<_> = posts.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["猫と犬", "猫の日"]);
    }

    #[tokio::test]
    async fn missing_keyword_lists_newest_with_limit() {
        let tool = LocalSearchTool::new(seeded().await);
        let result = tool.execute(json!({"limit": 1})).await.unwrap();
        let posts: Vec<PostRecord> = serde_json::from_str(&result.output).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].text, "猫と犬");
    }

    #[tokio::test]
    async fn empty_store_returns_empty_array() {
        let tool = LocalSearchTool::new(Arc::new(SqlitePostStore::in_memory().unwrap()));
        let result = tool.execute(json!({})).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "[]");
    }
}
