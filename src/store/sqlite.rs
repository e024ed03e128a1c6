use super::traits::{EventStore, PostRecord};
use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const POST_COLUMNS: &str =
    "uri, cid, author_did, author_handle, text, created_at, reply_parent, reply_root, indexed_at";

/// SQLite-backed post store.
///
/// One connection behind a mutex; every statement runs on the blocking pool.
pub struct SqlitePostStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl SqlitePostStore {
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let conn = Connection::open(db_path).context("SQLite failed to open database")?;
        Self::from_connection(conn, db_path.to_path_buf())
    }

    /// Scratch store that lives only as long as the value.
    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("SQLite failed to open database")?;
        Self::from_connection(conn, PathBuf::from(":memory:"))
    }

    fn from_connection(conn: Connection, db_path: PathBuf) -> anyhow::Result<Self> {
        // WAL lets searches proceed while the consumer writes.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             PRAGMA temp_store   = MEMORY;",
        )?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
        })
    }

    fn init_schema(conn: &Connection) -> anyhow::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS posts (
                uri           TEXT PRIMARY KEY,
                cid           TEXT,
                author_did    TEXT NOT NULL,
                author_handle TEXT,
                text          TEXT NOT NULL,
                created_at    TEXT,
                reply_parent  TEXT,
                reply_root    TEXT,
                indexed_at    REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at);",
        )?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn row_to_post(row: &Row<'_>) -> rusqlite::Result<PostRecord> {
        Ok(PostRecord {
            uri: row.get(0)?,
            cid: row.get(1)?,
            author_did: row.get(2)?,
            author_handle: row.get(3)?,
            text: row.get(4)?,
            created_at: row.get(5)?,
            reply_parent: row.get(6)?,
            reply_root: row.get(7)?,
            indexed_at: row.get(8)?,
        })
    }
}

#[async_trait]
impl EventStore for SqlitePostStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert(&self, post: &PostRecord) -> anyhow::Result<bool> {
        let conn = self.conn.clone();
        let post = post.clone();

        tokio::task::spawn_blocking(move || -> anyhow::Result<bool> {
            let conn = conn.lock();
            let written = conn.execute(
                "INSERT OR IGNORE INTO posts
                 (uri, cid, author_did, author_handle, text, created_at, reply_parent, reply_root, indexed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    post.uri,
                    post.cid,
                    post.author_did,
                    post.author_handle,
                    post.text,
                    post.created_at,
                    post.reply_parent,
                    post.reply_root,
                    post.indexed_at,
                ],
            )?;
            Ok(written > 0)
        })
        .await?
    }

    async fn search(
        &self,
        keyword: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<PostRecord>> {
        let conn = self.conn.clone();
        let keyword = keyword.filter(|k| !k.is_empty()).map(str::to_string);
        #[allow(clippy::cast_possible_wrap)]
        let limit = limit.min(i64::MAX as usize) as i64;

        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<PostRecord>> {
            let conn = conn.lock();
            let rows = if let Some(keyword) = keyword {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {POST_COLUMNS} FROM posts
                     WHERE instr(text, ?1) > 0
                     ORDER BY created_at DESC, indexed_at DESC
                     LIMIT ?2"
                ))?;
                stmt.query_map(params![keyword, limit], Self::row_to_post)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            } else {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {POST_COLUMNS} FROM posts
                     ORDER BY created_at DESC, indexed_at DESC
                     LIMIT ?1"
                ))?;
                stmt.query_map(params![limit], Self::row_to_post)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            };
            Ok(rows)
        })
        .await?
    }

    async fn get(&self, uri: &str) -> anyhow::Result<Option<PostRecord>> {
        let conn = self.conn.clone();
        let uri = uri.to_string();

        tokio::task::spawn_blocking(move || -> anyhow::Result<Option<PostRecord>> {
            let conn = conn.lock();
            let post = conn
                .query_row(
                    &format!("SELECT {POST_COLUMNS} FROM posts WHERE uri = ?1"),
                    params![uri],
                    Self::row_to_post,
                )
                .optional()?;
            Ok(post)
        })
        .await?
    }

    async fn count(&self) -> anyhow::Result<usize> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || -> anyhow::Result<usize> {
            let conn = conn.lock();
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            Ok(count as usize)
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn post(uri: &str, text: &str, created_at: &str) -> PostRecord {
        PostRecord {
            uri: uri.into(),
            cid: Some("bafycid".into()),
            author_did: "did:plc:author".into(),
            author_handle: None,
            text: text.into(),
            created_at: Some(created_at.into()),
            reply_parent: None,
            reply_root: None,
            indexed_at: 1_700_000_000.0,
        }
    }

    fn temp_store() -> (TempDir, SqlitePostStore) {
        let tmp = TempDir::new().unwrap();
        let store = SqlitePostStore::open(&tmp.path().join("data").join("posts.db")).unwrap();
        (tmp, store)
    }

    #[tokio::test]
    async fn open_creates_parent_directories() {
        let (tmp, store) = temp_store();
        assert!(tmp.path().join("data").join("posts.db").exists());
        assert_eq!(store.name(), "sqlite");
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_uri_is_ignored_not_overwritten() {
        let (_tmp, store) = temp_store();
        let first = post("at://did:plc:a/app.bsky.feed.post/1", "original", "2024-01-01T00:00:00Z");
        let mut second = first.clone();
        second.text = "replacement".into();

        assert!(store.insert(&first).await.unwrap());
        assert!(!store.insert(&second).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);

        let stored = store.get(&first.uri).await.unwrap().unwrap();
        assert_eq!(stored.text, "original");
    }

    #[tokio::test]
    async fn keyword_search_orders_newest_first() {
        let (_tmp, store) = temp_store();
        store.insert(&post("at://x/p/1", "猫が好き", "2024-01-01T00:00:00Z")).await.unwrap();
        store.insert(&post("at://x/p/2", "犬と猫", "2024-01-02T00:00:00Z")).await.unwrap();
        store.insert(&post("at://x/p/3", "猫カフェ", "2024-01-03T00:00:00Z")).await.unwrap();
        store.insert(&post("at://x/p/4", "犬だけ", "2024-01-04T00:00:00Z")).await.unwrap();

        let hits = store.search(Some("猫"), 2).await.unwrap();
        let uris: Vec<_> = hits.iter().map(|p| p.uri.as_str()).collect();
        assert_eq!(uris, vec!["at://x/p/3", "at://x/p/2"]);
    }

    #[tokio::test]
    async fn search_without_keyword_returns_most_recent() {
        let (_tmp, store) = temp_store();
        store.insert(&post("at://x/p/1", "a", "2024-01-01T00:00:00Z")).await.unwrap();
        store.insert(&post("at://x/p/2", "b", "2024-01-03T00:00:00Z")).await.unwrap();
        store.insert(&post("at://x/p/3", "c", "2024-01-02T00:00:00Z")).await.unwrap();

        let all = store.search(None, 10).await.unwrap();
        let uris: Vec<_> = all.iter().map(|p| p.uri.as_str()).collect();
        assert_eq!(uris, vec!["at://x/p/2", "at://x/p/3", "at://x/p/1"]);

        let empty_keyword = store.search(Some(""), 1).await.unwrap();
        assert_eq!(empty_keyword.len(), 1);
        assert_eq!(empty_keyword[0].uri, "at://x/p/2");
    }

    #[tokio::test]
    async fn keyword_match_is_case_sensitive() {
        let (_tmp, store) = temp_store();
        store.insert(&post("at://x/p/1", "Rust rocks", "2024-01-01T00:00:00Z")).await.unwrap();
        assert_eq!(store.search(Some("Rust"), 10).await.unwrap().len(), 1);
        assert!(store.search(Some("rust"), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_missing_uri_is_none() {
        let (_tmp, store) = temp_store();
        assert!(store.get("at://nope/p/1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("posts.db");
        {
            let store = SqlitePostStore::open(&path).unwrap();
            let mut p = post("at://x/p/1", "reply", "2024-01-01T00:00:00Z");
            p.reply_parent = Some("at://x/p/0".into());
            p.reply_root = Some("at://x/p/0".into());
            store.insert(&p).await.unwrap();
        }
        let reopened = SqlitePostStore::open(&path).unwrap();
        let p = reopened.get("at://x/p/1").await.unwrap().unwrap();
        assert_eq!(p.reply_parent.as_deref(), Some("at://x/p/0"));
        assert!(p.author_handle.is_none());
    }

    #[tokio::test]
    async fn in_memory_store_works() {
        let store = SqlitePostStore::in_memory().unwrap();
        store.insert(&post("at://x/p/1", "a", "2024-01-01T00:00:00Z")).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
