use super::error::ApiError;
use super::records::{now_timestamp, Record, ReplyRef, StrongRef, ThreadgateRule};
use super::richtext::parse_facets;
use super::uri::AtUri;
use crate::session::{Credentials, DEFAULT_PDS};
use crate::transport::{HttpTransport, TransportError};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub const DEFAULT_LIST_PURPOSE: &str = "app.bsky.graph.defs#curatelist";

/// Options for [`BlueskyClient::get_timeline_page`].
#[derive(Debug, Clone, Copy)]
pub struct TimelinePage {
    pub limit: u32,
    pub summary: bool,
    /// Characters kept from each post text; `0` keeps everything.
    pub text_max_len: usize,
}

impl Default for TimelinePage {
    fn default() -> Self {
        Self {
            limit: 50,
            summary: true,
            text_max_len: 120,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    access_jwt: String,
    refresh_jwt: String,
    did: String,
    handle: String,
}

/// XRPC client acting as one identity.
///
/// Unauthenticated calls go to the transport's default base (the public
/// AppView); authenticated calls go to the session's PDS with a bearer token.
pub struct BlueskyClient {
    creds: Credentials,
    transport: Arc<HttpTransport>,
    login_endpoint: String,
}

impl BlueskyClient {
    pub fn new(creds: Credentials, transport: Arc<HttpTransport>) -> Self {
        Self {
            creds,
            transport,
            login_endpoint: DEFAULT_PDS.to_string(),
        }
    }

    pub fn with_login_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.login_endpoint = endpoint.into();
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.creds
    }

    fn bearer(token: &str) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        let value =
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| ApiError::InvalidToken)?;
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    /// Headers and base URL for the current identity.
    fn auth(&self) -> Result<(HeaderMap, Option<&str>), ApiError> {
        match self.creds.access_jwt.as_deref() {
            Some(token) if !token.is_empty() => {
                Ok((Self::bearer(token)?, Some(self.creds.pds_url.as_str())))
            }
            _ => Ok((HeaderMap::new(), None)),
        }
    }

    fn require_auth(&self) -> Result<&str, ApiError> {
        if !self.creds.is_authenticated() {
            return Err(ApiError::AuthRequired);
        }
        self.creds.did.as_deref().ok_or(ApiError::AuthRequired)
    }

    async fn get(&self, nsid: &str, query: &[(&str, String)]) -> Result<Value, ApiError> {
        let (headers, base) = self.auth()?;
        Ok(self
            .transport
            .get(&format!("/xrpc/{nsid}"), query, &headers, base)
            .await?)
    }

    async fn post_json(&self, nsid: &str, body: &Value) -> Result<Value, ApiError> {
        let (headers, base) = self.auth()?;
        Ok(self
            .transport
            .post(&format!("/xrpc/{nsid}"), body, &headers, base)
            .await?)
    }

    // ── Auth ─────────────────────────────────────────────────────

    /// Create a new session; the returned credentials point at the login
    /// endpoint as their PDS.
    pub async fn login(&self, handle: &str, password: &str) -> Result<Credentials, ApiError> {
        if handle.is_empty() {
            return Err(ApiError::MissingArgument("handle"));
        }
        if password.is_empty() {
            return Err(ApiError::MissingArgument("password"));
        }

        let result = self
            .transport
            .post(
                "/xrpc/com.atproto.server.createSession",
                &json!({"identifier": handle, "password": password}),
                &HeaderMap::new(),
                Some(&self.login_endpoint),
            )
            .await?;
        let session: SessionResponse = serde_json::from_value(result)?;
        tracing::info!(handle = %session.handle, did = %session.did, "Logged in");

        Ok(Credentials {
            access_jwt: Some(session.access_jwt),
            refresh_jwt: Some(session.refresh_jwt),
            did: Some(session.did),
            handle: Some(session.handle),
            pds_url: self.login_endpoint.clone(),
        })
    }

    /// Exchange the refresh token for new tokens and adopt them.
    pub async fn refresh(&mut self) -> Result<Credentials, ApiError> {
        let token = self
            .creds
            .refresh_jwt
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::NoRefreshToken)?;

        let result = self
            .transport
            .post(
                "/xrpc/com.atproto.server.refreshSession",
                &json!({}),
                &Self::bearer(token)?,
                Some(&self.creds.pds_url),
            )
            .await?;
        let session: SessionResponse = serde_json::from_value(result)?;

        self.creds.access_jwt = Some(session.access_jwt);
        self.creds.refresh_jwt = Some(session.refresh_jwt);
        self.creds.did = Some(session.did);
        self.creds.handle = Some(session.handle);
        Ok(self.creds.clone())
    }

    // ── Reads ────────────────────────────────────────────────────

    pub async fn get_profile(&self, actor: &str) -> Result<Value, ApiError> {
        self.get("app.bsky.actor.getProfile", &[("actor", actor.to_string())])
            .await
    }

    pub async fn get_author_feed(
        &self,
        actor: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Value, ApiError> {
        let query = paged(vec![("actor", actor.to_string())], limit, cursor);
        self.get("app.bsky.feed.getAuthorFeed", &query).await
    }

    pub async fn get_actor_feeds(&self, actor: &str) -> Result<Value, ApiError> {
        self.get("app.bsky.feed.getActorFeeds", &[("actor", actor.to_string())])
            .await
    }

    pub async fn get_timeline(&self, limit: u32, cursor: Option<&str>) -> Result<Value, ApiError> {
        self.require_auth()?;
        self.get("app.bsky.feed.getTimeline", &paged(vec![], limit, cursor))
            .await
    }

    pub async fn get_timeline_page(
        &self,
        page: TimelinePage,
        cursor: Option<&str>,
    ) -> Result<Value, ApiError> {
        let raw = self.get_timeline(page.limit, cursor).await?;
        if !page.summary {
            return Ok(raw);
        }
        Ok(summarize_timeline(&raw, page.limit, page.text_max_len))
    }

    pub async fn get_post_thread(&self, uri: &str, depth: u32) -> Result<Value, ApiError> {
        self.get(
            "app.bsky.feed.getPostThread",
            &[("uri", uri.to_string()), ("depth", depth.to_string())],
        )
        .await
    }

    pub async fn get_follows(
        &self,
        actor: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Value, ApiError> {
        let query = paged(vec![("actor", actor.to_string())], limit, cursor);
        self.get("app.bsky.graph.getFollows", &query).await
    }

    pub async fn get_followers(
        &self,
        actor: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Value, ApiError> {
        let query = paged(vec![("actor", actor.to_string())], limit, cursor);
        self.get("app.bsky.graph.getFollowers", &query).await
    }

    pub async fn get_notifications(
        &self,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Value, ApiError> {
        self.require_auth()?;
        self.get(
            "app.bsky.notification.listNotifications",
            &paged(vec![], limit, cursor),
        )
        .await
    }

    pub async fn resolve_handle(&self, handle: &str) -> Result<Value, ApiError> {
        self.get(
            "com.atproto.identity.resolveHandle",
            &[("handle", handle.to_string())],
        )
        .await
    }

    pub async fn search_posts(
        &self,
        query: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Value, ApiError> {
        let query = paged(vec![("q", query.to_string())], limit, cursor);
        self.get("app.bsky.feed.searchPosts", &query).await
    }

    pub async fn search_users(
        &self,
        term: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Value, ApiError> {
        let query = paged(vec![("q", term.to_string())], limit, cursor);
        self.get("app.bsky.actor.searchActors", &query).await
    }

    pub async fn get_likes(&self, uri: &str) -> Result<Value, ApiError> {
        self.get("app.bsky.feed.getLikes", &[("uri", uri.to_string())])
            .await
    }

    pub async fn get_lists(
        &self,
        actor: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Value, ApiError> {
        let query = paged(vec![("actor", actor.to_string())], limit, cursor);
        self.get("app.bsky.graph.getLists", &query).await
    }

    pub async fn get_list(
        &self,
        list_uri: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Value, ApiError> {
        let query = paged(vec![("list", list_uri.to_string())], limit, cursor);
        self.get("app.bsky.graph.getList", &query).await
    }

    // ── Writes ───────────────────────────────────────────────────

    async fn create_record(&self, record: Record) -> Result<Value, ApiError> {
        let did = self.require_auth()?;
        let body = json!({
            "repo": did,
            "collection": record.collection(),
            "record": record,
        });
        self.post_json("com.atproto.repo.createRecord", &body).await
    }

    async fn put_record(&self, rkey: &str, record: Record) -> Result<Value, ApiError> {
        let did = self.require_auth()?;
        let body = json!({
            "repo": did,
            "collection": record.collection(),
            "rkey": rkey,
            "record": record,
        });
        self.post_json("com.atproto.repo.putRecord", &body).await
    }

    async fn delete_record(&self, uri: &str) -> Result<Value, ApiError> {
        self.require_auth()?;
        let uri = AtUri::parse(uri)?;
        let body = json!({
            "repo": uri.repo,
            "collection": uri.collection,
            "rkey": uri.rkey,
        });
        self.post_json("com.atproto.repo.deleteRecord", &body).await
    }

    pub async fn post(&self, text: &str) -> Result<Value, ApiError> {
        self.create_record(Record::Post {
            text: text.to_string(),
            created_at: now_timestamp(),
            facets: parse_facets(text),
            reply: None,
        })
        .await
    }

    pub async fn reply(&self, text: &str, parent: StrongRef, root: StrongRef) -> Result<Value, ApiError> {
        self.create_record(Record::Post {
            text: text.to_string(),
            created_at: now_timestamp(),
            facets: parse_facets(text),
            reply: Some(ReplyRef { parent, root }),
        })
        .await
    }

    pub async fn like(&self, subject: StrongRef) -> Result<Value, ApiError> {
        self.create_record(Record::Like {
            subject,
            created_at: now_timestamp(),
        })
        .await
    }

    pub async fn repost(&self, subject: StrongRef) -> Result<Value, ApiError> {
        self.create_record(Record::Repost {
            subject,
            created_at: now_timestamp(),
        })
        .await
    }

    pub async fn delete_post(&self, post_uri: &str) -> Result<Value, ApiError> {
        self.delete_record(post_uri).await
    }

    pub async fn follow(&self, subject_did: &str) -> Result<Value, ApiError> {
        self.create_record(Record::Follow {
            subject: subject_did.to_string(),
            created_at: now_timestamp(),
        })
        .await
    }

    pub async fn unfollow(&self, follow_uri: &str) -> Result<Value, ApiError> {
        self.delete_record(follow_uri).await
    }

    pub async fn block(&self, subject_did: &str) -> Result<Value, ApiError> {
        self.create_record(Record::Block {
            subject: subject_did.to_string(),
            created_at: now_timestamp(),
        })
        .await
    }

    pub async fn unblock(&self, block_uri: &str) -> Result<Value, ApiError> {
        self.delete_record(block_uri).await
    }

    pub async fn mute(&self, actor: &str) -> Result<Value, ApiError> {
        self.require_auth()?;
        self.post_json("app.bsky.graph.muteActor", &json!({"actor": actor}))
            .await
    }

    pub async fn unmute(&self, actor: &str) -> Result<Value, ApiError> {
        self.require_auth()?;
        self.post_json("app.bsky.graph.unmuteActor", &json!({"actor": actor}))
            .await
    }

    pub async fn create_list(
        &self,
        name: &str,
        purpose: &str,
        description: &str,
    ) -> Result<Value, ApiError> {
        self.create_record(Record::List {
            name: name.to_string(),
            purpose: purpose.to_string(),
            description: description.to_string(),
            created_at: now_timestamp(),
        })
        .await
    }

    pub async fn delete_list(&self, list_uri: &str) -> Result<Value, ApiError> {
        self.delete_record(list_uri).await
    }

    pub async fn add_to_list(&self, subject_did: &str, list_uri: &str) -> Result<Value, ApiError> {
        self.create_record(Record::ListItem {
            subject: subject_did.to_string(),
            list: list_uri.to_string(),
            created_at: now_timestamp(),
        })
        .await
    }

    pub async fn remove_from_list(&self, listitem_uri: &str) -> Result<Value, ApiError> {
        self.delete_record(listitem_uri).await
    }

    /// Rewrite the profile record, keeping fields that are not given and the
    /// existing avatar and banner blobs.
    pub async fn update_profile(
        &self,
        display_name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Value, ApiError> {
        let did = self.require_auth()?;
        let current = match self
            .get(
                "com.atproto.repo.getRecord",
                &[
                    ("repo", did.to_string()),
                    ("collection", "app.bsky.actor.profile".to_string()),
                    ("rkey", "self".to_string()),
                ],
            )
            .await
        {
            Ok(found) => found.get("value").cloned().unwrap_or(Value::Null),
            // No profile record yet
            Err(ApiError::Transport(TransportError::Status { status: 400, .. })) => Value::Null,
            Err(e) => return Err(e),
        };

        let field = |key: &str| {
            current
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let record = Record::Profile {
            display_name: display_name.map_or_else(|| field("displayName"), str::to_string),
            description: description.map_or_else(|| field("description"), str::to_string),
            avatar: current.get("avatar").cloned(),
            banner: current.get("banner").cloned(),
        };
        self.put_record("self", record).await
    }

    /// Restrict who may reply to `post_uri`. No rules means nobody may reply.
    pub async fn set_threadgate(
        &self,
        post_uri: &str,
        allow_mentions: bool,
        allow_following: bool,
    ) -> Result<Value, ApiError> {
        self.require_auth()?;
        let uri = AtUri::parse(post_uri)?;

        let mut allow = Vec::new();
        if allow_mentions {
            allow.push(ThreadgateRule::Mention);
        }
        if allow_following {
            allow.push(ThreadgateRule::Following);
        }

        self.put_record(
            &uri.rkey,
            Record::Threadgate {
                post: post_uri.to_string(),
                allow,
                created_at: now_timestamp(),
            },
        )
        .await
    }
}

fn paged(
    mut query: Vec<(&'static str, String)>,
    limit: u32,
    cursor: Option<&str>,
) -> Vec<(&'static str, String)> {
    query.push(("limit", limit.to_string()));
    if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
        query.push(("cursor", cursor.to_string()));
    }
    query
}

/// Condense a `getTimeline` response to the fields a reader scans.
pub fn summarize_timeline(raw: &Value, limit: u32, text_max_len: usize) -> Value {
    let items: Vec<Value> = raw
        .get("feed")
        .and_then(Value::as_array)
        .map(|feed| {
            feed.iter()
                .map(|item| {
                    let post = item
                        .get("post")
                        .filter(|p| p.is_object())
                        .map_or(Value::Null, |p| summarize_post(p, text_max_len));
                    json!({
                        "post": post,
                        "reason": item.get("reason").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    json!({
        "cursor": raw.get("cursor").cloned().unwrap_or(Value::Null),
        "limit": limit,
        "count": items.len(),
        "items": items,
    })
}

fn summarize_post(post: &Value, text_max_len: usize) -> Value {
    let field = |v: &Value, key: &str| v.get(key).cloned().unwrap_or(Value::Null);
    let author = post.get("author").cloned().unwrap_or(Value::Null);
    let record = post.get("record").cloned().unwrap_or(Value::Null);

    let text = match record.get("text").and_then(Value::as_str) {
        Some(text) => Value::String(truncate_chars(text, text_max_len)),
        None => Value::Null,
    };

    json!({
        "uri": field(post, "uri"),
        "cid": field(post, "cid"),
        "createdAt": field(&record, "createdAt"),
        "author": {
            "did": field(&author, "did"),
            "handle": field(&author, "handle"),
            "displayName": field(&author, "displayName"),
        },
        "text": text,
        "likeCount": field(post, "likeCount"),
        "replyCount": field(post, "replyCount"),
        "repostCount": field(post, "repostCount"),
        "quoteCount": field(post, "quoteCount"),
    })
}

fn truncate_chars(text: &str, max: usize) -> String {
    if max == 0 || text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}
