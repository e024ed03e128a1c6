//! One tool per Bluesky API operation.
//!
//! Each [`BskyOp`] carries its name, description and parameter table; a
//! single [`BskyTool`] type dispatches on it.

use super::context::{Args, ToolContext};
use super::traits::{Tool, ToolResult};
use crate::atproto::{ApiError, BlueskyClient, DEFAULT_LIST_PURPOSE, StrongRef, TimelinePage};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Str,
    Int,
    Bool,
}

#[derive(Debug, Clone, Copy)]
struct Param {
    name: &'static str,
    kind: Kind,
    required: bool,
    description: &'static str,
}

const fn req(name: &'static str, description: &'static str) -> Param {
    Param {
        name,
        kind: Kind::Str,
        required: true,
        description,
    }
}

const fn opt(name: &'static str, kind: Kind, description: &'static str) -> Param {
    Param {
        name,
        kind,
        required: false,
        description,
    }
}

const CURSOR: Param = opt("cursor", Kind::Str, "Pagination cursor from a previous page");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BskyOp {
    GetProfile,
    GetAuthorFeed,
    GetActorFeeds,
    GetTimeline,
    GetTimelinePage,
    GetPostThread,
    GetFollows,
    GetFollowers,
    GetNotifications,
    ResolveHandle,
    SearchPosts,
    SearchUsers,
    GetLikes,
    GetLists,
    GetList,
    Post,
    Reply,
    Like,
    Repost,
    DeletePost,
    Follow,
    Unfollow,
    Block,
    Unblock,
    Mute,
    Unmute,
    CreateList,
    DeleteList,
    AddToList,
    RemoveFromList,
    UpdateProfile,
    SetThreadgate,
}

impl BskyOp {
    pub const ALL: [BskyOp; 32] = [
        Self::GetProfile,
        Self::GetAuthorFeed,
        Self::GetActorFeeds,
        Self::GetTimeline,
        Self::GetTimelinePage,
        Self::GetPostThread,
        Self::GetFollows,
        Self::GetFollowers,
        Self::GetNotifications,
        Self::ResolveHandle,
        Self::SearchPosts,
        Self::SearchUsers,
        Self::GetLikes,
        Self::GetLists,
        Self::GetList,
        Self::Post,
        Self::Reply,
        Self::Like,
        Self::Repost,
        Self::DeletePost,
        Self::Follow,
        Self::Unfollow,
        Self::Block,
        Self::Unblock,
        Self::Mute,
        Self::Unmute,
        Self::CreateList,
        Self::DeleteList,
        Self::AddToList,
        Self::RemoveFromList,
        Self::UpdateProfile,
        Self::SetThreadgate,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::GetProfile => "bsky_get_profile",
            Self::GetAuthorFeed => "bsky_get_author_feed",
            Self::GetActorFeeds => "bsky_get_actor_feeds",
            Self::GetTimeline => "bsky_get_timeline",
            Self::GetTimelinePage => "bsky_get_timeline_page",
            Self::GetPostThread => "bsky_get_post_thread",
            Self::GetFollows => "bsky_get_follows",
            Self::GetFollowers => "bsky_get_followers",
            Self::GetNotifications => "bsky_get_notifications",
            Self::ResolveHandle => "bsky_resolve_handle",
            Self::SearchPosts => "bsky_search_posts",
            Self::SearchUsers => "bsky_search_users",
            Self::GetLikes => "bsky_get_likes",
            Self::GetLists => "bsky_get_lists",
            Self::GetList => "bsky_get_list",
            Self::Post => "bsky_post",
            Self::Reply => "bsky_reply",
            Self::Like => "bsky_like",
            Self::Repost => "bsky_repost",
            Self::DeletePost => "bsky_delete_post",
            Self::Follow => "bsky_follow",
            Self::Unfollow => "bsky_unfollow",
            Self::Block => "bsky_block",
            Self::Unblock => "bsky_unblock",
            Self::Mute => "bsky_mute",
            Self::Unmute => "bsky_unmute",
            Self::CreateList => "bsky_create_list",
            Self::DeleteList => "bsky_delete_list",
            Self::AddToList => "bsky_add_to_list",
            Self::RemoveFromList => "bsky_remove_from_list",
            Self::UpdateProfile => "bsky_update_profile",
            Self::SetThreadgate => "bsky_set_threadgate",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::GetProfile => "Fetch a user's profile.",
            Self::GetAuthorFeed => "Fetch a user's most recent posts.",
            Self::GetActorFeeds => "List the custom feeds a user has published.",
            Self::GetTimeline => "Fetch the home timeline of the acting identity (requires login).",
            Self::GetTimelinePage => {
                "Fetch one page of the home timeline, summarized or in full (requires login)."
            }
            Self::GetPostThread => "Fetch a post together with its reply tree.",
            Self::GetFollows => "List the accounts a user follows.",
            Self::GetFollowers => "List a user's followers.",
            Self::GetNotifications => "List notifications of the acting identity (requires login).",
            Self::ResolveHandle => "Resolve a handle to its DID.",
            Self::SearchPosts => "Search public posts.",
            Self::SearchUsers => "Search users by keyword.",
            Self::GetLikes => "List the likes on a post.",
            Self::GetLists => "List the lists a user has created.",
            Self::GetList => "Fetch a list and its members.",
            Self::Post => "Publish a new post; links become rich-text facets (requires login).",
            Self::Reply => "Reply to a post (requires login).",
            Self::Like => "Like a post (requires login).",
            Self::Repost => "Repost a post (requires login).",
            Self::DeletePost => "Delete one of your posts by AT-URI (requires login).",
            Self::Follow => "Follow an account by DID (requires login).",
            Self::Unfollow => "Remove a follow record by AT-URI (requires login).",
            Self::Block => "Block an account by DID (requires login).",
            Self::Unblock => "Remove a block record by AT-URI (requires login).",
            Self::Mute => "Mute an account (requires login).",
            Self::Unmute => "Unmute an account (requires login).",
            Self::CreateList => "Create a list (requires login).",
            Self::DeleteList => "Delete a list by AT-URI (requires login).",
            Self::AddToList => "Add an account to a list (requires login).",
            Self::RemoveFromList => "Remove a list item record by AT-URI (requires login).",
            Self::UpdateProfile => {
                "Update display name and/or description; other profile fields are kept (requires login)."
            }
            Self::SetThreadgate => "Restrict who can reply to a post (requires login).",
        }
    }

    fn params(self) -> &'static [Param] {
        const HANDLE: Param = req("handle", "User handle or DID");
        match self {
            Self::GetProfile | Self::GetActorFeeds | Self::ResolveHandle => const { &[HANDLE] },
            Self::Mute | Self::Unmute => const { &[req("handle", "Handle or DID of the account")] },
            Self::GetAuthorFeed => const { &[
                HANDLE,
                opt("limit", Kind::Int, "Max posts (default: 10)"),
                CURSOR,
            ] },
            Self::GetFollows | Self::GetFollowers | Self::GetLists => const { &[
                HANDLE,
                opt("limit", Kind::Int, "Max entries (default: 50)"),
                CURSOR,
            ] },
            Self::GetTimeline | Self::GetNotifications => const { &[
                opt("limit", Kind::Int, "Max entries (default: 20)"),
                CURSOR,
            ] },
            Self::GetTimelinePage => const { &[
                opt("limit", Kind::Int, "Max entries (default: 50)"),
                CURSOR,
                opt("summary", Kind::Bool, "Return condensed items (default: true)"),
                opt(
                    "text_max_len",
                    Kind::Int,
                    "Characters kept per post text in summary mode (default: 120)",
                ),
            ] },
            Self::GetPostThread => const { &[
                req("uri", "AT-URI of the post"),
                opt("depth", Kind::Int, "Reply depth (default: 6)"),
            ] },
            Self::SearchPosts => const { &[
                req("query", "Search query"),
                opt("limit", Kind::Int, "Max posts (default: 10)"),
                CURSOR,
            ] },
            Self::SearchUsers => const { &[
                req("term", "Search term"),
                opt("limit", Kind::Int, "Max users (default: 10)"),
                CURSOR,
            ] },
            Self::GetLikes => const { &[req("uri", "AT-URI of the post")] },
            Self::GetList => const { &[
                req("list_uri", "AT-URI of the list"),
                opt("limit", Kind::Int, "Max members (default: 50)"),
                CURSOR,
            ] },
            Self::Post => const { &[req("text", "Post text")] },
            Self::Reply => const { &[
                req("text", "Reply text"),
                req("parent_uri", "AT-URI of the post being answered"),
                req("parent_cid", "CID of the post being answered"),
                req("root_uri", "AT-URI of the thread root"),
                req("root_cid", "CID of the thread root"),
            ] },
            Self::Like | Self::Repost => const { &[
                req("uri", "AT-URI of the post"),
                req("cid", "CID of the post"),
            ] },
            Self::DeletePost => const { &[req("post_uri", "AT-URI of the post")] },
            Self::Follow | Self::Block => const { &[req("subject_did", "DID of the account")] },
            Self::Unfollow => const { &[req("follow_uri", "AT-URI of the follow record")] },
            Self::Unblock => const { &[req("block_uri", "AT-URI of the block record")] },
            Self::CreateList => const { &[
                req("name", "List name"),
                opt(
                    "purpose",
                    Kind::Str,
                    "List purpose NSID (default: app.bsky.graph.defs#curatelist)",
                ),
                opt("description", Kind::Str, "List description"),
            ] },
            Self::DeleteList => const { &[req("list_uri", "AT-URI of the list")] },
            Self::AddToList => const { &[
                req("subject_did", "DID of the account to add"),
                req("list_uri", "AT-URI of the list"),
            ] },
            Self::RemoveFromList => const { &[req("listitem_uri", "AT-URI of the list item record")] },
            Self::UpdateProfile => const { &[
                opt("displayName", Kind::Str, "New display name"),
                opt("description", Kind::Str, "New profile description"),
            ] },
            Self::SetThreadgate => const { &[
                req("post_uri", "AT-URI of the post"),
                opt("allow_mentions", Kind::Bool, "Mentioned users may reply (default: true)"),
                opt("allow_following", Kind::Bool, "Followed users may reply (default: false)"),
            ] },
        }
    }

    fn schema(self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for param in self.params() {
            let kind = match param.kind {
                Kind::Str => "string",
                Kind::Int => "integer",
                Kind::Bool => "boolean",
            };
            properties.insert(
                param.name.to_string(),
                json!({"type": kind, "description": param.description}),
            );
            if param.required {
                required.push(param.name);
            }
        }
        properties.insert(
            "acting_handle".into(),
            json!({
                "type": "string",
                "description": "Identity to act as (default: the most recently logged-in one)"
            }),
        );
        json!({"type": "object", "properties": properties, "required": required})
    }

    /// Validate arguments, then call the API. Argument errors are `Err`.
    async fn call(self, client: &BlueskyClient, args: &Args<'_>) -> anyhow::Result<Result<Value, ApiError>> {
        let cursor = args.opt_str("cursor");
        let out = match self {
            Self::GetProfile => client.get_profile(args.str("handle")?).await,
            Self::GetAuthorFeed => {
                client
                    .get_author_feed(args.str("handle")?, args.u32_or("limit", 10), cursor)
                    .await
            }
            Self::GetActorFeeds => client.get_actor_feeds(args.str("handle")?).await,
            Self::GetTimeline => client.get_timeline(args.u32_or("limit", 20), cursor).await,
            Self::GetTimelinePage => {
                let page = TimelinePage {
                    limit: args.u32_or("limit", 50),
                    summary: args.bool_or("summary", true),
                    text_max_len: args.u32_or("text_max_len", 120) as usize,
                };
                client.get_timeline_page(page, cursor).await
            }
            Self::GetPostThread => {
                client
                    .get_post_thread(args.str("uri")?, args.u32_or("depth", 6))
                    .await
            }
            Self::GetFollows => {
                client
                    .get_follows(args.str("handle")?, args.u32_or("limit", 50), cursor)
                    .await
            }
            Self::GetFollowers => {
                client
                    .get_followers(args.str("handle")?, args.u32_or("limit", 50), cursor)
                    .await
            }
            Self::GetNotifications => {
                client
                    .get_notifications(args.u32_or("limit", 20), cursor)
                    .await
            }
            Self::ResolveHandle => client.resolve_handle(args.str("handle")?).await,
            Self::SearchPosts => {
                client
                    .search_posts(args.str("query")?, args.u32_or("limit", 10), cursor)
                    .await
            }
            Self::SearchUsers => {
                client
                    .search_users(args.str("term")?, args.u32_or("limit", 10), cursor)
                    .await
            }
            Self::GetLikes => client.get_likes(args.str("uri")?).await,
            Self::GetLists => {
                client
                    .get_lists(args.str("handle")?, args.u32_or("limit", 50), cursor)
                    .await
            }
            Self::GetList => {
                client
                    .get_list(args.str("list_uri")?, args.u32_or("limit", 50), cursor)
                    .await
            }
            Self::Post => client.post(args.str("text")?).await,
            Self::Reply => {
                let parent = strong_ref(args, "parent_uri", "parent_cid")?;
                let root = strong_ref(args, "root_uri", "root_cid")?;
                client.reply(args.str("text")?, parent, root).await
            }
            Self::Like => client.like(strong_ref(args, "uri", "cid")?).await,
            Self::Repost => client.repost(strong_ref(args, "uri", "cid")?).await,
            Self::DeletePost => client.delete_post(args.str("post_uri")?).await,
            Self::Follow => client.follow(args.str("subject_did")?).await,
            Self::Unfollow => client.unfollow(args.str("follow_uri")?).await,
            Self::Block => client.block(args.str("subject_did")?).await,
            Self::Unblock => client.unblock(args.str("block_uri")?).await,
            Self::Mute => client.mute(args.str("handle")?).await,
            Self::Unmute => client.unmute(args.str("handle")?).await,
            Self::CreateList => {
                client
                    .create_list(
                        args.str("name")?,
                        args.opt_str("purpose").unwrap_or(DEFAULT_LIST_PURPOSE),
                        args.opt_str("description").unwrap_or_default(),
                    )
                    .await
            }
            Self::DeleteList => client.delete_list(args.str("list_uri")?).await,
            Self::AddToList => {
                client
                    .add_to_list(args.str("subject_did")?, args.str("list_uri")?)
                    .await
            }
            Self::RemoveFromList => client.remove_from_list(args.str("listitem_uri")?).await,
            Self::UpdateProfile => {
                // An explicit empty string clears the field.
                let field = |key: &str| args.0.get(key).and_then(Value::as_str);
                client
                    .update_profile(field("displayName"), field("description"))
                    .await
            }
            Self::SetThreadgate => {
                client
                    .set_threadgate(
                        args.str("post_uri")?,
                        args.bool_or("allow_mentions", true),
                        args.bool_or("allow_following", false),
                    )
                    .await
            }
        };
        Ok(out)
    }
}

fn strong_ref(args: &Args<'_>, uri: &str, cid: &str) -> anyhow::Result<StrongRef> {
    Ok(StrongRef {
        uri: args.str(uri)?.to_string(),
        cid: args.str(cid)?.to_string(),
    })
}

/// A [`BskyOp`] bound to the shared context.
pub struct BskyTool {
    op: BskyOp,
    ctx: Arc<ToolContext>,
}

impl BskyTool {
    pub fn new(op: BskyOp, ctx: Arc<ToolContext>) -> Self {
        Self { op, ctx }
    }
}

#[async_trait]
impl Tool for BskyTool {
    fn name(&self) -> &str {
        self.op.name()
    }

    fn description(&self) -> &str {
        self.op.description()
    }

    fn parameters_schema(&self) -> Value {
        self.op.schema()
    }

    async fn execute(&self, args: Value) -> anyhow::Result<ToolResult> {
        let args = Args(&args);
        let client = self.ctx.client_for(args.acting_handle()).await;

        match self.op.call(&client, &args).await? {
            Ok(value) => Ok(ToolResult::json(&value)),
            Err(e) => {
                tracing::warn!(tool = self.op.name(), "Bluesky call failed: {e}");
                Ok(ToolResult::fail(format!("Error: {e}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn op_names_are_unique_and_prefixed() {
        let names: HashSet<_> = BskyOp::ALL.iter().map(|op| op.name()).collect();
        assert_eq!(names.len(), BskyOp::ALL.len());
        assert!(names.iter().all(|n| n.starts_with("bsky_")));
    }

    #[test]
    fn every_schema_accepts_acting_handle() {
        for op in BskyOp::ALL {
            let schema = op.schema();
            assert_eq!(schema["type"], "object");
            assert_eq!(schema["properties"]["acting_handle"]["type"], "string");
            assert!(!schema["required"]
                .as_array()
                .unwrap()
                .contains(&json!("acting_handle")));
        }
    }

    #[test]
    fn reply_schema_lists_required_refs() {
        let schema = BskyOp::Reply.schema();
        let required: Vec<_> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(
            required,
            vec!["text", "parent_uri", "parent_cid", "root_uri", "root_cid"]
        );
        assert_eq!(
            BskyOp::GetTimelinePage.schema()["properties"]["summary"]["type"],
            "boolean"
        );
    }
}
