//! Repository record payloads, tagged by `$type`.

use super::richtext::Facet;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{uri, cid}` pointer to another record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrongRef {
    pub uri: String,
    pub cid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub parent: StrongRef,
    pub root: StrongRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum ThreadgateRule {
    #[serde(rename = "app.bsky.feed.threadgate#mentionRule")]
    Mention,
    #[serde(rename = "app.bsky.feed.threadgate#followingRule")]
    Following,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum Record {
    #[serde(rename = "app.bsky.feed.post", rename_all = "camelCase")]
    Post {
        text: String,
        created_at: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        facets: Vec<Facet>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reply: Option<ReplyRef>,
    },

    #[serde(rename = "app.bsky.feed.like", rename_all = "camelCase")]
    Like {
        subject: StrongRef,
        created_at: String,
    },

    #[serde(rename = "app.bsky.feed.repost", rename_all = "camelCase")]
    Repost {
        subject: StrongRef,
        created_at: String,
    },

    #[serde(rename = "app.bsky.graph.follow", rename_all = "camelCase")]
    Follow { subject: String, created_at: String },

    #[serde(rename = "app.bsky.graph.block", rename_all = "camelCase")]
    Block { subject: String, created_at: String },

    #[serde(rename = "app.bsky.graph.list", rename_all = "camelCase")]
    List {
        name: String,
        purpose: String,
        description: String,
        created_at: String,
    },

    #[serde(rename = "app.bsky.graph.listitem", rename_all = "camelCase")]
    ListItem {
        subject: String,
        list: String,
        created_at: String,
    },

    /// Avatar and banner are blob refs copied from the existing record.
    #[serde(rename = "app.bsky.actor.profile", rename_all = "camelCase")]
    Profile {
        display_name: String,
        description: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        avatar: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        banner: Option<Value>,
    },

    #[serde(rename = "app.bsky.feed.threadgate", rename_all = "camelCase")]
    Threadgate {
        post: String,
        allow: Vec<ThreadgateRule>,
        created_at: String,
    },
}

impl Record {
    /// Collection NSID; identical to the record's `$type`.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Post { .. } => "app.bsky.feed.post",
            Self::Like { .. } => "app.bsky.feed.like",
            Self::Repost { .. } => "app.bsky.feed.repost",
            Self::Follow { .. } => "app.bsky.graph.follow",
            Self::Block { .. } => "app.bsky.graph.block",
            Self::List { .. } => "app.bsky.graph.list",
            Self::ListItem { .. } => "app.bsky.graph.listitem",
            Self::Profile { .. } => "app.bsky.actor.profile",
            Self::Threadgate { .. } => "app.bsky.feed.threadgate",
        }
    }
}

/// Current time as RFC 3339 UTC with a `Z` suffix.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn type_tag_matches_collection() {
        let records = [
            Record::Follow {
                subject: "did:plc:x".into(),
                created_at: "t".into(),
            },
            Record::ListItem {
                subject: "did:plc:x".into(),
                list: "at://l".into(),
                created_at: "t".into(),
            },
            Record::Threadgate {
                post: "at://p".into(),
                allow: vec![],
                created_at: "t".into(),
            },
        ];
        for record in records {
            let json = serde_json::to_value(&record).unwrap();
            assert_eq!(json["$type"], record.collection());
        }
    }

    #[test]
    fn post_omits_empty_facets_and_reply() {
        let json = serde_json::to_value(Record::Post {
            text: "hi".into(),
            created_at: "2024-01-01T00:00:00.000Z".into(),
            facets: vec![],
            reply: None,
        })
        .unwrap();
        assert_eq!(
            json,
            json!({"$type": "app.bsky.feed.post", "text": "hi", "createdAt": "2024-01-01T00:00:00.000Z"})
        );
    }

    #[test]
    fn threadgate_rules_serialize_with_type() {
        let json = serde_json::to_value(ThreadgateRule::Mention).unwrap();
        assert_eq!(json, json!({"$type": "app.bsky.feed.threadgate#mentionRule"}));
    }

    #[test]
    fn timestamp_is_utc_with_z() {
        let ts = now_timestamp();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
