//! Jetstream frame decoding.

use crate::store::PostRecord;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct JetstreamEvent {
    pub did: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub commit: Option<Commit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Commit {
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub collection: String,
    #[serde(default)]
    pub rkey: String,
    #[serde(default)]
    pub cid: Option<String>,
    #[serde(default)]
    pub record: Option<Value>,
}

/// Post fields pulled out of a create commit, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct PostCandidate {
    pub uri: String,
    pub cid: Option<String>,
    pub author_did: String,
    pub text: String,
    pub langs: Vec<String>,
    pub created_at: Option<String>,
    pub reply_parent: Option<String>,
    pub reply_root: Option<String>,
}

impl JetstreamEvent {
    pub fn parse(frame: &str) -> serde_json::Result<Self> {
        serde_json::from_str(frame)
    }

    /// The post carried by a `commit`/`create` event, if any.
    pub fn post_candidate(&self) -> Option<PostCandidate> {
        if self.kind != "commit" {
            return None;
        }
        let commit = self.commit.as_ref()?;
        if commit.operation != "create" {
            return None;
        }

        let record = commit.record.as_ref();
        let text = record
            .and_then(|r| r.get("text"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let langs = record
            .and_then(|r| r.get("langs"))
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let created_at = record
            .and_then(|r| r.get("createdAt"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let reply_ref = |key: &str| {
            record
                .and_then(|r| r.pointer(&format!("/reply/{key}/uri")))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Some(PostCandidate {
            uri: format!("at://{}/{}/{}", self.did, commit.collection, commit.rkey),
            cid: commit.cid.clone(),
            author_did: self.did.clone(),
            text,
            langs,
            created_at,
            reply_parent: reply_ref("parent"),
            reply_root: reply_ref("root"),
        })
    }
}

impl PostCandidate {
    pub fn into_record(self, indexed_at: f64) -> PostRecord {
        PostRecord {
            uri: self.uri,
            cid: self.cid,
            author_did: self.author_did,
            author_handle: None,
            text: self.text,
            created_at: self.created_at,
            reply_parent: self.reply_parent,
            reply_root: self.reply_root,
            indexed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREATE: &str = r#"{
        "did": "did:plc:abc",
        "time_us": 1725911162329308,
        "kind": "commit",
        "commit": {
            "rev": "3l3qo2vutsw2b",
            "operation": "create",
            "collection": "app.bsky.feed.post",
            "rkey": "3l3qo2vuowo2b",
            "record": {
                "$type": "app.bsky.feed.post",
                "createdAt": "2024-09-09T19:46:02.102Z",
                "langs": ["ja"],
                "text": "おはよう",
                "reply": {
                    "parent": {"cid": "c1", "uri": "at://did:plc:x/app.bsky.feed.post/p"},
                    "root": {"cid": "c0", "uri": "at://did:plc:x/app.bsky.feed.post/r"}
                }
            },
            "cid": "bafyreidwaivazkwu67xztlmuobx35hs2lnfh3kolmgfmucldvhd3sgzcqi"
        }
    }"#;

    #[test]
    fn create_commit_yields_candidate() {
        let event = JetstreamEvent::parse(CREATE).unwrap();
        let candidate = event.post_candidate().unwrap();
        assert_eq!(
            candidate.uri,
            "at://did:plc:abc/app.bsky.feed.post/3l3qo2vuowo2b"
        );
        assert_eq!(candidate.text, "おはよう");
        assert_eq!(candidate.langs, vec!["ja"]);
        assert_eq!(candidate.created_at.as_deref(), Some("2024-09-09T19:46:02.102Z"));
        assert_eq!(
            candidate.reply_parent.as_deref(),
            Some("at://did:plc:x/app.bsky.feed.post/p")
        );
        assert_eq!(
            candidate.reply_root.as_deref(),
            Some("at://did:plc:x/app.bsky.feed.post/r")
        );

        let record = candidate.into_record(1.5);
        assert!(record.author_handle.is_none());
        assert_eq!(record.author_did, "did:plc:abc");
    }

    #[test]
    fn delete_and_identity_events_are_skipped() {
        let delete = r#"{"did":"did:plc:abc","kind":"commit","commit":{"operation":"delete","collection":"app.bsky.feed.post","rkey":"1"}}"#;
        assert!(JetstreamEvent::parse(delete).unwrap().post_candidate().is_none());

        let identity = r#"{"did":"did:plc:abc","kind":"identity","identity":{"handle":"a.b"}}"#;
        assert!(JetstreamEvent::parse(identity).unwrap().post_candidate().is_none());
    }

    #[test]
    fn record_without_text_or_langs_is_lenient() {
        let frame = r#"{"did":"did:plc:abc","kind":"commit","commit":{"operation":"create","collection":"app.bsky.feed.post","rkey":"1","record":{}}}"#;
        let candidate = JetstreamEvent::parse(frame).unwrap().post_candidate().unwrap();
        assert_eq!(candidate.text, "");
        assert!(candidate.langs.is_empty());
        assert!(candidate.cid.is_none());
    }

    #[test]
    fn malformed_frame_is_an_error() {
        assert!(JetstreamEvent::parse("{not json").is_err());
        assert!(JetstreamEvent::parse(r#"{"kind":"commit"}"#).is_err());
    }
}
