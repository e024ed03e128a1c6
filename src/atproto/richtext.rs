use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(https?://[^\s<>"]+|www\.[^\s<>"]+)"#).expect("link regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<FacetFeature>,
}

/// Half-open UTF-8 byte range into the post text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
}

/// Link facets for every `http(s)://` or `www.` run in `text`.
pub fn parse_facets(text: &str) -> Vec<Facet> {
    LINK_RE
        .find_iter(text)
        .map(|m| {
            let url = m.as_str();
            let uri = if url.starts_with("http") {
                url.to_string()
            } else {
                format!("https://{url}")
            };
            Facet {
                index: ByteSlice {
                    byte_start: m.start(),
                    byte_end: m.end(),
                },
                features: vec![FacetFeature::Link { uri }],
            }
        })
        .collect()
}
