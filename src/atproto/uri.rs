use super::error::ApiError;
use std::fmt;

/// `at://{repo}/{collection}/{rkey}` split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtUri {
    pub repo: String,
    pub collection: String,
    pub rkey: String,
}

impl AtUri {
    /// Strip the `at://` prefix and take the first three `/` segments.
    ///
    /// Fewer than three segments is [`ApiError::InvalidUri`].
    pub fn parse(uri: &str) -> Result<Self, ApiError> {
        let rest = uri.strip_prefix("at://").unwrap_or(uri);
        let mut parts = rest.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(repo), Some(collection), Some(rkey)) => Ok(Self {
                repo: repo.to_string(),
                collection: collection.to_string(),
                rkey: rkey.to_string(),
            }),
            _ => Err(ApiError::InvalidUri(uri.to_string())),
        }
    }
}

impl fmt::Display for AtUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at://{}/{}/{}", self.repo, self.collection, self.rkey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_post_uri() {
        let uri = AtUri::parse("at://did:plc:abc/app.bsky.feed.post/xyz").unwrap();
        assert_eq!(uri.repo, "did:plc:abc");
        assert_eq!(uri.collection, "app.bsky.feed.post");
        assert_eq!(uri.rkey, "xyz");
        assert_eq!(uri.to_string(), "at://did:plc:abc/app.bsky.feed.post/xyz");
    }

    #[test]
    fn too_few_segments_is_invalid() {
        let err = AtUri::parse("at://did:plc:abc/app.bsky.feed.post").unwrap_err();
        assert!(matches!(err, ApiError::InvalidUri(_)));
        assert!(err.to_string().starts_with("Invalid URI format"));
    }

    #[test]
    fn prefix_is_optional_and_extra_segments_are_ignored() {
        let uri = AtUri::parse("did:plc:abc/app.bsky.graph.follow/k/extra").unwrap();
        assert_eq!(uri.rkey, "k");
    }
}
