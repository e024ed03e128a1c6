//! Detection of proxy interstitial pages and reconstruction of their
//! "continue" URL.
//!
//! The proxy replaces the API response with an HTML page holding a form whose
//! `action` contains [`MARKER`] and whose hidden inputs must be echoed back as a
//! query string. Requesting that URL once releases the original request.

use regex::Regex;
use std::sync::LazyLock;

/// Substring that identifies an interstitial page and its continue form.
pub const MARKER: &str = "_sm_ctn";

static FORM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<form\b([^>]*)>(.*?)</form\s*>").expect("form regex"));
static INPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<input\b([^>]*)>").expect("input regex"));
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("attribute regex")
});
static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]+);").expect("entity regex")
});

/// Cheap pre-check run on every response body.
pub fn contains_marker(body: &str) -> bool {
    body.contains(MARKER)
}

/// Build the continue URL (`action?hidden=values`) from an interstitial page.
///
/// Returns `None` when the body is not an interstitial or carries no usable form.
pub fn continuation_url(body: &str) -> Option<String> {
    if !contains_marker(body) {
        return None;
    }

    for form in FORM_RE.captures_iter(body) {
        let form_attrs = parse_attrs(&form[1]);
        let Some(action) = attr(&form_attrs, "action").filter(|a| a.contains(MARKER)) else {
            continue;
        };

        let query = INPUT_RE
            .captures_iter(&form[2])
            .map(|input| parse_attrs(&input[1]))
            .filter(|attrs| {
                attr(attrs, "type").is_some_and(|t| t.eq_ignore_ascii_case("hidden"))
            })
            .filter_map(|attrs| {
                let name = attr(&attrs, "name").filter(|n| !n.is_empty())?;
                let value = attr(&attrs, "value").unwrap_or_default();
                Some(format!(
                    "{}={}",
                    urlencoding::encode(&name),
                    urlencoding::encode(&value)
                ))
            })
            .collect::<Vec<_>>()
            .join("&");

        return Some(format!("{action}?{query}"));
    }

    None
}

fn parse_attrs(raw: &str) -> Vec<(String, String)> {
    ATTR_RE
        .captures_iter(raw)
        .map(|cap| {
            let value = cap
                .get(2)
                .or_else(|| cap.get(3))
                .or_else(|| cap.get(4))
                .map_or("", |m| m.as_str());
            (cap[1].to_ascii_lowercase(), unescape(value))
        })
        .collect()
}

fn attr(attrs: &[(String, String)], name: &str) -> Option<String> {
    attrs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.clone())
}

/// Decode named and numeric character references. Unknown or invalid ones
/// are kept verbatim.
fn unescape(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    ENTITY_RE
        .replace_all(value, |cap: &regex::Captures<'_>| {
            let entity = &cap[1];
            let decoded = match entity {
                "quot" => Some('"'),
                "apos" => Some('\''),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| entity.strip_prefix('#').map(str::parse::<u32>))
                    .and_then(Result::ok)
                    .and_then(char::from_u32),
            };
            decoded.map_or_else(|| cap[0].to_string(), String::from)
        })
        .into_owned()
}
