//! Quadrant metadata is stored inside the task title as a bracketed prefix
//! (`[DO] Buy milk`, `[DELEGATE:sam@example.com] Write report`) because the
//! remote store has no custom fields. This module owns that grammar.

use std::str::FromStr;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::Deserialize;
use serde::Serialize;

pub const DEFAULT_TITLE: &str = "Untitled";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quadrant {
    #[default]
    Do,
    Delegate,
    Delay,
    Delete,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [
        Quadrant::Do,
        Quadrant::Delegate,
        Quadrant::Delay,
        Quadrant::Delete,
    ];

    /// The uppercase tag word used inside the title prefix.
    pub fn tag(self) -> &'static str {
        match self {
            Quadrant::Do => "DO",
            Quadrant::Delegate => "DELEGATE",
            Quadrant::Delay => "DELAY",
            Quadrant::Delete => "DELETE",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Quadrant::ALL
            .into_iter()
            .find(|q| q.tag().eq_ignore_ascii_case(tag))
    }
}

impl std::fmt::Display for Quadrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Quadrant::Do => "do",
            Quadrant::Delegate => "delegate",
            Quadrant::Delay => "delay",
            Quadrant::Delete => "delete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown quadrant `{0}` (expected do, delegate, delay, or delete)")]
pub struct ParseQuadrantError(String);

impl FromStr for Quadrant {
    type Err = ParseQuadrantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Quadrant::from_tag(s).ok_or_else(|| ParseQuadrantError(s.to_string()))
    }
}

/// Result of decoding a raw task title.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TitleTag {
    pub quadrant: Quadrant,
    pub delegated_to: Option<String>,
    pub clean_title: String,
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();

    #[expect(clippy::unwrap_used)]
    RE.get_or_init(|| Regex::new(r"(?i)^\[(do|delegate|delay|delete)(?::([^\]]+))?\] ").unwrap())
}

/// Prefix `title` with the tag for `quadrant`. The delegate suffix is only
/// emitted for [`Quadrant::Delegate`] with a non-empty delegate. An empty
/// title becomes [`DEFAULT_TITLE`] so the remote never sees a blank one.
pub fn encode_title(title: &str, quadrant: Quadrant, delegated_to: Option<&str>) -> String {
    let title = if title.is_empty() {
        DEFAULT_TITLE
    } else {
        title
    };
    match (quadrant, delegated_to) {
        (Quadrant::Delegate, Some(who)) if !who.is_empty() => {
            format!("[DELEGATE:{who}] {title}")
        }
        _ => format!("[{}] {title}", quadrant.tag()),
    }
}

/// Decode the prefix grammar anchored at the start of `raw`: a
/// case-insensitive tag word, an optional `:value` suffix, the closing
/// bracket, and exactly one space before the remaining text. Titles without
/// a recognized prefix come back unchanged, classified as [`Quadrant::Do`].
/// Bracketed text anywhere else in the title is left alone.
pub fn decode_title(raw: &str) -> TitleTag {
    let Some(caps) = tag_regex().captures(raw) else {
        return TitleTag {
            quadrant: Quadrant::Do,
            delegated_to: None,
            clean_title: raw.to_string(),
        };
    };
    let quadrant = caps
        .get(1)
        .and_then(|m| Quadrant::from_tag(m.as_str()))
        .unwrap_or_default();
    let delegated_to = caps.get(2).map(|m| m.as_str().to_string());
    let clean_title = match caps.get(0) {
        Some(m) => raw[m.end()..].to_string(),
        None => raw.to_string(),
    };
    TitleTag {
        quadrant,
        delegated_to,
        clean_title,
    }
}

/// True when `raw` starts with a recognized prefix, i.e. exactly when
/// [`decode_title`] would strip one.
pub fn has_tag(raw: &str) -> bool {
    tag_regex().is_match(raw)
}
