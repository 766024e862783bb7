//! Older clients stored quadrant metadata as a JSON block appended to the
//! notes field instead of a title prefix. Decoding still understands that
//! format so pre-migration tasks classify correctly, and display notes
//! always have the block stripped.

use serde::Deserialize;

use crate::title::Quadrant;

pub const METADATA_SENTINEL: &str = "---EISENHOWER_META---";

/// The sentinel line as it appears inside a notes field.
const BLOCK_PREFIX: &str = "\n---EISENHOWER_META---\n";

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyMetadata {
    #[serde(default)]
    pub quadrant: Option<Quadrant>,
    #[serde(default)]
    pub delegated_to: Option<String>,
}

fn split_block(notes: &str) -> Option<(&str, &str)> {
    let idx = notes.find(BLOCK_PREFIX)?;
    let payload = &notes[idx + BLOCK_PREFIX.len()..];
    if payload.is_empty() {
        return None;
    }
    Some((&notes[..idx], payload))
}

/// Parse the trailing metadata block, if present and well-formed.
pub fn parse_legacy_metadata(notes: &str) -> Option<LegacyMetadata> {
    let (_, payload) = split_block(notes)?;
    serde_json::from_str(payload).ok()
}

/// The notes as shown to the user: the metadata block stripped, surrounding
/// whitespace trimmed.
pub fn display_notes(notes: &str) -> String {
    match split_block(notes) {
        Some((body, _)) => body.trim().to_string(),
        None => notes.trim().to_string(),
    }
}
