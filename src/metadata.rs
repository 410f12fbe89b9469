//! Metadata codec.
//!
//! Local records carry metadata as an ordered list of key/value entries;
//! Stripe carries it as a flat string map. Conversion normalizes keys on the
//! way out (trimmed, empty keys dropped) and drops empty maps entirely, so a
//! round trip is not guaranteed to be byte-identical.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One metadata entry on a local record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    /// Metadata key.
    pub key: String,
    /// Metadata value.
    pub value: String,
}

impl MetadataEntry {
    /// Create a new entry.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Convert local metadata entries into a Stripe metadata map.
///
/// Keys are trimmed and entries with empty keys are skipped. Returns `None`
/// when no entries survive so callers can omit the field from remote payloads.
pub fn to_stripe_metadata(entries: &[MetadataEntry]) -> Option<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for entry in entries {
        let key = entry.key.trim();
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), entry.value.clone());
    }
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

/// Convert a Stripe metadata map into local metadata entries.
///
/// Entries follow the map's enumeration order. `None` and empty maps produce
/// an empty list; entries with empty keys are skipped.
pub fn from_stripe_metadata(map: Option<&BTreeMap<String, String>>) -> Vec<MetadataEntry> {
    let Some(map) = map else {
        return Vec::new();
    };
    map.iter()
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| MetadataEntry::new(key.clone(), value.clone()))
        .collect()
}
