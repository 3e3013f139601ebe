//! Plate registry contracts.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

fn plate_grammar() -> &'static Regex {
    static GRAMMAR: OnceLock<Regex> = OnceLock::new();
    GRAMMAR.get_or_init(|| {
        Regex::new(r"^[A-Z]{2}[0-9]{2}[A-Z]{1,2}[0-9]{4}$").expect("valid plate grammar")
    })
}

/// Canonical plate string: 2 letters, 2 digits, 1-2 letters, 4 digits
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlateText(String);

impl PlateText {
    /// Accepts only strings already in canonical form (uppercase, no separators)
    pub fn from_canonical(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if plate_grammar().is_match(&text) {
            Some(Self(text))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlateText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PlateText {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PlateText::from_canonical(value.clone())
            .ok_or_else(|| format!("not a canonical plate: {value:?}"))
    }
}

impl From<PlateText> for String {
    fn from(value: PlateText) -> Self {
        value.0
    }
}

/// A unique plate sighting as persisted in the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateRecord {
    pub normalized_text: PlateText,

    /// 1-based parking slot the plate was seen in
    pub slot_id: u32,

    /// When the plate was first recorded (UTC)
    pub first_seen: DateTime<Utc>,
}

/// Result of a check-then-upsert against the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub slot_id: u32,

    /// `false` when the plate was already registered
    pub inserted: bool,
}
