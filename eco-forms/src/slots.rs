//! Slot table for the incident report form.
//!
//! Every slot is described by one [`SlotSpec`] row: the entity type that fills it,
//! the acceptance rule, and the prompts shown to the user. Extraction and validation
//! are generic over this table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotName {
    IncidentType,
    UserName,
    ContactNumber,
    IncidentDescription,
    Address,
    HasProof,
}

impl SlotName {
    /// Enumeration order. Also the default prompting order.
    pub const ALL: [SlotName; 6] = [
        SlotName::IncidentType,
        SlotName::UserName,
        SlotName::ContactNumber,
        SlotName::IncidentDescription,
        SlotName::Address,
        SlotName::HasProof,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SlotName::IncidentType => "incident_type",
            SlotName::UserName => "user_name",
            SlotName::ContactNumber => "contact_number",
            SlotName::IncidentDescription => "incident_description",
            SlotName::Address => "address",
            SlotName::HasProof => "has_proof",
        }
    }

    pub fn spec(self) -> &'static SlotSpec {
        &INCIDENT_REPORT_SLOTS[self as usize]
    }
}

impl fmt::Display for SlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered list of slots that must be filled before submission.
pub fn required_slots() -> &'static [SlotName] {
    &SlotName::ALL
}

/// A slot value as carried by entities, candidates and the session.
///
/// Serializes as a bare JSON string or boolean. Numbers are accepted on input and
/// kept as their decimal text so that phone numbers sent as integers still work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged, try_from = "serde_json::Value")]
pub enum SlotValue {
    Flag(bool),
    Text(String),
}

impl SlotValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            SlotValue::Flag(b) => Some(*b),
            SlotValue::Text(_) => None,
        }
    }

    /// Only an empty string counts as empty; a `false` flag is a real answer.
    pub fn is_empty(&self) -> bool {
        matches!(self, SlotValue::Text(s) if s.is_empty())
    }
}

impl fmt::Display for SlotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotValue::Text(s) => f.write_str(s),
            SlotValue::Flag(b) => write!(f, "{b}"),
        }
    }
}

impl TryFrom<serde_json::Value> for SlotValue {
    type Error = String;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Bool(b) => Ok(SlotValue::Flag(b)),
            serde_json::Value::String(s) => Ok(SlotValue::Text(s)),
            serde_json::Value::Number(n) => Ok(SlotValue::Text(n.to_string())),
            other => Err(format!(
                "slot value must be a string, number or boolean, got {other}"
            )),
        }
    }
}

impl From<&str> for SlotValue {
    fn from(value: &str) -> Self {
        SlotValue::Text(value.to_string())
    }
}

impl From<bool> for SlotValue {
    fn from(value: bool) -> Self {
        SlotValue::Flag(value)
    }
}

const YES_WORDS: &[&str] = &["yes", "y", "true", "1", "yeah", "yep"];
const NO_WORDS: &[&str] = &["no", "n", "false", "0", "nope", "nah"];

/// Acceptance predicate plus normalization for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRule {
    /// Trimmed text with at least this many characters.
    MinChars(usize),
    /// Digits only, with the digit count inside `min..=max`.
    PhoneDigits { min: usize, max: usize },
    /// A boolean, or a yes/no synonym.
    YesNo,
}

impl SlotRule {
    /// Returns the normalized value, or `None` when the candidate is rejected.
    pub fn apply(&self, candidate: &SlotValue) -> Option<SlotValue> {
        match *self {
            SlotRule::MinChars(min) => {
                let raw = candidate.to_string();
                let trimmed = raw.trim();
                (trimmed.chars().count() >= min).then(|| SlotValue::text(trimmed))
            }
            SlotRule::PhoneDigits { min, max } => {
                // Digits from any script are kept as written.
                let digits: String = candidate
                    .to_string()
                    .chars()
                    .filter(|c| c.is_numeric())
                    .collect();
                (min..=max)
                    .contains(&digits.chars().count())
                    .then_some(SlotValue::Text(digits))
            }
            SlotRule::YesNo => match candidate {
                SlotValue::Flag(b) => Some(SlotValue::Flag(*b)),
                SlotValue::Text(s) => parse_yes_no(s).map(SlotValue::Flag),
            },
        }
    }
}

fn parse_yes_no(text: &str) -> Option<bool> {
    let answer = text.trim().to_lowercase();
    if YES_WORDS.contains(&answer.as_str()) {
        return Some(true);
    }
    if NO_WORDS.contains(&answer.as_str()) {
        return Some(false);
    }
    None
}

#[derive(Debug, Clone, Copy)]
pub struct SlotSpec {
    pub name: SlotName,
    /// Entity type that fills this slot directly.
    pub entity: &'static str,
    pub rule: SlotRule,
    pub prompt: &'static str,
    pub rejection: &'static str,
}

pub const INCIDENT_REPORT_SLOTS: [SlotSpec; 6] = [
    SlotSpec {
        name: SlotName::IncidentType,
        entity: "incident_type",
        rule: SlotRule::MinChars(2),
        prompt: "What type of environmental incident are you reporting? (e.g. illegal dumping, water contamination, open burning)",
        rejection: "Please provide a valid incident type (at least 2 characters).",
    },
    SlotSpec {
        name: SlotName::UserName,
        entity: "user_name",
        rule: SlotRule::MinChars(2),
        prompt: "What is your name?",
        rejection: "Please enter a valid name (at least 2 characters).",
    },
    SlotSpec {
        name: SlotName::ContactNumber,
        entity: "contact_number",
        rule: SlotRule::PhoneDigits { min: 8, max: 15 },
        prompt: "What number can we reach you on?",
        rejection: "Please enter a valid contact number (8-15 digits).",
    },
    SlotSpec {
        name: SlotName::IncidentDescription,
        entity: "incident_description",
        rule: SlotRule::MinChars(6),
        prompt: "Please describe what happened.",
        rejection: "Please provide a detailed description (at least 6 characters).",
    },
    SlotSpec {
        name: SlotName::Address,
        entity: "address",
        rule: SlotRule::MinChars(6),
        prompt: "Where did the incident take place? Please give the full address.",
        rejection: "Please enter a complete address (at least 6 characters).",
    },
    SlotSpec {
        name: SlotName::HasProof,
        entity: "has_proof",
        rule: SlotRule::YesNo,
        prompt: "Do you have any photos, videos or other proof of the incident? (yes/no)",
        rejection: "Please reply with 'yes' or 'no' to indicate if you have proof/evidence.",
    },
];

/// Slot values of one form, always holding all six keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotMap(BTreeMap<SlotName, Option<SlotValue>>);

impl Default for SlotMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotMap {
    pub fn new() -> Self {
        Self(SlotName::ALL.into_iter().map(|s| (s, None)).collect())
    }

    pub fn get(&self, slot: SlotName) -> Option<&SlotValue> {
        self.0.get(&slot).and_then(Option::as_ref)
    }

    pub fn set(&mut self, slot: SlotName, value: Option<SlotValue>) {
        self.0.insert(slot, value);
    }

    pub fn clear(&mut self) {
        for value in self.0.values_mut() {
            *value = None;
        }
    }

    pub fn first_missing(&self) -> Option<SlotName> {
        SlotName::ALL.into_iter().find(|s| self.get(*s).is_none())
    }

    pub fn filled(&self) -> usize {
        SlotName::ALL
            .iter()
            .filter(|s| self.get(**s).is_some())
            .count()
    }
}
