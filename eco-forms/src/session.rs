//! Conversation-scoped form state.

use crate::report::ReportId;
use crate::slots::{SlotMap, SlotName, SlotValue};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Lifecycle of one incident form.
///
/// `Submitted` and `Cancelled` are reported for the turn that reached them; the
/// session itself is back to `Inactive` by the time the caller sees them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormState {
    Inactive,
    AwaitingSlot(SlotName),
    Complete,
    Submitted { report_id: ReportId },
    Cancelled,
}

impl FormState {
    pub fn label(&self) -> &'static str {
        match self {
            FormState::Inactive => "inactive",
            FormState::AwaitingSlot(_) => "awaiting_slot",
            FormState::Complete => "complete",
            FormState::Submitted { .. } => "submitted",
            FormState::Cancelled => "cancelled",
        }
    }

    pub fn requested_slot(&self) -> Option<SlotName> {
        match self {
            FormState::AwaitingSlot(slot) => Some(*slot),
            _ => None,
        }
    }
}

/// What an extraction, validation or cancellation wants written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotUpdate {
    /// Nothing usable this turn; re-prompt without touching state.
    Unchanged,
    /// A candidate or normalized value for one slot. `None` means rejected.
    Slot {
        name: SlotName,
        value: Option<SlotValue>,
    },
    /// Every slot and the requested slot cleared.
    Reset,
}

impl SlotUpdate {
    /// Slot-name keyed map as handed to a dialogue engine.
    pub fn to_slot_map(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        match self {
            SlotUpdate::Unchanged => {}
            SlotUpdate::Slot { name, value } => {
                map.insert(name.as_str().to_string(), slot_json(value.as_ref()));
            }
            SlotUpdate::Reset => {
                map.insert("requested_slot".to_string(), serde_json::Value::Null);
                for slot in SlotName::ALL {
                    map.insert(slot.as_str().to_string(), serde_json::Value::Null);
                }
            }
        }
        map
    }
}

fn slot_json(value: Option<&SlotValue>) -> serde_json::Value {
    match value {
        None => serde_json::Value::Null,
        Some(SlotValue::Flag(b)) => serde_json::Value::Bool(*b),
        Some(SlotValue::Text(s)) => serde_json::Value::String(s.clone()),
    }
}

#[derive(Debug, Clone)]
pub struct FormSession {
    pub id: Uuid,
    slots: SlotMap,
    state: FormState,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl Default for FormSession {
    fn default() -> Self {
        Self::new()
    }
}

impl FormSession {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            slots: SlotMap::new(),
            state: FormState::Inactive,
            created_at: now,
            last_active: now,
        }
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn slots(&self) -> &SlotMap {
        &self.slots
    }

    pub fn requested_slot(&self) -> Option<SlotName> {
        self.state.requested_slot()
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            FormState::AwaitingSlot(_) | FormState::Complete
        )
    }

    pub fn apply(&mut self, update: &SlotUpdate) {
        match update {
            SlotUpdate::Unchanged => {}
            SlotUpdate::Slot { name, value } => self.slots.set(*name, value.clone()),
            SlotUpdate::Reset => self.reset(),
        }
        self.touch();
    }

    /// Moves to the first unfilled slot, or to `Complete`.
    pub(crate) fn advance(&mut self) -> FormState {
        self.state = match self.slots.first_missing() {
            Some(slot) => FormState::AwaitingSlot(slot),
            None => FormState::Complete,
        };
        self.touch();
        self.state.clone()
    }

    pub fn reset(&mut self) {
        self.slots.clear();
        self.state = FormState::Inactive;
        self.touch();
    }

    fn touch(&mut self) {
        self.last_active = Utc::now();
    }
}
