use crate::slots::{SlotMap, SlotName, SlotValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Eight uppercase hex characters cut from a v4 uuid.
pub fn display_code() -> String {
    let mut code = Uuid::new_v4().simple().to_string();
    code.truncate(ReportId::LEN);
    code.to_ascii_uppercase()
}

/// Short display code handed to the reporter. Not guaranteed unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(String);

impl ReportId {
    pub const LEN: usize = 8;

    pub fn generate() -> Self {
        Self(display_code())
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentReport {
    pub report_id: ReportId,
    pub incident_type: String,
    pub user_name: String,
    pub contact_number: String,
    pub incident_description: String,
    pub address: String,
    pub has_proof: bool,
    pub created_at: DateTime<Utc>,
}

impl IncidentReport {
    /// Builds a report from filled slots, or returns the first missing text slot.
    ///
    /// `has_proof` falls back to `false` when unset.
    pub fn from_slots(slots: &SlotMap) -> Result<Self, SlotName> {
        let text = |slot: SlotName| -> Result<String, SlotName> {
            slots.get(slot).map(SlotValue::to_string).ok_or(slot)
        };
        Ok(Self {
            report_id: ReportId::generate(),
            incident_type: text(SlotName::IncidentType)?,
            user_name: text(SlotName::UserName)?,
            contact_number: text(SlotName::ContactNumber)?,
            incident_description: text(SlotName::IncidentDescription)?,
            address: text(SlotName::Address)?,
            has_proof: slots
                .get(SlotName::HasProof)
                .and_then(SlotValue::as_flag)
                .unwrap_or(false),
            created_at: Utc::now(),
        })
    }

    pub fn summary(&self) -> String {
        format!(
            "Report Summary:\n\
             Name: {}\n\
             Address: {}\n\
             Contact: {}\n\
             Incident Type: {}\n\
             Proof Available: {}\n\
             Description: {}",
            self.user_name,
            self.address,
            self.contact_number,
            self.incident_type,
            if self.has_proof { "Yes" } else { "No" },
            self.incident_description,
        )
    }
}
