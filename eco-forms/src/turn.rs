use crate::slots::SlotValue;
use serde::{Deserialize, Serialize};

/// A structured annotation attached to a user turn by the NLU step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub entity: String,
    pub value: SlotValue,
}

/// The latest user message as seen by the form controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserTurn {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

impl UserTurn {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            intent: None,
            entities: Vec::new(),
        }
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    pub fn with_entity(mut self, entity: impl Into<String>, value: impl Into<SlotValue>) -> Self {
        self.entities.push(Entity {
            entity: entity.into(),
            value: value.into(),
        });
        self
    }

    /// First entity of the given type, if any.
    pub fn entity_value(&self, entity_type: &str) -> Option<&SlotValue> {
        self.entities
            .iter()
            .find(|e| e.entity == entity_type)
            .map(|e| &e.value)
    }

    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }

    pub fn has_intent(&self, name: &str) -> bool {
        self.intent.as_deref() == Some(name)
    }
}
