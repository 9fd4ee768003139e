//! Thumbs up / thumbs down feedback on assistant answers.

use crate::reply::{Outbox, ReplyKind};
use crate::report::display_code;
use crate::store::ReportStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const THUMBS_UP_INTENT: &str = "thumbs_up";
pub const THUMBS_DOWN_INTENT: &str = "thumbs_down";

const SAVE_FAILED: &str = "Error saving feedback. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Positive,
    Negative,
}

impl FeedbackKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackKind::Positive => "positive",
            FeedbackKind::Negative => "negative",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub feedback_id: String,
    pub user_query: String,
    pub bot_response: String,
    pub kind: FeedbackKind,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The exchange a piece of feedback refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub user_query: String,
    pub bot_response: String,
}

/// Per-conversation feedback bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct FeedbackState {
    pub last_interaction: Option<Interaction>,
    pub awaiting_description: bool,
}

impl FeedbackState {
    pub fn remember(&mut self, interaction: Interaction) {
        self.last_interaction = Some(interaction);
    }
}

#[derive(Clone)]
pub struct FeedbackCollector {
    store: Arc<dyn ReportStore>,
}

impl FeedbackCollector {
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        Self { store }
    }

    #[tracing::instrument(level = "info", skip_all)]
    pub async fn thumbs_up(
        &self,
        state: &FeedbackState,
        turn_text: &str,
        outbox: &mut Outbox,
    ) -> Option<FeedbackRecord> {
        let record = build_record(state, turn_text, FeedbackKind::Positive, None);
        let stored = self.persist(record, outbox).await?;
        outbox.push(
            ReplyKind::Feedback,
            "Thanks for the positive feedback! It helps us improve.",
        );
        Some(stored)
    }

    /// Asks what went wrong; the next turn is taken as the description.
    pub fn thumbs_down(&self, state: &mut FeedbackState, outbox: &mut Outbox) {
        state.awaiting_description = true;
        outbox.push(
            ReplyKind::Feedback,
            "Sorry to hear that. Please briefly describe what went wrong.",
        );
    }

    #[tracing::instrument(level = "info", skip_all)]
    pub async fn submit_thumbs_down(
        &self,
        state: &mut FeedbackState,
        description: &str,
        outbox: &mut Outbox,
    ) -> Option<FeedbackRecord> {
        state.awaiting_description = false;
        let description = description.trim().to_string();
        let record = build_record(
            state,
            &description,
            FeedbackKind::Negative,
            Some(description.clone()),
        );
        let stored = self.persist(record, outbox).await?;
        outbox.push(
            ReplyKind::Feedback,
            format!("Feedback noted: '{description}'. Thanks for helping us improve!"),
        );
        Some(stored)
    }

    async fn persist(&self, record: FeedbackRecord, outbox: &mut Outbox) -> Option<FeedbackRecord> {
        match self.store.create_feedback(&record).await {
            Ok(()) => {
                tracing::info!(
                    feedback_id = %record.feedback_id,
                    kind = record.kind.as_str(),
                    "feedback stored"
                );
                Some(record)
            }
            Err(e) => {
                tracing::error!(
                    feedback_id = %record.feedback_id,
                    error = %e,
                    "failed to persist feedback"
                );
                outbox.push(ReplyKind::Error, SAVE_FAILED);
                None
            }
        }
    }
}

fn build_record(
    state: &FeedbackState,
    fallback_query: &str,
    kind: FeedbackKind,
    description: Option<String>,
) -> FeedbackRecord {
    let interaction = state.last_interaction.clone().unwrap_or_default();
    let user_query = if interaction.user_query.is_empty() {
        fallback_query.to_string()
    } else {
        interaction.user_query
    };
    FeedbackRecord {
        feedback_id: display_code(),
        user_query,
        bot_response: interaction.bot_response,
        kind,
        description,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FormError, Result};
    use crate::report::IncidentReport;
    use crate::store::MemoryReportStore;
    use async_trait::async_trait;

    struct RejectingStore;

    #[async_trait]
    impl ReportStore for RejectingStore {
        fn backend(&self) -> &str {
            "rejecting"
        }

        async fn create_incident_report(&self, _report: &IncidentReport) -> Result<()> {
            Err(FormError::Storage("disk full".to_string()))
        }

        async fn create_feedback(&self, _feedback: &FeedbackRecord) -> Result<()> {
            Err(FormError::Storage("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn thumbs_up_stores_last_interaction() {
        let store = Arc::new(MemoryReportStore::new());
        let collector = FeedbackCollector::new(store.clone());
        let mut state = FeedbackState::default();
        state.remember(Interaction {
            user_query: "How is the air in Delhi?".to_string(),
            bot_response: "AQI is 180 (unhealthy).".to_string(),
        });
        let mut outbox = Outbox::new();

        let record = collector
            .thumbs_up(&state, "thumbs up", &mut outbox)
            .await
            .expect("stored");
        assert_eq!(record.kind, FeedbackKind::Positive);
        assert_eq!(record.user_query, "How is the air in Delhi?");
        assert_eq!(record.description, None);
        assert_eq!(store.feedback().len(), 1);
        assert!(outbox.contains(ReplyKind::Feedback));
    }

    #[tokio::test]
    async fn thumbs_up_without_history_uses_turn_text() {
        let store = Arc::new(MemoryReportStore::new());
        let collector = FeedbackCollector::new(store.clone());
        let mut outbox = Outbox::new();
        let record = collector
            .thumbs_up(&FeedbackState::default(), "great answer", &mut outbox)
            .await
            .expect("stored");
        assert_eq!(record.user_query, "great answer");
        assert_eq!(record.bot_response, "");
    }

    #[tokio::test]
    async fn thumbs_down_collects_description_on_next_turn() {
        let store = Arc::new(MemoryReportStore::new());
        let collector = FeedbackCollector::new(store.clone());
        let mut state = FeedbackState::default();
        state.remember(Interaction {
            user_query: "Is the lake safe to swim in?".to_string(),
            bot_response: "I don't know.".to_string(),
        });
        let mut outbox = Outbox::new();

        collector.thumbs_down(&mut state, &mut outbox);
        assert!(state.awaiting_description);
        assert!(store.feedback().is_empty());

        let record = collector
            .submit_thumbs_down(&mut state, "  the answer was useless ", &mut outbox)
            .await
            .expect("stored");
        assert!(!state.awaiting_description);
        assert_eq!(record.kind, FeedbackKind::Negative);
        assert_eq!(record.description.as_deref(), Some("the answer was useless"));
        assert_eq!(record.user_query, "Is the lake safe to swim in?");
        assert_eq!(store.feedback().len(), 1);
    }

    #[tokio::test]
    async fn thumbs_up_reports_save_failure() {
        let collector = FeedbackCollector::new(Arc::new(RejectingStore));
        let mut outbox = Outbox::new();
        let record = collector
            .thumbs_up(&FeedbackState::default(), "thumbs up", &mut outbox)
            .await;
        assert!(record.is_none());
        assert_eq!(outbox.replies().len(), 1);
        assert_eq!(outbox.replies()[0].kind, ReplyKind::Error);
        assert_eq!(
            outbox.replies()[0].text,
            "Error saving feedback. Please try again."
        );
        assert!(!outbox.contains(ReplyKind::Feedback));
    }

    #[tokio::test]
    async fn thumbs_down_description_reports_save_failure() {
        let collector = FeedbackCollector::new(Arc::new(RejectingStore));
        let mut state = FeedbackState::default();
        let mut outbox = Outbox::new();
        collector.thumbs_down(&mut state, &mut outbox);

        let mut after = Outbox::new();
        let record = collector
            .submit_thumbs_down(&mut state, "wrong city", &mut after)
            .await;
        assert!(record.is_none());
        assert!(!state.awaiting_description);
        assert_eq!(after.replies().len(), 1);
        assert_eq!(after.replies()[0].kind, ReplyKind::Error);
        assert_eq!(after.replies()[0].text, "Error saving feedback. Please try again.");
    }
}
