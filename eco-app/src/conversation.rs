//! Conversation registry and per-turn dispatch.
//!
//! Each conversation sits behind its own async mutex. Callers clone the `Arc` out
//! of the map so no shard lock is held while a turn awaits the report store.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use eco_forms::{
    FeedbackCollector, FeedbackState, FormController, FormSession, FormState, Interaction,
    Outbox, ReplyKind, THUMBS_DOWN_INTENT, THUMBS_UP_INTENT, UserTurn,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const REPORT_INCIDENT_INTENT: &str = "report_incident";

const MAX_CONVERSATION_ID_LEN: usize = 128;
const HINT: &str = "I can help you report an environmental incident. \
Say \"report an incident\" to start the report form.";

#[derive(Debug)]
pub struct Conversation {
    pub id: String,
    pub form: FormSession,
    pub feedback: FeedbackState,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// What one turn produced: the state it reached and the replies for the user.
#[derive(Debug)]
pub struct TurnOutcome {
    pub state: FormState,
    pub outbox: Outbox,
}

impl Conversation {
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            form: FormSession::new(),
            feedback: FeedbackState::default(),
            created_at: now,
            last_active: now,
        }
    }

    fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    pub fn activate_form(&mut self, forms: &FormController) -> TurnOutcome {
        self.touch();
        let mut outbox = Outbox::new();
        let state = forms.activate(&mut self.form, &mut outbox);
        TurnOutcome { state, outbox }
    }

    pub fn exit_form(&mut self, forms: &FormController) -> TurnOutcome {
        self.touch();
        let mut outbox = Outbox::new();
        let state = forms.exit(&mut self.form, &mut outbox);
        TurnOutcome { state, outbox }
    }

    /// Routes a user turn to feedback collection, the running form, form
    /// activation, or a hint, in that order.
    #[tracing::instrument(level = "info", skip_all, fields(conversation_id = %self.id))]
    pub async fn respond(
        &mut self,
        forms: &FormController,
        feedback: &FeedbackCollector,
        turn: &UserTurn,
    ) -> TurnOutcome {
        self.touch();
        let mut outbox = Outbox::new();

        if self.feedback.awaiting_description {
            feedback
                .submit_thumbs_down(&mut self.feedback, turn.trimmed_text(), &mut outbox)
                .await;
            return self.outcome(outbox);
        }
        if turn.has_intent(THUMBS_UP_INTENT) {
            feedback
                .thumbs_up(&self.feedback, turn.trimmed_text(), &mut outbox)
                .await;
            return self.outcome(outbox);
        }
        if turn.has_intent(THUMBS_DOWN_INTENT) {
            feedback.thumbs_down(&mut self.feedback, &mut outbox);
            return self.outcome(outbox);
        }

        let state = if self.form.is_active() {
            forms.handle_turn(&mut self.form, turn, &mut outbox).await
        } else if turn.has_intent(REPORT_INCIDENT_INTENT) {
            forms.activate(&mut self.form, &mut outbox)
        } else {
            outbox.push(ReplyKind::Hint, HINT);
            self.form.state().clone()
        };

        self.feedback.remember(Interaction {
            user_query: turn.text.clone(),
            bot_response: outbox
                .replies()
                .iter()
                .map(|r| r.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
        });
        TurnOutcome { state, outbox }
    }

    fn outcome(&self, outbox: Outbox) -> TurnOutcome {
        TurnOutcome {
            state: self.form.state().clone(),
            outbox,
        }
    }

    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            state: self.form.state().label(),
            requested_slot: self.form.requested_slot().map(|s| s.as_str()),
            filled_slots: self.form.slots().filled(),
            awaiting_feedback: self.feedback.awaiting_description,
            created_at: self.created_at,
            last_active: self.last_active,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: String,
    pub state: &'static str,
    pub requested_slot: Option<&'static str>,
    pub filled_slots: usize,
    pub awaiting_feedback: bool,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

pub fn valid_conversation_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_CONVERSATION_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}

#[derive(Default)]
pub struct ConversationManager {
    conversations: DashMap<String, Arc<Mutex<Conversation>>>,
}

impl ConversationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, id: &str) -> Arc<Mutex<Conversation>> {
        self.conversations
            .entry(id.to_string())
            .or_insert_with(|| {
                tracing::debug!(conversation_id = %id, "conversation created");
                Arc::new(Mutex::new(Conversation::new(id.to_string())))
            })
            .value()
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Mutex<Conversation>>> {
        self.conversations.get(id).map(|e| e.value().clone())
    }

    pub fn remove(&self, id: &str) -> bool {
        self.conversations.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    /// Drops conversations last active before `cutoff`. A conversation that a
    /// request still holds is kept until a later sweep.
    pub fn evict_idle(&self, cutoff: DateTime<Utc>) -> usize {
        let ids: Vec<String> = self
            .conversations
            .iter()
            .map(|e| e.key().clone())
            .collect();
        let mut evicted = 0;
        for id in ids {
            let removed = self.conversations.remove_if(&id, |_, handle| {
                Arc::strong_count(handle) == 1
                    && handle
                        .try_lock()
                        .map(|c| c.last_active < cutoff)
                        .unwrap_or(false)
            });
            if removed.is_some() {
                evicted += 1;
            }
        }
        if evicted > 0 {
            tracing::info!(
                evicted,
                remaining = self.conversations.len(),
                "idle conversations evicted"
            );
        }
        evicted
    }

    /// Summaries, most recently active first.
    pub async fn list(&self) -> Vec<ConversationSummary> {
        let handles: Vec<_> = self
            .conversations
            .iter()
            .map(|e| e.value().clone())
            .collect();
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            out.push(handle.lock().await.summary());
        }
        out.sort_by_key(|s| s.last_active);
        out.reverse();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eco_forms::{FormConfig, MemoryReportStore, SlotName};

    fn collaborators() -> (FormController, FeedbackCollector, Arc<MemoryReportStore>) {
        let store = Arc::new(MemoryReportStore::new());
        (
            FormController::new(store.clone(), FormConfig::default()),
            FeedbackCollector::new(store.clone()),
            store,
        )
    }

    #[test]
    fn conversation_ids_are_restricted() {
        assert!(valid_conversation_id("web-42"));
        assert!(valid_conversation_id("telegram:1234_5"));
        assert!(!valid_conversation_id(""));
        assert!(!valid_conversation_id("has space"));
        assert!(!valid_conversation_id(&"x".repeat(129)));
    }

    #[tokio::test]
    async fn get_or_create_returns_same_conversation() {
        let manager = ConversationManager::new();
        let first = manager.get_or_create("c1");
        let second = manager.get_or_create("c1");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.len(), 1);
        assert!(manager.remove("c1"));
        assert!(!manager.remove("c1"));
        assert!(manager.get("c1").is_none());
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let manager = ConversationManager::new();
        manager.get_or_create("old");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let newer = manager.get_or_create("new");
        newer.lock().await.touch();
        let ids: Vec<_> = manager.list().await.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["new".to_string(), "old".to_string()]);
    }

    #[tokio::test]
    async fn evict_idle_keeps_recent_and_held_conversations() {
        let manager = ConversationManager::new();
        let long_ago = Utc::now() - chrono::Duration::hours(2);
        manager.get_or_create("stale").lock().await.last_active = long_ago;
        let held = manager.get_or_create("held");
        held.lock().await.last_active = long_ago;
        manager.get_or_create("recent");

        let evicted = manager.evict_idle(Utc::now() - chrono::Duration::hours(1));
        assert_eq!(evicted, 1);
        assert!(manager.get("stale").is_none());
        assert!(manager.get("held").is_some());
        assert!(manager.get("recent").is_some());

        drop(held);
        assert_eq!(manager.evict_idle(Utc::now() - chrono::Duration::hours(1)), 1);
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test]
    async fn plain_turn_gets_hint_and_is_remembered() {
        let (forms, feedback, _) = collaborators();
        let mut conv = Conversation::new("c".to_string());
        let outcome = conv
            .respond(&forms, &feedback, &UserTurn::text("what is this?"))
            .await;
        assert_eq!(outcome.state, FormState::Inactive);
        assert!(outcome.outbox.contains(ReplyKind::Hint));
        let last = conv.feedback.last_interaction.as_ref().expect("remembered");
        assert_eq!(last.user_query, "what is this?");
        assert_eq!(last.bot_response, HINT);
    }

    #[tokio::test]
    async fn report_intent_starts_form_and_turns_drive_it() {
        let (forms, feedback, _) = collaborators();
        let mut conv = Conversation::new("c".to_string());
        let outcome = conv
            .respond(
                &forms,
                &feedback,
                &UserTurn::text("I want to report pollution").with_intent(REPORT_INCIDENT_INTENT),
            )
            .await;
        assert_eq!(
            outcome.state,
            FormState::AwaitingSlot(SlotName::IncidentType)
        );
        assert!(outcome.outbox.contains(ReplyKind::Intro));

        let outcome = conv
            .respond(&forms, &feedback, &UserTurn::text("chemical spill"))
            .await;
        assert_eq!(outcome.state, FormState::AwaitingSlot(SlotName::UserName));
    }

    #[tokio::test]
    async fn thumbs_down_then_description_is_stored() {
        let (forms, feedback, store) = collaborators();
        let mut conv = Conversation::new("c".to_string());
        conv.respond(&forms, &feedback, &UserTurn::text("hello"))
            .await;

        let outcome = conv
            .respond(
                &forms,
                &feedback,
                &UserTurn::text("bad").with_intent(THUMBS_DOWN_INTENT),
            )
            .await;
        assert!(outcome.outbox.contains(ReplyKind::Feedback));
        assert!(conv.feedback.awaiting_description);

        conv.respond(&forms, &feedback, &UserTurn::text("it ignored my question"))
            .await;
        assert!(!conv.feedback.awaiting_description);
        let stored = store.feedback();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].user_query, "hello");
        assert_eq!(stored[0].description.as_deref(), Some("it ignored my question"));
    }

    #[tokio::test]
    async fn thumbs_up_during_form_keeps_form_running() {
        let (forms, feedback, store) = collaborators();
        let mut conv = Conversation::new("c".to_string());
        conv.activate_form(&forms);
        let outcome = conv
            .respond(
                &forms,
                &feedback,
                &UserTurn::text("nice").with_intent(THUMBS_UP_INTENT),
            )
            .await;
        assert_eq!(
            outcome.state,
            FormState::AwaitingSlot(SlotName::IncidentType)
        );
        assert_eq!(store.feedback().len(), 1);
    }

    #[tokio::test]
    async fn exit_form_resets_conversation_form() {
        let (forms, _, _) = collaborators();
        let mut conv = Conversation::new("c".to_string());
        conv.activate_form(&forms);
        let outcome = conv.exit_form(&forms);
        assert_eq!(outcome.state, FormState::Cancelled);
        assert_eq!(conv.form.state(), &FormState::Inactive);
        assert!(outcome.outbox.contains(ReplyKind::Cancelled));
    }
}
