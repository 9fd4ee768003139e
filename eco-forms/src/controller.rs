//! Incident report form controller.
//!
//! Extraction and validation are single routines driven by the slot table in
//! [`crate::slots`]. Every entry point checks for an exit request before looking
//! at the turn, and every terminal path leaves the session reset.

use crate::exit::{is_exit_command, wants_exit};
use crate::report::{IncidentReport, ReportId};
use crate::reply::{Outbox, ReplyKind};
use crate::session::{FormSession, FormState, SlotUpdate};
use crate::slots::{SlotMap, SlotName, SlotValue};
use crate::store::ReportStore;
use crate::turn::UserTurn;
use std::sync::Arc;

const INTRO: &str = "Environmental Incident Report Form\n\n\
I'll help you report an environmental incident. Please answer the following questions.\n\
(You can type 'exit' at any time to cancel)";
const CANCELLED: &str =
    "Form cancelled. Your information was not saved. How else can I help you?";
const MISSING_INFO: &str = "Error: Some required information is missing. Please try again.";
const SAVE_FAILED: &str = "Sorry, there was an error saving your report. \
Please try again later or contact our support team.";

#[derive(Debug, Clone)]
pub struct FormConfig {
    /// Where reporters with proof upload their evidence.
    pub evidence_portal_url: String,
    /// Shown in the closing message, e.g. "24-48 hours".
    pub review_window: String,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            evidence_portal_url: "https://ecosentinel.example.org/evidence".to_string(),
            review_window: "24-48 hours".to_string(),
        }
    }
}

/// Result of a submission attempt. The session is reset in every case.
#[derive(Debug, Clone)]
pub enum Submission {
    Stored(IncidentReport),
    MissingSlot(SlotName),
    StoreFailed { report_id: ReportId, error: String },
}

#[derive(Clone)]
pub struct FormController {
    store: Arc<dyn ReportStore>,
    config: FormConfig,
}

impl FormController {
    pub fn new(store: Arc<dyn ReportStore>, config: FormConfig) -> Self {
        Self { store, config }
    }

    /// Abandons the form. Safe to call on an empty form.
    pub fn cancel(&self, outbox: &mut Outbox) -> SlotUpdate {
        outbox.push(ReplyKind::Cancelled, CANCELLED);
        SlotUpdate::Reset
    }

    #[tracing::instrument(level = "debug", skip_all, fields(slot = %slot))]
    pub fn extract(&self, slot: SlotName, turn: &UserTurn, outbox: &mut Outbox) -> SlotUpdate {
        if wants_exit(turn) {
            tracing::debug!("exit requested during extraction");
            return self.cancel(outbox);
        }

        let spec = slot.spec();
        if let Some(value) = turn.entity_value(spec.entity).filter(|v| !v.is_empty()) {
            return SlotUpdate::Slot {
                name: slot,
                value: Some(value.clone()),
            };
        }

        let text = turn.trimmed_text();
        if !text.is_empty() && !is_exit_command(text) {
            return SlotUpdate::Slot {
                name: slot,
                value: Some(SlotValue::text(text)),
            };
        }

        SlotUpdate::Unchanged
    }

    #[tracing::instrument(level = "debug", skip_all, fields(slot = %slot))]
    pub fn validate(
        &self,
        slot: SlotName,
        candidate: Option<&SlotValue>,
        turn: &UserTurn,
        outbox: &mut Outbox,
    ) -> SlotUpdate {
        if wants_exit(turn) {
            tracing::debug!("exit requested during validation");
            return self.cancel(outbox);
        }

        let spec = slot.spec();
        let candidate = match candidate {
            Some(value) if !value.is_empty() => value.clone(),
            _ => SlotValue::text(turn.trimmed_text()),
        };

        match spec.rule.apply(&candidate) {
            Some(value) => SlotUpdate::Slot {
                name: slot,
                value: Some(value),
            },
            None => {
                tracing::debug!(rule = ?spec.rule, "slot value rejected");
                outbox.push(ReplyKind::Correction, spec.rejection);
                SlotUpdate::Slot {
                    name: slot,
                    value: None,
                }
            }
        }
    }

    /// Starts the form, or re-asks the pending slot if it is already running.
    #[tracing::instrument(level = "info", skip_all, fields(session_id = %session.id))]
    pub fn activate(&self, session: &mut FormSession, outbox: &mut Outbox) -> FormState {
        if !session.is_active() {
            outbox.push(ReplyKind::Intro, INTRO);
        }
        let state = session.advance();
        if let FormState::AwaitingSlot(slot) = state {
            outbox.push(ReplyKind::Prompt, slot.spec().prompt);
        }
        state
    }

    /// Explicit exit action, independent of the current turn.
    #[tracing::instrument(level = "info", skip_all, fields(session_id = %session.id))]
    pub fn exit(&self, session: &mut FormSession, outbox: &mut Outbox) -> FormState {
        let update = self.cancel(outbox);
        session.apply(&update);
        FormState::Cancelled
    }

    /// Drives one user turn through extraction, validation and, once every slot is
    /// filled, submission. Returns the state reached by this turn.
    #[tracing::instrument(level = "info", skip_all, fields(session_id = %session.id))]
    pub async fn handle_turn(
        &self,
        session: &mut FormSession,
        turn: &UserTurn,
        outbox: &mut Outbox,
    ) -> FormState {
        let slot = match session.requested_slot() {
            Some(slot) => slot,
            None if session.state() == &FormState::Complete => {
                return self.finish(session, outbox).await;
            }
            None => return session.state().clone(),
        };

        let candidate = match self.extract(slot, turn, outbox) {
            SlotUpdate::Reset => {
                session.apply(&SlotUpdate::Reset);
                return FormState::Cancelled;
            }
            SlotUpdate::Unchanged => {
                outbox.push(ReplyKind::Prompt, slot.spec().prompt);
                return session.state().clone();
            }
            SlotUpdate::Slot { value, .. } => value,
        };

        let update = self.validate(slot, candidate.as_ref(), turn, outbox);
        session.apply(&update);
        match update {
            SlotUpdate::Reset => return FormState::Cancelled,
            SlotUpdate::Slot { value: None, .. } | SlotUpdate::Unchanged => {
                outbox.push(ReplyKind::Prompt, slot.spec().prompt);
                return session.state().clone();
            }
            SlotUpdate::Slot { value: Some(_), .. } => {}
        }

        match session.advance() {
            FormState::AwaitingSlot(next) => {
                tracing::debug!(filled = %slot, next = %next, "slot accepted");
                outbox.push(ReplyKind::Prompt, next.spec().prompt);
                FormState::AwaitingSlot(next)
            }
            _ => self.finish(session, outbox).await,
        }
    }

    async fn finish(&self, session: &mut FormSession, outbox: &mut Outbox) -> FormState {
        match self.submit(session, outbox).await {
            Submission::Stored(report) => FormState::Submitted {
                report_id: report.report_id,
            },
            Submission::MissingSlot(_) | Submission::StoreFailed { .. } => FormState::Inactive,
        }
    }

    /// Hands the filled form to the store and resets the session, whatever the outcome.
    #[tracing::instrument(
        level = "info",
        skip_all,
        fields(session_id = %session.id, store = self.store.backend())
    )]
    pub async fn submit(&self, session: &mut FormSession, outbox: &mut Outbox) -> Submission {
        let outcome = self.submit_slots(session.slots(), outbox).await;
        session.reset();
        outcome
    }

    async fn submit_slots(&self, slots: &SlotMap, outbox: &mut Outbox) -> Submission {
        let report = match IncidentReport::from_slots(slots) {
            Ok(report) => report,
            Err(missing) => {
                tracing::warn!(missing_slot = %missing, "submit called with unfilled slot");
                outbox.push(ReplyKind::Error, MISSING_INFO);
                return Submission::MissingSlot(missing);
            }
        };

        if let Err(e) = self.store.create_incident_report(&report).await {
            tracing::error!(
                report_id = %report.report_id,
                error = %e,
                "failed to persist incident report"
            );
            outbox.push(ReplyKind::Error, SAVE_FAILED);
            return Submission::StoreFailed {
                report_id: report.report_id,
                error: e.to_string(),
            };
        }

        tracing::info!(
            report_id = %report.report_id,
            incident_type = %report.incident_type,
            has_proof = report.has_proof,
            "incident report stored"
        );
        self.announce(&report, outbox);
        Submission::Stored(report)
    }

    fn announce(&self, report: &IncidentReport, outbox: &mut Outbox) {
        let id = &report.report_id;
        outbox.push(
            ReplyKind::Submitted,
            format!(
                "Thank you! Your incident report has been successfully submitted.\n\n\
                 Your Report ID: {id}\nPlease save this ID for your records."
            ),
        );
        outbox.push(ReplyKind::Summary, report.summary());
        if report.has_proof {
            outbox.push(
                ReplyKind::Evidence,
                format!(
                    "Upload Evidence:\nSince you mentioned having proof/evidence, please visit our \
                     evidence portal and use your Report ID {id} to upload any photos, videos, or \
                     documents.\n\nPortal Link: {}\nYour Report ID: {id}",
                    self.config.evidence_portal_url
                ),
            );
        }
        outbox.push(
            ReplyKind::Closing,
            format!(
                "Your report will be reviewed by our team within {}. \
                 Thank you for helping protect our environment!",
                self.config.review_window
            ),
        );
    }
}
