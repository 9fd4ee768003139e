//! Incident report form core for the EcoSentinel action backend.
//!
//! A conversation owns a [`FormSession`]; a [`FormController`] moves it through the
//! slot-filling states one user turn at a time and hands finished reports to a
//! [`ReportStore`].

mod controller;
mod error;
mod exit;
mod feedback;
mod reply;
mod report;
mod session;
mod slots;
mod store;
mod turn;

pub use controller::{FormConfig, FormController, Submission};
pub use error::{FormError, Result};
pub use exit::{EXIT_FORM_INTENT, EXIT_PHRASES, is_exit_command, wants_exit};
pub use feedback::{
    FeedbackCollector, FeedbackKind, FeedbackRecord, FeedbackState, Interaction,
    THUMBS_DOWN_INTENT, THUMBS_UP_INTENT,
};
pub use reply::{Outbox, Reply, ReplyKind};
pub use report::{IncidentReport, ReportId};
pub use session::{FormSession, FormState, SlotUpdate};
pub use slots::{SlotMap, SlotName, SlotRule, SlotSpec, SlotValue, required_slots};
pub use store::{MemoryReportStore, ReportStore, SqliteReportStore};
pub use turn::{Entity, UserTurn};
