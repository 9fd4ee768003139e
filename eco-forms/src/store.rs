//! Persistence collaborator for submitted reports and feedback.

use crate::error::{FormError, Result};
use crate::feedback::FeedbackRecord;
use crate::report::{IncidentReport, ReportId};
use async_trait::async_trait;
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Backend label for logs.
    fn backend(&self) -> &str;

    async fn create_incident_report(&self, report: &IncidentReport) -> Result<()>;

    async fn create_feedback(&self, feedback: &FeedbackRecord) -> Result<()>;
}

/// In-process store, used for ephemeral runs and tests.
#[derive(Default)]
pub struct MemoryReportStore {
    reports: Mutex<Vec<IncidentReport>>,
    feedback: Mutex<Vec<FeedbackRecord>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<IncidentReport> {
        self.reports
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    pub fn feedback(&self) -> Vec<FeedbackRecord> {
        self.feedback
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn create_incident_report(&self, report: &IncidentReport) -> Result<()> {
        self.reports
            .lock()
            .map_err(|e| FormError::Storage(format!("report store poisoned: {e}")))?
            .push(report.clone());
        Ok(())
    }

    async fn create_feedback(&self, feedback: &FeedbackRecord) -> Result<()> {
        self.feedback
            .lock()
            .map_err(|e| FormError::Storage(format!("feedback store poisoned: {e}")))?
            .push(feedback.clone());
        Ok(())
    }
}

/// SQLite-backed store. Each call opens its own connection on a blocking thread.
#[derive(Clone)]
pub struct SqliteReportStore {
    path: Arc<PathBuf>,
}

impl SqliteReportStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.as_os_str().is_empty() {
            return Err(FormError::Storage("sqlite path is required".to_string()));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                FormError::Storage(format!("create data dir {}: {e}", parent.display()))
            })?;
        }
        let store = Self {
            path: Arc::new(path),
        };
        store.with_connection(ensure_schema).await?;
        tracing::info!(path = %store.path.display(), "sqlite report store ready");
        Ok(store)
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(path.as_path())?;
            f(&conn)
        })
        .await?
    }

    pub async fn count_reports(&self) -> Result<usize> {
        self.with_connection(|conn| {
            let n: i64 =
                conn.query_row("SELECT COUNT(*) FROM incident_reports", [], |row| row.get(0))?;
            Ok(n as usize)
        })
        .await
    }

    pub async fn load_report(&self, report_id: &str) -> Result<Option<IncidentReport>> {
        let report_id = report_id.to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare_cached(
                r#"
SELECT report_id, incident_type, user_name, contact_number,
       incident_description, address, has_proof, created_at
  FROM incident_reports
 WHERE report_id = ?1
"#,
            )?;
            let mut rows = stmt.query(params![report_id])?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };
            let created_at: String = row.get(7)?;
            let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| FormError::Storage(format!("bad created_at {created_at:?}: {e}")))?
                .with_timezone(&chrono::Utc);
            let report_id: String = row.get(0)?;
            Ok(Some(IncidentReport {
                report_id: ReportId::new(report_id),
                incident_type: row.get(1)?,
                user_name: row.get(2)?,
                contact_number: row.get(3)?,
                incident_description: row.get(4)?,
                address: row.get(5)?,
                has_proof: row.get::<_, i64>(6)? != 0,
                created_at,
            }))
        })
        .await
    }
}

fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS incident_reports (
    report_id TEXT NOT NULL,
    incident_type TEXT NOT NULL,
    user_name TEXT NOT NULL,
    contact_number TEXT NOT NULL,
    incident_description TEXT NOT NULL,
    address TEXT NOT NULL,
    has_proof INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS feedback (
    feedback_id TEXT NOT NULL,
    user_query TEXT NOT NULL,
    bot_response TEXT NOT NULL,
    feedback_type TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL
);
"#,
    )?;
    Ok(())
}

#[async_trait]
impl ReportStore for SqliteReportStore {
    fn backend(&self) -> &str {
        "sqlite"
    }

    #[tracing::instrument(level = "debug", skip_all, fields(report_id = %report.report_id))]
    async fn create_incident_report(&self, report: &IncidentReport) -> Result<()> {
        let report = report.clone();
        self.with_connection(move |conn| {
            conn.execute(
                r#"
INSERT INTO incident_reports (
    report_id, incident_type, user_name, contact_number,
    incident_description, address, has_proof, created_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
"#,
                params![
                    report.report_id.as_str(),
                    report.incident_type,
                    report.user_name,
                    report.contact_number,
                    report.incident_description,
                    report.address,
                    report.has_proof as i64,
                    report.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    #[tracing::instrument(level = "debug", skip_all, fields(feedback_id = %feedback.feedback_id))]
    async fn create_feedback(&self, feedback: &FeedbackRecord) -> Result<()> {
        let feedback = feedback.clone();
        self.with_connection(move |conn| {
            conn.execute(
                r#"
INSERT INTO feedback (
    feedback_id, user_query, bot_response, feedback_type, description, created_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#,
                params![
                    feedback.feedback_id.as_str(),
                    feedback.user_query,
                    feedback.bot_response,
                    feedback.kind.as_str(),
                    feedback.description,
                    feedback.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::{SlotMap, SlotName};

    fn sample_report() -> IncidentReport {
        let mut slots = SlotMap::new();
        slots.set(SlotName::IncidentType, Some("illegal dumping".into()));
        slots.set(SlotName::UserName, Some("Jane Doe".into()));
        slots.set(SlotName::ContactNumber, Some("5551234567".into()));
        slots.set(
            SlotName::IncidentDescription,
            Some("trash dumped behind warehouse".into()),
        );
        slots.set(SlotName::Address, Some("123 Main Street".into()));
        slots.set(SlotName::HasProof, Some(true.into()));
        IncidentReport::from_slots(&slots).expect("complete slots")
    }

    #[tokio::test]
    async fn sqlite_store_persists_reports() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SqliteReportStore::open(tmp.path().join("data").join("reports.db"))
            .await
            .expect("open store");
        let report = sample_report();
        store
            .create_incident_report(&report)
            .await
            .expect("insert report");

        assert_eq!(store.count_reports().await.unwrap(), 1);
        let loaded = store
            .load_report(report.report_id.as_str())
            .await
            .unwrap()
            .expect("report present");
        assert_eq!(loaded.user_name, "Jane Doe");
        assert!(loaded.has_proof);
        assert_eq!(loaded.created_at, report.created_at);
        assert!(store.load_report("MISSING1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sqlite_store_reopens_existing_schema() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("reports.db");
        let first = SqliteReportStore::open(&path).await.unwrap();
        first.create_incident_report(&sample_report()).await.unwrap();

        let second = SqliteReportStore::open(&path).await.unwrap();
        assert_eq!(second.count_reports().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn memory_store_keeps_reports() {
        let store = MemoryReportStore::new();
        store.create_incident_report(&sample_report()).await.unwrap();
        assert_eq!(store.reports().len(), 1);
        assert_eq!(store.backend(), "memory");
    }
}
