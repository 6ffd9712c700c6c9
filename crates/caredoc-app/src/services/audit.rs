//! Failure classification, error records and notifications.
//!
//! Two shapes of trouble reach this module: a whole-file failure where no
//! page-level accounting exists, and a partial failure where some pages
//! came back and some did not. Each qualifying outcome produces exactly
//! one error record and one notification.

use std::collections::{HashSet, VecDeque};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to append error record to {path}: {source}")]
    Sink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    CompleteFailure,
    PartialFailure,
    /// Reserved for collaborators that log post-OCR extraction problems.
    Extraction,
    FileOp,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorStatus {
    Unhandled,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Urgent,
    Normal,
}

/// Durable description of one failed processing outcome.
///
/// For a complete failure the page counters are absent, not zero: nothing
/// was counted because nothing structured came back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub error_id: String,
    pub error_type: ErrorType,
    pub file_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_pages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_pages: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub failed_page_numbers: Vec<u32>,
    pub details: String,
    pub status: ErrorStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub urgency: Urgency,
    pub subject: String,
    pub body: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub recipients: Vec<String>,
}

/// A classified failure ready to be recorded and announced.
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub record: ErrorRecord,
    pub urgency: Urgency,
}

fn new_error_id() -> String {
    Uuid::new_v4().to_string()
}

/// Classifies a whole-file failure. Always urgent; page counters stay
/// absent because no structured response exists.
pub fn classify_complete_failure(file_id: &str, details: impl Into<String>) -> FailureReport {
    FailureReport {
        record: ErrorRecord {
            error_id: new_error_id(),
            error_type: ErrorType::CompleteFailure,
            file_id: file_id.to_string(),
            total_pages: None,
            success_pages: None,
            failed_pages: None,
            failed_page_numbers: Vec::new(),
            details: details.into(),
            status: ErrorStatus::Unhandled,
            created_at: Utc::now(),
        },
        urgency: Urgency::Urgent,
    }
}

/// Classifies a page-level outcome. Returns `None` when every expected
/// page came back. Missing page numbers are derived from the expected
/// range, so duplicate or out-of-order receipts cannot skew the count.
pub fn classify_page_failures(
    file_id: &str,
    total_pages: u32,
    received_pages: &[u32],
    details: impl Into<String>,
) -> Option<FailureReport> {
    let received: HashSet<u32> = received_pages.iter().copied().collect();
    let failed_page_numbers: Vec<u32> = (1..=total_pages)
        .filter(|page| !received.contains(page))
        .collect();
    if failed_page_numbers.is_empty() {
        return None;
    }

    let failed_pages = failed_page_numbers.len() as u32;
    let success_pages = total_pages - failed_pages;
    let urgency = if f64::from(failed_pages) / f64::from(total_pages.max(1)) >= 0.5 {
        Urgency::Urgent
    } else {
        Urgency::Normal
    };

    Some(FailureReport {
        record: ErrorRecord {
            error_id: new_error_id(),
            error_type: ErrorType::PartialFailure,
            file_id: file_id.to_string(),
            total_pages: Some(total_pages),
            success_pages: Some(success_pages),
            failed_pages: Some(failed_pages),
            failed_page_numbers,
            details: details.into(),
            status: ErrorStatus::Unhandled,
            created_at: Utc::now(),
        },
        urgency,
    })
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &ErrorRecord) -> Result<(), AuditError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), AuditError>;
}

/// Appends one JSON line per error record.
pub struct JsonlAuditSink {
    path: PathBuf,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn append(&self, record: &ErrorRecord) -> Result<(), AuditError> {
        let line = serde_json::to_string(record)?;
        let path = self.path.clone();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| AuditError::Sink {
                path: path.clone(),
                source,
            })?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::Sink {
                path: path.clone(),
                source,
            })?;
        writeln!(file, "{line}").map_err(|source| AuditError::Sink { path, source })?;
        Ok(())
    }
}

/// Emits notifications through the tracing pipeline; the production
/// deployment watches these log lines.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), AuditError> {
        match notification.urgency {
            Urgency::Urgent => warn!(
                subject = %notification.subject,
                recipients = notification.recipients.len(),
                "{}",
                notification.body
            ),
            Urgency::Normal => info!(
                subject = %notification.subject,
                recipients = notification.recipients.len(),
                "{}",
                notification.body
            ),
        }
        Ok(())
    }
}

/// Outcome ids recorded in this window. Bounded so a long-lived process
/// does not accumulate one entry per document; the oldest id is evicted
/// once the window is full.
const SEEN_OUTCOME_WINDOW: usize = 1024;

struct SeenWindow {
    capacity: usize,
    order: VecDeque<String>,
    set: HashSet<String>,
}

impl SeenWindow {
    fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            set: HashSet::with_capacity(capacity),
        }
    }

    /// Returns `false` when `id` is already in the window.
    fn insert(&mut self, id: &str) -> bool {
        if self.set.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.set.insert(id.to_string());
        true
    }
}

/// Records classified failures exactly once per outcome.
pub struct FailureRecorder {
    sink: Box<dyn AuditSink>,
    notifier: Box<dyn Notifier>,
    recipients: Vec<String>,
    seen: Mutex<SeenWindow>,
}

impl FailureRecorder {
    pub fn new(
        sink: Box<dyn AuditSink>,
        notifier: Box<dyn Notifier>,
        recipients: Vec<String>,
    ) -> Self {
        Self {
            sink,
            notifier,
            recipients,
            seen: Mutex::new(SeenWindow::new(SEEN_OUTCOME_WINDOW)),
        }
    }

    /// Appends the record and sends its notification. A second call with
    /// the same `outcome_id` is a no-op and returns `None`.
    pub async fn record(
        &self,
        outcome_id: &str,
        report: FailureReport,
    ) -> Result<Option<String>, AuditError> {
        {
            let mut seen = self.seen.lock().expect("seen set poisoned");
            if !seen.insert(outcome_id) {
                debug!(outcome_id, "outcome already recorded; skipping");
                return Ok(None);
            }
        }

        let notification = self.build_notification(&report);
        let error_id = report.record.error_id.clone();
        self.sink.append(&report.record).await?;
        self.notifier.notify(&notification).await?;
        Ok(Some(error_id))
    }

    fn build_notification(&self, report: &FailureReport) -> Notification {
        let record = &report.record;
        let subject = match record.error_type {
            ErrorType::PartialFailure => format!(
                "[OCR] {} of {} pages failed for file {}",
                record.failed_pages.unwrap_or(0),
                record.total_pages.unwrap_or(0),
                record.file_id
            ),
            _ => format!("[OCR] complete failure for file {}", record.file_id),
        };
        let body = match record.error_type {
            ErrorType::PartialFailure => format!(
                "error {}: pages {:?} did not return text\n{}\nstatus: unhandled",
                record.error_id, record.failed_page_numbers, record.details
            ),
            _ => format!(
                "error {}: {}\nstatus: unhandled",
                record.error_id, record.details
            ),
        };
        Notification {
            urgency: report.urgency,
            subject,
            body,
            recipients: self.recipients.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn partial_failure_lists_missing_pages_in_order() {
        let report = classify_page_failures("file-1", 6, &[1, 2, 4, 6], "two pages failed")
            .expect("should classify");

        let record = &report.record;
        assert_eq!(record.error_type, ErrorType::PartialFailure);
        assert_eq!(record.total_pages, Some(6));
        assert_eq!(record.success_pages, Some(4));
        assert_eq!(record.failed_pages, Some(2));
        assert_eq!(record.failed_page_numbers, vec![3, 5]);
        assert_eq!(record.status, ErrorStatus::Unhandled);
        assert_eq!(report.urgency, Urgency::Normal);
    }

    #[test]
    fn half_failed_pages_is_urgent() {
        let report =
            classify_page_failures("file-1", 6, &[1, 2, 3], "half failed").expect("classifies");
        assert_eq!(report.urgency, Urgency::Urgent);

        let mild =
            classify_page_failures("file-1", 6, &[1, 2, 3, 4], "one third").expect("classifies");
        assert_eq!(mild.urgency, Urgency::Normal);
    }

    #[test]
    fn all_pages_received_yields_no_report() {
        assert!(classify_page_failures("file-1", 3, &[1, 2, 3], "fine").is_none());
    }

    #[test]
    fn complete_failure_has_absent_counters_and_is_urgent() {
        let report = classify_complete_failure("file-1", "エラー: backend exploded");

        let record = &report.record;
        assert_eq!(record.error_type, ErrorType::CompleteFailure);
        assert_eq!(record.total_pages, None);
        assert_eq!(record.success_pages, None);
        assert_eq!(record.failed_pages, None);
        assert!(record.failed_page_numbers.is_empty());
        assert_eq!(report.urgency, Urgency::Urgent);

        let json = serde_json::to_value(record).expect("serializes");
        assert!(json.get("total_pages").is_none());
    }

    #[test]
    fn error_ids_are_fresh() {
        let first = classify_complete_failure("f", "x");
        let second = classify_complete_failure("f", "x");
        assert_ne!(first.record.error_id, second.record.error_id);
    }

    struct CountingSink(Arc<AtomicUsize>);

    #[async_trait]
    impl AuditSink for CountingSink {
        async fn append(&self, _record: &ErrorRecord) -> Result<(), AuditError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CountingNotifier(Arc<AtomicUsize>);

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn notify(&self, _notification: &Notification) -> Result<(), AuditError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn recorder_writes_once_per_outcome() {
        let appended = Arc::new(AtomicUsize::new(0));
        let notified = Arc::new(AtomicUsize::new(0));
        let recorder = FailureRecorder::new(
            Box::new(CountingSink(appended.clone())),
            Box::new(CountingNotifier(notified.clone())),
            vec!["ops@example.jp".to_string()],
        );

        let report = classify_complete_failure("file-1", "boom");
        let first = recorder.record("outcome-1", report.clone()).await.expect("records");
        let second = recorder.record("outcome-1", report).await.expect("records");

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(appended.load(Ordering::SeqCst), 1);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn seen_window_is_bounded_and_evicts_oldest() {
        let mut window = SeenWindow::new(2);

        assert!(window.insert("a"));
        assert!(window.insert("b"));
        assert!(!window.insert("a"));

        // inserting a third id pushes out the oldest
        assert!(window.insert("c"));
        assert!(window.insert("a"));
        assert!(!window.insert("c"));
        assert_eq!(window.order.len(), 2);
        assert_eq!(window.set.len(), 2);
    }
}
