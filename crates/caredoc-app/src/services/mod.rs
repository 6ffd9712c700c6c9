//! Service layer: OCR invocation, the Gemini client, usage accounting and
//! failure auditing.
//!
//! Everything here is built around trait seams so orchestrators and tests
//! can swap the network-facing pieces for scripted implementations.

pub mod audit;
pub mod gemini;
pub mod ocr;
pub mod usage;

pub use audit::{
    AuditError, AuditSink, ErrorRecord, ErrorStatus, ErrorType, FailureRecorder, FailureReport,
    JsonlAuditSink, LogNotifier, Notification, Notifier, Urgency, classify_complete_failure,
    classify_page_failures,
};
pub use gemini::{GeminiOcrClient, ModelParams, OcrClientError};
pub use ocr::{
    BatchRunReport, CancelFlag, FailureReason, FinishReason, InvokerConfig, OcrClient, OcrInvoker,
    PageFailure, PageOcrResult, PageRecognition,
};
pub use usage::TokenUsage;
