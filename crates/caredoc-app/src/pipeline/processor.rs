//! End-to-end document processing.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::SplitSettings;
use crate::error::AppError;
use crate::matching::{EntityKind, MasterRecord, ResolutionResult, resolve};
use crate::pdf::split_into_pages;
use crate::services::{
    CancelFlag, FailureRecorder, ModelParams, OcrClient, OcrInvoker, PageFailure, PageOcrResult,
    TokenUsage, classify_complete_failure, classify_page_failures,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Message(String),
}

impl PipelineError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// The master records a document is resolved against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MasterRegistry {
    #[serde(default)]
    pub customers: Vec<MasterRecord>,
    #[serde(default)]
    pub offices: Vec<MasterRecord>,
    #[serde(default)]
    pub document_types: Vec<MasterRecord>,
}

/// Everything produced for one input file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentOutcome {
    pub outcome_id: String,
    pub file_id: String,
    pub file_name: String,
    pub total_pages: u32,
    pub pages: Vec<PageOcrResult>,
    pub failures: Vec<PageFailure>,
    pub customers: ResolutionResult,
    pub offices: ResolutionResult,
    pub document_types: ResolutionResult,
    pub usage: TokenUsage,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

pub struct DocumentProcessor<C> {
    invoker: OcrInvoker<C>,
    model: ModelParams,
    split: SplitSettings,
    registry: Arc<MasterRegistry>,
    recorder: Arc<FailureRecorder>,
}

impl<C: OcrClient> DocumentProcessor<C> {
    pub fn new(
        invoker: OcrInvoker<C>,
        model: ModelParams,
        split: SplitSettings,
        registry: Arc<MasterRegistry>,
        recorder: Arc<FailureRecorder>,
    ) -> Self {
        Self {
            invoker,
            model,
            split,
            registry,
            recorder,
        }
    }

    /// Splits, OCRs and resolves one file, recording any failure through
    /// the audit recorder. A splitter error is a complete failure; missing
    /// pages after the run are a partial failure.
    pub async fn process(
        &self,
        file_id: &str,
        file_name: &str,
        bytes: &[u8],
        mime: &str,
        cancel: &CancelFlag,
    ) -> Result<DocumentOutcome, AppError> {
        if file_id.trim().is_empty() {
            return Err(PipelineError::message("file id must not be empty").into());
        }

        let outcome_id = Uuid::new_v4().to_string();
        let started = Instant::now();

        let units = match split_into_pages(bytes, mime, &self.split) {
            Ok(units) => units,
            Err(err) => {
                let report = classify_complete_failure(file_id, err.to_string());
                self.recorder.record(&outcome_id, report).await?;
                return Err(err.into());
            }
        };
        let total_pages = units.len() as u32;
        debug!(file_id, total_pages, "document split into pages");

        let run = self.invoker.run(&units, &self.model, cancel).await;

        let assembled = assemble_page_texts(&run.results);
        let customers = resolve(&assembled, &self.registry.customers, EntityKind::Customer);
        let offices = resolve(&assembled, &self.registry.offices, EntityKind::Office);
        let document_types = resolve(
            &assembled,
            &self.registry.document_types,
            EntityKind::DocumentType,
        );

        // A cancelled run leaves the tail pages unattempted; they are not
        // failures, so page-level classification only applies to full runs.
        if !run.cancelled {
            let received: Vec<u32> = run.results.iter().map(|r| r.page_number).collect();
            let details = summarize_failures(&run.failures);
            if let Some(report) =
                classify_page_failures(file_id, total_pages, &received, details)
            {
                self.recorder.record(&outcome_id, report).await?;
            }
        }

        info!(
            file_id,
            total_pages,
            ok = run.results.len(),
            failed = run.failures.len(),
            cancelled = run.cancelled,
            "document processed"
        );

        Ok(DocumentOutcome {
            outcome_id,
            file_id: file_id.to_string(),
            file_name: file_name.to_string(),
            total_pages,
            pages: run.results,
            failures: run.failures,
            customers,
            offices,
            document_types,
            usage: run.usage,
            cancelled: run.cancelled,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Joins successful page texts with page headers so document-level
/// matching sees where each page starts.
pub fn assemble_page_texts(results: &[PageOcrResult]) -> String {
    results
        .iter()
        .map(|result| format!("--- Page {} ---\n{}", result.page_number, result.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn summarize_failures(failures: &[PageFailure]) -> String {
    if failures.is_empty() {
        return "pages missing from the response".to_string();
    }
    failures
        .iter()
        .map(|failure| format!("page {}: {}", failure.page_number, failure.detail))
        .collect::<Vec<_>>()
        .join("; ")
}
