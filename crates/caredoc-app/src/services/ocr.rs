//! Batched OCR invocation with per-page failure isolation.
//!
//! Pages are dispatched in fixed-size batches; calls inside a batch run
//! concurrently and a short pause separates consecutive batches to stay
//! inside backend quotas. A failed page never takes down its batch, and
//! cancellation is honored only between batches so in-flight calls always
//! complete.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bon::Builder;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::constants::{DEFAULT_BATCH_PAUSE_MS, DEFAULT_BATCH_SIZE, DEFAULT_CALL_TIMEOUT_SECS};
use crate::pdf::PageUnit;
use crate::services::gemini::{ModelParams, OcrClientError};
use crate::services::usage::TokenUsage;

/// Abstraction over the OCR backend so the invoker can be exercised
/// without network access.
#[async_trait]
pub trait OcrClient: Send + Sync {
    async fn recognize(
        &self,
        page: &PageUnit,
        model: &ModelParams,
    ) -> Result<PageRecognition, OcrClientError>;
}

/// Raw result of one backend call, before the invoker applies its own
/// success and failure rules.
#[derive(Debug, Clone)]
pub struct PageRecognition {
    pub text: String,
    pub finish_reason: FinishReason,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Complete,
    /// The transcription was cut at the output-token ceiling. The page
    /// counts as failed even though the call returned.
    MaxTokens,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageOcrResult {
    pub page_number: u32,
    pub text: String,
    pub finish_reason: FinishReason,
    pub usage: TokenUsage,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    EmptyText,
    MaxTokens,
    Client,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageFailure {
    pub page_number: u32,
    pub reason: FailureReason,
    pub detail: String,
}

/// Outcome of one invoker run.
///
/// `results` is sorted by page number; `failures` stays in discovery
/// order. `attempted` counts pages actually dispatched, which is fewer
/// than the input when the run was cancelled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchRunReport {
    pub results: Vec<PageOcrResult>,
    pub failures: Vec<PageFailure>,
    pub usage: TokenUsage,
    pub attempted: usize,
    pub cancelled: bool,
}

/// Cooperative cancellation signal shared between the caller and a run.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Builder)]
pub struct InvokerConfig {
    #[builder(default = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
    #[builder(default = Duration::from_millis(DEFAULT_BATCH_PAUSE_MS))]
    pub batch_pause: Duration,
    #[builder(default = Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS))]
    pub call_timeout: Duration,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

pub struct OcrInvoker<C> {
    client: Arc<C>,
    config: InvokerConfig,
}

impl<C: OcrClient> OcrInvoker<C> {
    pub fn new(client: Arc<C>, config: InvokerConfig) -> Self {
        Self { client, config }
    }

    /// Runs OCR over `pages` in batches.
    ///
    /// Invariant: `results.len() + failures.len() == attempted`.
    pub async fn run(
        &self,
        pages: &[PageUnit],
        model: &ModelParams,
        cancel: &CancelFlag,
    ) -> BatchRunReport {
        let batch_size = self.config.batch_size.max(1);
        let total_batches = pages.len().div_ceil(batch_size);
        let mut report = BatchRunReport::default();

        for (batch_index, batch) in pages.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                warn!(
                    completed_batches = batch_index,
                    remaining_pages = pages.len() - report.attempted,
                    "ocr run cancelled at batch boundary"
                );
                break;
            }

            debug!(
                batch = batch_index + 1,
                total_batches,
                pages = batch.len(),
                "dispatching ocr batch"
            );
            let calls = batch.iter().map(|page| self.recognize_page(page, model));
            for outcome in join_all(calls).await {
                report.attempted += 1;
                match outcome {
                    Ok(result) => {
                        report.usage += result.usage;
                        report.results.push(result);
                    }
                    Err(failure) => report.failures.push(failure),
                }
            }

            let has_more = (batch_index + 1) * batch_size < pages.len();
            if has_more {
                sleep(self.config.batch_pause).await;
            }
        }

        report.results.sort_by_key(|result| result.page_number);
        debug_assert_eq!(
            report.results.len() + report.failures.len(),
            report.attempted
        );
        report
    }

    async fn recognize_page(
        &self,
        page: &PageUnit,
        model: &ModelParams,
    ) -> Result<PageOcrResult, PageFailure> {
        let started = Instant::now();
        let call = self.client.recognize(page, model);

        let recognition = match timeout(self.config.call_timeout, call).await {
            Err(_) => {
                return Err(PageFailure {
                    page_number: page.page_number,
                    reason: FailureReason::Timeout,
                    detail: format!("no response within {:?}", self.config.call_timeout),
                });
            }
            Ok(Err(err)) => {
                return Err(PageFailure {
                    page_number: page.page_number,
                    reason: FailureReason::Client,
                    detail: err.to_string(),
                });
            }
            Ok(Ok(recognition)) => recognition,
        };

        if recognition.finish_reason == FinishReason::MaxTokens {
            warn!(
                page = page.page_number,
                "transcription truncated at the output-token ceiling"
            );
            return Err(PageFailure {
                page_number: page.page_number,
                reason: FailureReason::MaxTokens,
                detail: "output cut at the token ceiling".to_string(),
            });
        }

        if recognition.text.trim().is_empty() {
            return Err(PageFailure {
                page_number: page.page_number,
                reason: FailureReason::EmptyText,
                detail: "backend returned no text".to_string(),
            });
        }

        Ok(PageOcrResult {
            page_number: page.page_number,
            text: recognition.text,
            finish_reason: recognition.finish_reason,
            usage: recognition.usage,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::pdf::DocMimeType;

    #[derive(Debug, Clone)]
    enum Script {
        Text(&'static str),
        TextWithUsage(&'static str, TokenUsage),
        Empty,
        Truncated,
        Fail,
        Hang,
        CancelThenText(&'static str),
    }

    struct ScriptedClient {
        scripts: HashMap<u32, Script>,
        cancel: Mutex<Option<CancelFlag>>,
    }

    impl ScriptedClient {
        fn new(scripts: impl IntoIterator<Item = (u32, Script)>) -> Self {
            Self {
                scripts: scripts.into_iter().collect(),
                cancel: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl OcrClient for ScriptedClient {
        async fn recognize(
            &self,
            page: &PageUnit,
            _model: &ModelParams,
        ) -> Result<PageRecognition, OcrClientError> {
            let script = self
                .scripts
                .get(&page.page_number)
                .cloned()
                .unwrap_or(Script::Text("page text"));
            let ok = |text: &str, usage: TokenUsage| {
                Ok(PageRecognition {
                    text: text.to_string(),
                    finish_reason: FinishReason::Complete,
                    usage,
                })
            };
            match script {
                Script::Text(text) => ok(text, TokenUsage::new(10, 5, 15)),
                Script::TextWithUsage(text, usage) => ok(text, usage),
                Script::Empty => ok("  \n", TokenUsage::new(10, 0, 10)),
                Script::Truncated => Ok(PageRecognition {
                    text: "途中で切れた本文".to_string(),
                    finish_reason: FinishReason::MaxTokens,
                    usage: TokenUsage::new(10, 5, 15),
                }),
                Script::Fail => Err(OcrClientError::Malformed("scripted failure".to_string())),
                Script::Hang => {
                    sleep(Duration::from_secs(5)).await;
                    ok("late", TokenUsage::default())
                }
                Script::CancelThenText(text) => {
                    if let Some(flag) = self.cancel.lock().expect("lock").as_ref() {
                        flag.cancel();
                    }
                    ok(text, TokenUsage::new(10, 5, 15))
                }
            }
        }
    }

    fn pages(count: u32) -> Vec<PageUnit> {
        (1..=count)
            .map(|page_number| PageUnit {
                page_number,
                bytes: Arc::from(vec![0u8; 4]),
                mime_type: DocMimeType::Pdf,
            })
            .collect()
    }

    fn fast_config() -> InvokerConfig {
        InvokerConfig::builder()
            .batch_size(3)
            .batch_pause(Duration::from_millis(1))
            .call_timeout(Duration::from_millis(200))
            .build()
    }

    fn invoker(client: ScriptedClient, config: InvokerConfig) -> OcrInvoker<ScriptedClient> {
        OcrInvoker::new(Arc::new(client), config)
    }

    #[tokio::test]
    async fn results_cover_all_attempted_pages_and_stay_sorted() {
        let client = ScriptedClient::new([(2, Script::Fail)]);
        let invoker = invoker(client, fast_config());

        let report = invoker
            .run(&pages(5), &ModelParams::default(), &CancelFlag::new())
            .await;

        assert_eq!(report.attempted, 5);
        assert_eq!(report.results.len() + report.failures.len(), 5);
        let numbers: Vec<u32> = report.results.iter().map(|r| r.page_number).collect();
        assert_eq!(numbers, vec![1, 3, 4, 5]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].page_number, 2);
        assert_eq!(report.failures[0].reason, FailureReason::Client);
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn usage_sums_successful_pages_only() {
        let client = ScriptedClient::new([
            (1, Script::TextWithUsage("a", TokenUsage::new(100, 20, 120))),
            (2, Script::Fail),
            (3, Script::TextWithUsage("b", TokenUsage::new(50, 10, 60))),
        ]);
        let invoker = invoker(client, fast_config());

        let report = invoker
            .run(&pages(3), &ModelParams::default(), &CancelFlag::new())
            .await;

        assert_eq!(report.usage.total_tokens, 180);
        assert_eq!(report.usage.prompt_tokens, 150);
    }

    #[tokio::test]
    async fn empty_text_is_a_page_failure() {
        let client = ScriptedClient::new([(1, Script::Empty)]);
        let invoker = invoker(client, fast_config());

        let report = invoker
            .run(&pages(1), &ModelParams::default(), &CancelFlag::new())
            .await;

        assert!(report.results.is_empty());
        assert_eq!(report.failures[0].reason, FailureReason::EmptyText);
    }

    #[tokio::test]
    async fn truncated_output_is_a_page_failure() {
        let client = ScriptedClient::new([(2, Script::Truncated)]);
        let invoker = invoker(client, fast_config());

        let report = invoker
            .run(&pages(3), &ModelParams::default(), &CancelFlag::new())
            .await;

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.failures[0].page_number, 2);
        assert_eq!(report.failures[0].reason, FailureReason::MaxTokens);
        // Failed pages contribute no token usage.
        assert_eq!(report.usage.total_tokens, 30);
    }

    #[tokio::test]
    async fn slow_call_times_out_without_aborting_the_batch() {
        let client = ScriptedClient::new([(2, Script::Hang)]);
        let invoker = invoker(client, fast_config());

        let report = invoker
            .run(&pages(3), &ModelParams::default(), &CancelFlag::new())
            .await;

        assert_eq!(report.attempted, 3);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.failures[0].page_number, 2);
        assert_eq!(report.failures[0].reason, FailureReason::Timeout);
    }

    #[tokio::test]
    async fn cancellation_is_honored_only_at_batch_boundaries() {
        // Page 1 flips the cancel flag while its own batch is in flight;
        // the whole first batch still completes, later batches never start.
        let client = ScriptedClient::new([(1, Script::CancelThenText("first"))]);
        let cancel = CancelFlag::new();
        *client.cancel.lock().expect("lock") = Some(cancel.clone());
        let config = InvokerConfig::builder()
            .batch_size(2)
            .batch_pause(Duration::from_millis(1))
            .call_timeout(Duration::from_millis(200))
            .build();
        let invoker = invoker(client, config);

        let report = invoker.run(&pages(5), &ModelParams::default(), &cancel).await;

        assert!(report.cancelled);
        assert_eq!(report.attempted, 2);
        assert_eq!(report.results.len(), 2);
        // Unattempted pages are not failures.
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn already_cancelled_run_attempts_nothing() {
        let client = ScriptedClient::new([]);
        let invoker = invoker(client, fast_config());
        let cancel = CancelFlag::new();
        cancel.cancel();

        let report = invoker.run(&pages(4), &ModelParams::default(), &cancel).await;

        assert!(report.cancelled);
        assert_eq!(report.attempted, 0);
        assert!(report.results.is_empty());
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn empty_page_list_is_a_noop() {
        let client = ScriptedClient::new([]);
        let invoker = invoker(client, fast_config());

        let report = invoker
            .run(&[], &ModelParams::default(), &CancelFlag::new())
            .await;

        assert_eq!(report.attempted, 0);
        assert!(report.usage.is_empty());
        assert!(!report.cancelled);
    }
}
