//! Gemini-backed OCR client.
//!
//! One `generateContent` call per page unit: inline base64 bytes plus a
//! fixed transcription instruction. Calls are rate limited process-wide
//! and transient transport failures are retried with jittered backoff.

use std::num::NonZeroU32;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::OcrSettings;
use crate::constants::{DEFAULT_OCR_MODEL, TRANSCRIPTION_PROMPT};
use crate::pdf::PageUnit;
use crate::services::ocr::{FinishReason, OcrClient, PageRecognition};
use crate::services::usage::TokenUsage;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

type OcrRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

fn gemini_rate_limiter(requests_per_second: u32) -> &'static Arc<OcrRateLimiter> {
    static LIMITER: OnceLock<Arc<OcrRateLimiter>> = OnceLock::new();
    LIMITER.get_or_init(|| {
        let rps = NonZeroU32::new(requests_per_second.max(1)).unwrap_or(NonZeroU32::MIN);
        Arc::new(RateLimiter::direct(Quota::per_second(rps)))
    })
}

#[derive(Debug, Error)]
pub enum OcrClientError {
    #[error("ocr transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("ocr backend returned status {status}: {body}")]
    Backend { status: u16, body: String },
    #[error("malformed ocr response: {0}")]
    Malformed(String),
    #[error("missing api key: set GOOGLE_AI_API_KEY or GEMINI_API_KEY")]
    MissingApiKey,
}

impl OcrClientError {
    /// Transient errors are worth a bounded retry; everything else
    /// surfaces immediately as a page failure.
    pub fn is_transient(&self) -> bool {
        match self {
            OcrClientError::Transport(err) => err.is_timeout() || err.is_connect(),
            OcrClientError::Backend { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Generation parameters for a known model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    pub name: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl ModelParams {
    /// Looks up the parameter table; unknown names fall back to the
    /// default model.
    pub fn for_model(name: &str) -> Self {
        match name {
            "gemini-2.0-flash-001" => Self {
                name: name.to_string(),
                max_output_tokens: 8192,
                temperature: 0.1,
            },
            "gemini-1.5-flash" => Self {
                name: name.to_string(),
                max_output_tokens: 8192,
                temperature: 0.1,
            },
            "gemini-1.5-pro" => Self {
                name: name.to_string(),
                max_output_tokens: 32768,
                temperature: 0.1,
            },
            other => {
                warn!(model = other, "unknown model name; using default parameters");
                Self::default()
            }
        }
    }
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            name: DEFAULT_OCR_MODEL.to_string(),
            max_output_tokens: 8192,
            temperature: 0.1,
        }
    }
}

pub struct GeminiOcrClient {
    http: Client,
    api_key: String,
    base_url: String,
    backoff: ExponentialBuilder,
    requests_per_second: u32,
}

impl GeminiOcrClient {
    pub fn new(settings: &OcrSettings) -> Result<Self, OcrClientError> {
        let api_key = std::env::var("GOOGLE_AI_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .map_err(|_| OcrClientError::MissingApiKey)?;
        Self::with_api_key(settings, api_key)
    }

    pub fn with_api_key(
        settings: &OcrSettings,
        api_key: impl Into<String>,
    ) -> Result<Self, OcrClientError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.call_timeout_secs))
            .build()?;
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(5))
            .with_max_times(3)
            .with_jitter();
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: GEMINI_BASE_URL.to_string(),
            backoff,
            requests_per_second: settings.requests_per_second,
        })
    }

    /// Points the client at an alternative endpoint, mainly for tests.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn call_once(
        &self,
        page: &PageUnit,
        model: &ModelParams,
    ) -> Result<PageRecognition, OcrClientError> {
        let encoded = BASE64.encode(page.bytes.as_ref());
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "inline_data": { "mime_type": page.mime_type.as_str(), "data": encoded } },
                    { "text": TRANSCRIPTION_PROMPT },
                ],
            }],
            "generationConfig": {
                "temperature": model.temperature,
                "maxOutputTokens": model.max_output_tokens,
            },
        });

        let url = format!("{}/models/{}:generateContent", self.base_url, model.name);
        debug!(page = page.page_number, model = %model.name, "sending ocr request");
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OcrClientError::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        parsed.into_recognition()
    }
}

#[async_trait]
impl OcrClient for GeminiOcrClient {
    async fn recognize(
        &self,
        page: &PageUnit,
        model: &ModelParams,
    ) -> Result<PageRecognition, OcrClientError> {
        gemini_rate_limiter(self.requests_per_second)
            .until_ready()
            .await;

        let attempt = || self.call_once(page, model);
        attempt
            .retry(self.backoff.clone())
            .when(OcrClientError::is_transient)
            .notify(|err, delay| {
                warn!(page = page.page_number, ?delay, %err, "retrying ocr call");
            })
            .await
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseCandidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}

impl GenerateContentResponse {
    fn into_recognition(self) -> Result<PageRecognition, OcrClientError> {
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| OcrClientError::Malformed("response has no candidates".to_string()))?;

        let text = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let finish_reason = match candidate.finish_reason.as_deref() {
            Some("MAX_TOKENS") => FinishReason::MaxTokens,
            Some("STOP") | None => FinishReason::Complete,
            Some(_) => FinishReason::Other,
        };

        let usage = self
            .usage_metadata
            .map(|meta| {
                TokenUsage::new(
                    meta.prompt_token_count,
                    meta.candidates_token_count,
                    meta.total_token_count,
                )
            })
            .unwrap_or_default();

        Ok(PageRecognition {
            text,
            finish_reason,
            usage,
        })
    }
}
