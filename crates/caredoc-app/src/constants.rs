//! Cross-cutting application constants.

/// Model used when no explicit model name is configured or the configured
/// name is unknown.
pub const DEFAULT_OCR_MODEL: &str = "gemini-2.0-flash-001";

/// Pages OCRed concurrently in one batch.
pub const DEFAULT_BATCH_SIZE: usize = 3;

/// Pause between consecutive batches, in milliseconds.
pub const DEFAULT_BATCH_PAUSE_MS: u64 = 500;

/// Per-page OCR call deadline, in seconds.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 120;

/// Inputs above this size are rejected before parsing.
pub const DEFAULT_MAX_FILE_BYTES: usize = 100 * 1024 * 1024;

/// Page counts above this trigger a warning, never a failure.
pub const DEFAULT_LARGE_PAGE_WARNING: usize = 200;

/// Upper bound on candidates returned per entity type.
pub const MAX_CANDIDATES: usize = 5;

/// Instruction sent alongside each page image or single-page PDF.
pub const TRANSCRIPTION_PROMPT: &str = "この文書の全てのテキストを正確に書き起こしてください。表は構造を保ち、手書き文字も可能な限り読み取ってください。説明やコメントは不要です。";
