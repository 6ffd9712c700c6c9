//! Application-level error type shared across binaries and services.

use std::path::PathBuf;

use thiserror::Error;

use crate::config;
use crate::pdf::SplitError;
use crate::pipeline::PipelineError;
use crate::services::{AuditError, OcrClientError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    ConfigLoad(#[from] config::AppConfigError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Split(#[from] SplitError),
    #[error(transparent)]
    OcrClient(#[from] OcrClientError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Audit(#[from] AuditError),
    #[error("failed to read input file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unrecognized file extension for {path}")]
    UnknownExtension { path: PathBuf },
}
