//! Configuration loading and XDG path helpers.

use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::constants::{
    DEFAULT_BATCH_PAUSE_MS, DEFAULT_BATCH_SIZE, DEFAULT_CALL_TIMEOUT_SECS,
    DEFAULT_LARGE_PAGE_WARNING, DEFAULT_MAX_FILE_BYTES, DEFAULT_OCR_MODEL,
};

const CONFIG_FILE: &str = "config/caredoc";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("unable to resolve project directories")]
    MissingProjectDirs,
    #[error(transparent)]
    Build(#[from] config::ConfigError),
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub ocr: OcrSettings,
    pub split: SplitSettings,
    pub audit: AuditSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrSettings {
    pub model: String,
    pub batch_size: usize,
    pub batch_pause_ms: u64,
    pub call_timeout_secs: u64,
    pub requests_per_second: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SplitSettings {
    pub max_file_bytes: usize,
    pub large_page_warning: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuditSettings {
    /// JSONL file that receives one line per recorded error.
    pub log_path: PathBuf,
    /// Recipients named in generated notifications.
    pub notify_recipients: Vec<String>,
}

pub fn load() -> Result<AppConfig, AppConfigError> {
    let default_audit_log = default_audit_log_path()?;
    let builder = Config::builder()
        .set_default("ocr.model", DEFAULT_OCR_MODEL)?
        .set_default("ocr.batch_size", DEFAULT_BATCH_SIZE as i64)?
        .set_default("ocr.batch_pause_ms", DEFAULT_BATCH_PAUSE_MS as i64)?
        .set_default("ocr.call_timeout_secs", DEFAULT_CALL_TIMEOUT_SECS as i64)?
        .set_default("ocr.requests_per_second", 2)?
        .set_default("split.max_file_bytes", DEFAULT_MAX_FILE_BYTES as i64)?
        .set_default("split.large_page_warning", DEFAULT_LARGE_PAGE_WARNING as i64)?
        .set_default(
            "audit.log_path",
            default_audit_log.to_string_lossy().to_string(),
        )?
        .set_default("audit.notify_recipients", Vec::<String>::new())?
        .add_source(File::with_name(CONFIG_FILE).required(false))
        .add_source(Environment::with_prefix("CAREDOC").separator("__"));

    let cfg = builder.build()?.try_deserialize()?;
    Ok(cfg)
}

pub fn project_dirs() -> Result<ProjectDirs, AppConfigError> {
    ProjectDirs::from("jp", "kaname", "caredoc").ok_or(AppConfigError::MissingProjectDirs)
}

fn default_audit_log_path() -> Result<PathBuf, AppConfigError> {
    Ok(project_dirs()?.data_dir().join("errors.jsonl"))
}
