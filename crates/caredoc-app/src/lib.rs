//! Core library for the caredoc back office: PDF page splitting, batched
//! OCR against a Gemini-compatible backend, master-record matching for
//! customers, offices and document types, and failure auditing.

pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod matching;
pub mod pdf;
pub mod pipeline;
pub mod services;
pub mod text;

pub use error::AppError;
