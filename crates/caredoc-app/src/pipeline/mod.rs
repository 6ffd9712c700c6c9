//! Document-level orchestration: split, OCR, match, audit.
//!
//! The processor owns no IO beyond what its injected collaborators do, so
//! a scripted OCR client and counting audit sinks make the whole flow
//! testable end to end.

pub mod processor;
pub mod segment;

pub use processor::{
    DocumentOutcome, DocumentProcessor, MasterRegistry, PipelineError, assemble_page_texts,
};
pub use segment::{Segment, SegmentStrategy, SingleSegmentStrategy};
