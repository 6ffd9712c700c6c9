//! Pluggable segmentation of a multi-document scan.
//!
//! Batch scans often concatenate several logical documents into one PDF.
//! Strategies propose page ranges from per-page resolution results; the
//! heuristics themselves live behind the trait and are not part of this
//! crate's core.

use serde::{Deserialize, Serialize};

use crate::matching::ResolutionResult;

/// A proposed logical document inside a scan, both bounds inclusive and
/// 1-indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start_page: u32,
    pub end_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

pub trait SegmentStrategy: Send + Sync {
    /// Proposes segments from per-page resolution results, one entry per
    /// page in page order.
    fn propose_segments(&self, pages: &[ResolutionResult]) -> Vec<Segment>;
}

/// Default strategy: the whole scan is one document.
pub struct SingleSegmentStrategy;

impl SegmentStrategy for SingleSegmentStrategy {
    fn propose_segments(&self, pages: &[ResolutionResult]) -> Vec<Segment> {
        if pages.is_empty() {
            return Vec::new();
        }
        vec![Segment {
            start_page: 1,
            end_page: pages.len() as u32,
            label: None,
        }]
    }
}
