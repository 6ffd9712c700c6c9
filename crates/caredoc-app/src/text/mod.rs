//! Text utilities kept pure for reuse across services and pipelines.
//!
//! Functions exposed here must remain side-effect free so they can be
//! composed from orchestrators without introducing hidden IO or mutable
//! state. All master-record matching compares strings after [`normalize`];
//! keyword extraction operates on already-normalized text.

pub mod keywords;
pub mod normalize;

pub use keywords::{KeywordScore, extract_keywords, keyword_match_score};
pub use normalize::normalize;
