//! Master-record matching for customers, offices and document types.
//!
//! Matching is tiered: exact containment beats alias containment beats a
//! partial name prefix beats keyword overlap. The first tier that fires for
//! a record decides its score; records that score zero are dropped.

use serde::{Deserialize, Serialize};

use crate::constants::MAX_CANDIDATES;
use crate::text::{extract_keywords, keyword_match_score, normalize};

/// A registered customer, care office or document type.
///
/// `is_duplicate` is maintained by the registry owner; a duplicate record
/// can still win a match but must never be auto-confirmed downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub is_duplicate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Curated matching keywords; when empty they are derived from the
    /// name at resolution time.
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Customer,
    Office,
    DocumentType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Alias,
    Partial,
    Keyword,
    Fuzzy,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub name: String,
    pub score: u32,
    pub match_type: MatchType,
    pub is_duplicate: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub candidates: Vec<Candidate>,
    pub best: Option<Candidate>,
}

impl ResolutionResult {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Resolves `text` against `records`, returning at most
/// [`MAX_CANDIDATES`] candidates sorted by descending score.
///
/// Office ties at equal score go to the longer normalized name, which
/// favors the more specific branch office over its parent.
pub fn resolve(text: &str, records: &[MasterRecord], kind: EntityKind) -> ResolutionResult {
    let haystack = normalize(text);
    if haystack.is_empty() || records.is_empty() {
        return ResolutionResult::default();
    }
    let text_keywords = extract_keywords(&haystack);

    let mut scored: Vec<(Candidate, usize)> = Vec::new();
    for record in records {
        let name_norm = normalize(&record.name);
        if name_norm.is_empty() {
            continue;
        }
        if let Some((score, match_type)) =
            score_record(&haystack, &text_keywords, record, &name_norm, kind)
        {
            let norm_len = name_norm.chars().count();
            scored.push((
                Candidate {
                    id: record.id.clone(),
                    name: record.name.clone(),
                    score,
                    match_type,
                    is_duplicate: record.is_duplicate,
                },
                norm_len,
            ));
        }
    }

    scored.sort_by(|(a, a_len), (b, b_len)| {
        b.score.cmp(&a.score).then_with(|| {
            if kind == EntityKind::Office {
                b_len.cmp(a_len)
            } else {
                std::cmp::Ordering::Equal
            }
        })
    });
    scored.truncate(MAX_CANDIDATES);

    let candidates: Vec<Candidate> = scored.into_iter().map(|(c, _)| c).collect();
    let best = candidates.first().cloned();
    ResolutionResult { candidates, best }
}

/// Applies the tier cascade to a single record. Returns `None` when no
/// tier fires (score would be zero).
fn score_record(
    haystack: &str,
    text_keywords: &[String],
    record: &MasterRecord,
    name_norm: &str,
    kind: EntityKind,
) -> Option<(u32, MatchType)> {
    if haystack.contains(name_norm) {
        return Some((100, MatchType::Exact));
    }

    for alias in &record.aliases {
        let alias_norm = normalize(alias);
        if !alias_norm.is_empty() && haystack.contains(alias_norm.as_str()) {
            return Some((95, MatchType::Alias));
        }
    }

    if matches!(kind, EntityKind::Customer | EntityKind::Office) {
        if let Some(score) = partial_prefix_score(haystack, name_norm, kind) {
            return Some((score, MatchType::Partial));
        }
    }

    if matches!(kind, EntityKind::Office | EntityKind::DocumentType) {
        let record_keywords = if record.keywords.is_empty() {
            extract_keywords(name_norm)
        } else {
            record.keywords.iter().map(|k| normalize(k)).collect()
        };
        let overlap = keyword_match_score(text_keywords, &record_keywords);
        if overlap.score >= 70 {
            let bonus = (overlap.score - 70) / 5;
            let length_bonus = (overlap.matched_char_len / 3).min(10) as u32;
            let score = (80 + bonus + length_bonus).min(95);
            return Some((score, MatchType::Keyword));
        }
    }

    None
}

/// Prefix tier: the leading `floor(len * 0.75)` characters of the
/// normalized name must appear in the text. Names too short to yield a
/// two-character prefix never fire this tier.
fn partial_prefix_score(haystack: &str, name_norm: &str, kind: EntityKind) -> Option<u32> {
    let chars: Vec<char> = name_norm.chars().collect();
    let len = chars.len();
    let prefix_len = (len * 3) / 4;
    if prefix_len < 2 {
        return None;
    }
    debug_assert!(prefix_len <= len);

    let prefix: String = chars[..prefix_len].iter().collect();
    if !haystack.contains(prefix.as_str()) {
        return None;
    }

    let score = match kind {
        EntityKind::Customer => 85,
        EntityKind::Office => (70 + (len as u32) / 2).min(80),
        EntityKind::DocumentType => return None,
    };
    Some(score)
}
