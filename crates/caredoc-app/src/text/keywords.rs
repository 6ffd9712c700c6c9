//! Keyword extraction used by the keyword-overlap matching tier.

use std::sync::OnceLock;

use regex::Regex;

use crate::text::normalize;

/// Corporate and generic tokens that carry no distinguishing power.
const NOISE_TOKENS: [&str; 10] = [
    "株式会社",
    "有限会社",
    "合同会社",
    "社会福祉法人",
    "医療法人",
    "一般社団法人",
    "npo法人",
    "ケアセンター",
    "センター",
    "サービス",
];

/// Care-facility vocabulary matched verbatim. Checked before noise
/// stripping because サービス is itself a noise token inside デイサービス.
const FACILITY_TERMS: [&str; 8] = [
    "ショートステイ",
    "デイサービス",
    "グループホーム",
    "特養",
    "老健",
    "訪問介護",
    "訪問看護",
    "居宅介護",
];

fn location_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[一-龯ぁ-んァ-ヶ]+[市区町村]").expect("valid location pattern"))
}

fn katakana_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ァ-ヶー]{3,}").expect("valid katakana pattern"))
}

fn kanji_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[一-龯]{2,6}").expect("valid kanji pattern"))
}

/// Normalized forms of the token tables, computed once. The raw tables
/// contain ー which [`normalize`] folds to `-`, so comparing raw tokens
/// against normalized text would silently never match.
fn normalized_noise() -> &'static Vec<String> {
    static TOKENS: OnceLock<Vec<String>> = OnceLock::new();
    TOKENS.get_or_init(|| NOISE_TOKENS.iter().map(|t| normalize(t)).collect())
}

fn normalized_facility_terms() -> &'static Vec<String> {
    static TOKENS: OnceLock<Vec<String>> = OnceLock::new();
    TOKENS.get_or_init(|| FACILITY_TERMS.iter().map(|t| normalize(t)).collect())
}

/// Extracts matching keywords from already-normalized text.
///
/// Facility vocabulary is collected first, then noise tokens are stripped
/// and the remaining passes (locations, katakana runs, kanji runs) walk the
/// cleaned text. Results are deduplicated in first-seen order; tokens
/// shorter than two characters are dropped.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    let mut push = |candidate: &str, keywords: &mut Vec<String>| {
        if !keywords.iter().any(|k| k == candidate) {
            keywords.push(candidate.to_string());
        }
    };

    for term in normalized_facility_terms() {
        if text.contains(term.as_str()) {
            push(term, &mut keywords);
        }
    }

    let mut cleaned = text.to_string();
    for token in normalized_noise() {
        cleaned = cleaned.replace(token.as_str(), "");
    }

    for found in location_re().find_iter(&cleaned) {
        push(found.as_str(), &mut keywords);
    }
    for found in katakana_re().find_iter(&cleaned) {
        push(found.as_str(), &mut keywords);
    }
    for found in kanji_re().find_iter(&cleaned) {
        push(found.as_str(), &mut keywords);
    }

    keywords.retain(|k| k.chars().count() >= 2);
    keywords
}

/// Overlap between document keywords and a master record's keywords.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeywordScore {
    /// 0..=100, share of record keywords found in the document.
    pub score: u32,
    /// Summed character length of the matched keyword pairs, taking the
    /// shorter side of each pair.
    pub matched_char_len: usize,
}

/// Scores how much of `record_keywords` is covered by `text_keywords`.
/// Containment counts in either direction so that a longer OCR token still
/// matches a shorter registered keyword and vice versa.
pub fn keyword_match_score(text_keywords: &[String], record_keywords: &[String]) -> KeywordScore {
    if record_keywords.is_empty() {
        return KeywordScore::default();
    }

    let mut matched = 0usize;
    let mut matched_char_len = 0usize;
    for record_kw in record_keywords {
        let hit = text_keywords.iter().find(|text_kw| {
            text_kw.contains(record_kw.as_str()) || record_kw.contains(text_kw.as_str())
        });
        if let Some(text_kw) = hit {
            matched += 1;
            matched_char_len += record_kw.chars().count().min(text_kw.chars().count());
        }
    }

    let score = ((100.0 * matched as f64 / record_keywords.len() as f64).round()) as u32;
    KeywordScore {
        score,
        matched_char_len,
    }
}
