//! Matching-oriented normalization for Japanese document text.

use unicode_normalization::UnicodeNormalization;

/// Dash variants that OCR output mixes freely; all unified to `-`.
/// NFKC already folds the fullwidth hyphen, the rest are kept explicit.
const DASH_VARIANTS: [char; 5] = ['－', '‐', '―', 'ー', '−'];

/// Bracket characters stripped entirely. The fullwidth parens are listed
/// even though NFKC folds them to ASCII first.
const BRACKETS: [char; 10] = ['（', '）', '(', ')', '「', '」', '『', '』', '【', '】'];

/// Canonical form used for every master-record comparison.
///
/// NFKC runs before the character-level passes so that applying the
/// function twice yields the same string (NFKC can widen characters, e.g.
/// `™` to `tm`, which the later passes would otherwise see only on the
/// second application).
pub fn normalize(input: &str) -> String {
    let folded: String = input.nfkc().collect();
    let mut out = String::with_capacity(folded.len());
    for ch in folded.chars() {
        if ch.is_whitespace() {
            continue;
        }
        if DASH_VARIANTS.contains(&ch) {
            out.push('-');
            continue;
        }
        if BRACKETS.contains(&ch) {
            continue;
        }
        for lower in ch.to_lowercase() {
            out.push(lower);
        }
    }
    out
}
