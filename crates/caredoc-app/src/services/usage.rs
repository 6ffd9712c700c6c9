use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Token accounting reported by the OCR backend for a single call, summed
/// across successful pages for a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub candidates_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, candidates_tokens: u64, total_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            candidates_tokens,
            total_tokens,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prompt_tokens == 0 && self.candidates_tokens == 0 && self.total_tokens == 0
    }

    pub fn merge(&mut self, other: &TokenUsage) {
        *self += *other;
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(mut self, other: TokenUsage) -> TokenUsage {
        self += other;
        self
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        debug_assert!(self.total_tokens <= u64::MAX - rhs.total_tokens);
        self.prompt_tokens += rhs.prompt_tokens;
        self.candidates_tokens += rhs.candidates_tokens;
        self.total_tokens += rhs.total_tokens;
    }
}
