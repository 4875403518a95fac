//! Per-agent token usage tracking.
//!
//! Holds the provider-reported usage of the last completed turn; the
//! compactor consults the resulting fraction of the context window. This
//! is an estimate — no local tokenizer.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct TokenCounter {
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

impl TokenCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the usage of a completed assistant turn.
    pub fn update(&self, input_tokens: u64, output_tokens: u64) {
        self.input_tokens.store(input_tokens, Ordering::Relaxed);
        self.output_tokens.store(output_tokens, Ordering::Relaxed);
    }

    pub fn input_tokens(&self) -> u64 {
        self.input_tokens.load(Ordering::Relaxed)
    }

    pub fn output_tokens(&self) -> u64 {
        self.output_tokens.load(Ordering::Relaxed)
    }

    /// Fraction of the context window the last turn consumed.
    pub fn usage_fraction(&self, context_window: u64) -> f64 {
        if context_window == 0 {
            return 0.0;
        }
        (self.input_tokens() + self.output_tokens()) as f64 / context_window as f64
    }

    /// Reset on session reset.
    pub fn reset(&self) {
        self.update(0, 0);
    }
}
