// Stack Sage: LLM Retry Policy
// Exponential backoff with jitter for transient chat-completion failures.

use crate::error::SageError;
use std::time::Duration;

/// Configuration for retry behavior with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum retry attempts after the initial call.
    pub max_retries: u32,
    /// Base delay, doubled per attempt.
    pub base_delay_ms: u64,
    /// Cap on the exponential growth.
    pub max_delay_ms: u64,
    /// Jitter factor (0.0 to 1.0) added on top of the computed delay.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 8000,
            jitter_factor: 0.2,
        }
    }
}

impl RetryConfig {
    /// No sleeping between attempts; used by tests.
    pub fn immediate() -> Self {
        Self {
            max_retries: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_factor: 0.0,
        }
    }

    /// Delay before retry `attempt` (0-indexed).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay_ms.saturating_mul(2u64.saturating_pow(attempt));
        let capped = exponential.min(self.max_delay_ms);

        // Jitter prevents synchronized retries against a struggling upstream.
        let jitter_range = (capped as f64 * self.jitter_factor) as u64;
        let jitter = if jitter_range > 0 {
            fastrand::u64(0..jitter_range)
        } else {
            0
        };

        Duration::from_millis(capped + jitter)
    }

    /// Whether the error is worth another attempt.
    pub fn should_retry(&self, error: &SageError, attempt: u32) -> bool {
        attempt < self.max_retries && error.is_transient()
    }
}
