//! Engine tuning knobs.

use std::time::Duration;

use ledger_types::{AccountType, Currency};

/// Settings shared by the ledger services.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a resolved fee rule stays cached
    pub fee_cache_ttl: Duration,
    /// Bound of the event delivery queue
    pub event_queue_capacity: usize,
    /// Buffer of the live event stream
    pub event_stream_capacity: usize,
    pub event_workers: usize,
    pub event_retry: RetryPolicy,
    /// Per-call bound on receipt, webhook and directory calls
    pub collaborator_timeout: Duration,
    /// Owners per seeding batch
    pub seed_batch_size: usize,
    pub currencies: Vec<Currency>,
    pub account_types: Vec<AccountType>,
    /// Pending journals older than this are failed by the sweeper
    pub pending_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fee_cache_ttl: Duration::from_secs(300),
            event_queue_capacity: 1024,
            event_stream_capacity: 256,
            event_workers: 4,
            event_retry: RetryPolicy::default(),
            collaborator_timeout: Duration::from_secs(5),
            seed_batch_size: 500,
            currencies: vec![Currency::KES, Currency::USD],
            account_types: vec![AccountType::Real, AccountType::Demo],
            pending_timeout: Duration::from_secs(600),
        }
    }
}

/// Exponential backoff with random jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Backoff plus up to half of it again, drawn at random.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        use rand::Rng;

        let base = self.backoff(attempt);
        let jitter_ms = (base.as_millis() / 2) as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }
}
