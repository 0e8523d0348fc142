use std::time::Duration;

/// Seconds a page stays cached when the response carries no usable `Cache-Control`.
pub const DEFAULT_TTL_SECS: u64 = 86_400;
/// BM25 term-frequency saturation.
pub const K1: f64 = 1.6;

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub max_workers: usize,
    pub max_retries: u32,
    /// First retry waits this long; every further retry doubles it.
    pub retry_backoff: Duration,
    pub default_ttl_secs: u64,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_workers: 16,
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            default_ttl_secs: DEFAULT_TTL_SECS,
            request_timeout: Duration::from_secs(12),
            user_agent: "search-engine-rs-bot/0.1 (+https://example.com/bot)".to_string(),
        }
    }
}

impl CrawlConfig {
    /// Delay before the given attempt; attempt 0 is the first try.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.retry_backoff.saturating_mul(1u32 << (attempt - 1).min(16))
    }
}

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub period: Duration,
    pub max_workers: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self { period: Duration::from_secs(3_600), max_workers: 16 }
    }
}

#[derive(Debug, Clone)]
pub struct RankingConfig {
    pub k1: f64,
    pub recommendation_top_n: usize,
    /// Score given to recommended documents that BM25 did not already rank.
    pub recommendation_score: f64,
    pub result_ttl_secs: u64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self { k1: K1, recommendation_top_n: 5, recommendation_score: 1.0, result_ttl_secs: 300 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        let cfg = CrawlConfig { retry_backoff: Duration::from_millis(100), ..Default::default() };
        assert_eq!(cfg.backoff_for(0), Duration::ZERO);
        assert_eq!(cfg.backoff_for(1), Duration::from_millis(100));
        assert_eq!(cfg.backoff_for(3), Duration::from_millis(400));
    }
}
