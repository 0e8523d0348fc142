//! Fixed-period loop shared by the cache validator and the trainer.

use std::future::Future;
use std::time::{Duration, Instant};

/// Result of one periodic cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed,
    /// The cycle could not finish; the loop logs it and tries again next period.
    Retryable(String),
}

/// Time left in the period; zero when the cycle overran it.
pub fn next_delay(period: Duration, elapsed: Duration) -> Duration {
    period.saturating_sub(elapsed)
}

/// Run `cycle` forever, one start per `period`. `already_elapsed` is the time
/// spent by whatever ran just before the first wait (e.g. the initial crawl).
pub async fn run_periodically<F, Fut>(name: &str, period: Duration, already_elapsed: Duration, mut cycle: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CycleOutcome>,
{
    let mut elapsed = already_elapsed;
    loop {
        tokio::time::sleep(next_delay(period, elapsed)).await;
        let start = Instant::now();
        let outcome = cycle().await;
        elapsed = start.elapsed();
        match outcome {
            CycleOutcome::Completed => {
                tracing::info!(job = name, took_s = elapsed.as_secs_f64(), "cycle completed")
            }
            CycleOutcome::Retryable(reason) => {
                tracing::warn!(job = name, took_s = elapsed.as_secs_f64(), %reason, "cycle failed, retrying next period")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrun_clamps_to_zero() {
        let period = Duration::from_secs(10);
        assert_eq!(next_delay(period, Duration::from_secs(4)), Duration::from_secs(6));
        assert_eq!(next_delay(period, Duration::from_secs(25)), Duration::ZERO);
    }
}
