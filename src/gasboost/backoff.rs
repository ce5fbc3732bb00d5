//! Jittered exponential delay between broadcast retries.

use rand::Rng;
use std::time::Duration;

pub const RETRY_BASE: Duration = Duration::from_secs(1);
pub const RETRY_MAX: Duration = Duration::from_secs(30);

/// Delay before retry number `attempt` (1-based). Adds up to 10% jitter.
pub fn retry_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 2u32.saturating_pow(attempt - 1);
    let delay = base.saturating_mul(factor).min(max);

    let jitter_ms = delay.as_millis() as u64 / 10;
    let jitter = if jitter_ms > 0 {
        rand::thread_rng().gen_range(0..jitter_ms)
    } else {
        0
    };

    delay + Duration::from_millis(jitter)
}
