//! Retry backoff arithmetic.

use std::time::Duration;

use rand::Rng;

/// First retry delay.
pub const BASE_DELAY_MS: u64 = 500;
/// Delay ceiling.
pub const MAX_DELAY_MS: u64 = 16_000;
/// Retries after the initial attempt.
pub const MAX_RETRIES: u32 = 3;

/// Delay before retry number `attempt` (0-based).
///
/// `base * 2^attempt` with ±25% jitter, capped at [`MAX_DELAY_MS`]. A
/// server-supplied `retry_after` (seconds) overrides the computed delay,
/// still subject to the cap.
pub fn retry_delay(attempt: u32, retry_after: Option<f64>) -> Duration {
    let millis = match retry_after {
        Some(secs) if secs >= 0.0 => (secs * 1000.0) as u64,
        _ => {
            let exp = BASE_DELAY_MS.saturating_mul(1u64 << attempt.min(10));
            let jitter = rand::thread_rng().gen_range(0.75..=1.25);
            (exp as f64 * jitter) as u64
        }
    };
    Duration::from_millis(millis.min(MAX_DELAY_MS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_and_stay_bounded() {
        for attempt in 0..6 {
            let d = retry_delay(attempt, None);
            let nominal = BASE_DELAY_MS * (1 << attempt);
            let lo = (nominal as f64 * 0.75) as u64;
            let hi = ((nominal as f64 * 1.25) as u64).min(MAX_DELAY_MS);
            assert!(
                d.as_millis() as u64 >= lo.min(MAX_DELAY_MS) && d.as_millis() as u64 <= hi,
                "attempt {attempt}: {d:?} outside [{lo}, {hi}]"
            );
        }
    }

    #[test]
    fn retry_after_overrides_and_is_capped() {
        assert_eq!(retry_delay(0, Some(2.0)), Duration::from_secs(2));
        assert_eq!(retry_delay(5, Some(120.0)), Duration::from_millis(MAX_DELAY_MS));
        // A negative header value falls back to computed backoff.
        let d = retry_delay(0, Some(-1.0));
        assert!(d >= Duration::from_millis(375));
    }
}
