//! Per-endpoint token buckets.
//!
//! One bucket per limit-table row, created lazily. A dispatched path
//! resolves to its row key before admission, so every order, SKU or feed
//! id hitting the same endpoint shares one bucket, and the bucket map
//! stays bounded by the table size. Refill and decrement are serialized
//! per bucket; the critical section is O(1).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use spg_domain::config::LimitsConfig;

/// Outcome of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Admitted,
    /// Saturated; a token becomes available in `retry_after` seconds.
    Denied { retry_after: f64 },
}

struct Bucket {
    tokens: f64,
    capacity: f64,
    rate: f64,
    last_refill: Instant,
}

impl Bucket {
    fn admit(&mut self, now: Instant) -> Admission {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Admission::Admitted
        } else {
            Admission::Denied {
                retry_after: (1.0 - self.tokens) / self.rate,
            }
        }
    }
}

/// The bucket array.
pub struct RateLimiter {
    limits: LimitsConfig,
    buckets: Mutex<HashMap<String, Arc<Mutex<Bucket>>>>,
}

impl RateLimiter {
    pub fn new(limits: LimitsConfig) -> Self {
        Self {
            limits,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Try to take one token for the endpoint path.
    pub fn admit(&self, path: &str) -> Admission {
        self.admit_at(path, Instant::now())
    }

    /// Admission against an explicit clock reading.
    pub fn admit_at(&self, path: &str, now: Instant) -> Admission {
        let bucket = self.bucket_for(path);
        let mut bucket = bucket.lock();
        bucket.admit(now)
    }

    /// Take a token, cooperatively sleeping through refills.
    pub async fn acquire(&self, path: &str) {
        loop {
            match self.admit(path) {
                Admission::Admitted => return,
                Admission::Denied { retry_after } => {
                    tokio::time::sleep(Duration::from_secs_f64(retry_after.max(0.01))).await;
                }
            }
        }
    }

    fn bucket_for(&self, path: &str) -> Arc<Mutex<Bucket>> {
        let (key, limit) = self.limits.resolve(path);
        let mut buckets = self.buckets.lock();
        if let Some(bucket) = buckets.get(&key) {
            return bucket.clone();
        }
        let bucket = Arc::new(Mutex::new(Bucket {
            tokens: limit.burst as f64,
            capacity: limit.burst as f64,
            rate: limit.rate,
            last_refill: Instant::now(),
        }));
        buckets.insert(key, bucket.clone());
        bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(LimitsConfig::default())
    }

    #[test]
    fn burst_capacity_then_denial() {
        let limiter = limiter();
        let now = Instant::now();

        // The orders bucket bursts to 20 and refills at 0.0167/s.
        let mut admitted = 0;
        let mut denied = 0;
        for _ in 0..31 {
            match limiter.admit_at("/orders/v0/orders", now) {
                Admission::Admitted => admitted += 1,
                Admission::Denied { retry_after } => {
                    assert!(retry_after >= 0.0);
                    denied += 1;
                }
            }
        }
        assert_eq!(admitted, 20);
        assert_eq!(denied, 11);
    }

    #[test]
    fn tokens_refill_with_elapsed_time() {
        let limiter = limiter();
        let start = Instant::now();

        // Drain the default bucket (burst 10).
        for _ in 0..10 {
            assert_eq!(
                limiter.admit_at("/sellers/v1/marketplaceParticipations", start),
                Admission::Admitted
            );
        }
        assert!(matches!(
            limiter.admit_at("/sellers/v1/marketplaceParticipations", start),
            Admission::Denied { .. }
        ));

        // 1 second at 5/s restores five tokens.
        let later = start + Duration::from_secs(1);
        for _ in 0..5 {
            assert_eq!(
                limiter.admit_at("/sellers/v1/marketplaceParticipations", later),
                Admission::Admitted
            );
        }
        assert!(matches!(
            limiter.admit_at("/sellers/v1/marketplaceParticipations", later),
            Admission::Denied { .. }
        ));
    }

    #[test]
    fn tokens_never_exceed_capacity() {
        let limiter = limiter();
        let start = Instant::now();

        // A long idle period must not accumulate beyond the burst size.
        let much_later = start + Duration::from_secs(3600);
        let mut admitted = 0;
        loop {
            match limiter.admit_at("/fba/inventory/v1/summaries", much_later) {
                Admission::Admitted => admitted += 1,
                Admission::Denied { .. } => break,
            }
            assert!(admitted <= 10, "exceeded burst capacity");
        }
        assert_eq!(admitted, 10);
    }

    #[test]
    fn retry_after_reflects_refill_rate() {
        let limiter = limiter();
        let now = Instant::now();

        for _ in 0..20 {
            limiter.admit_at("/orders/v0/orders", now);
        }
        match limiter.admit_at("/orders/v0/orders", now) {
            Admission::Denied { retry_after } => {
                // Empty bucket at 0.0167/s: one token in ≈ 60s.
                assert!(retry_after > 59.0 && retry_after < 61.0, "{retry_after}");
            }
            Admission::Admitted => panic!("bucket should be empty"),
        }
    }

    #[test]
    fn buckets_are_per_endpoint() {
        let limiter = limiter();
        let now = Instant::now();

        for _ in 0..20 {
            limiter.admit_at("/orders/v0/orders", now);
        }
        // The orders bucket is drained, the pricing bucket is not.
        assert!(matches!(
            limiter.admit_at("/orders/v0/orders", now),
            Admission::Denied { .. }
        ));
        assert_eq!(
            limiter.admit_at("/products/pricing/v0/price", now),
            Admission::Admitted
        );
    }

    #[test]
    fn different_resource_ids_share_one_bucket() {
        let limiter = limiter();
        let now = Instant::now();

        // The orderItems row bursts to 30; alternating order ids must
        // drain the same bucket, not mint a fresh one per order.
        let mut admitted = 0;
        let mut denied = 0;
        for i in 0..31 {
            let path = if i % 2 == 0 {
                "/orders/v0/orders/123-1234567-1234567/orderItems"
            } else {
                "/orders/v0/orders/999-0000001-0000001/orderItems"
            };
            match limiter.admit_at(path, now) {
                Admission::Admitted => admitted += 1,
                Admission::Denied { .. } => denied += 1,
            }
        }
        assert_eq!(admitted, 30);
        assert_eq!(denied, 1);

        // Same story for listings across sellers and SKUs (burst 10).
        for i in 0..10 {
            let path = format!("/listings/2021-08-01/items/SELLER{}/SKU-{i}", i % 3);
            assert_eq!(limiter.admit_at(&path, now), Admission::Admitted);
        }
        assert!(matches!(
            limiter.admit_at("/listings/2021-08-01/items/SELLER9/SKU-NEW", now),
            Admission::Denied { .. }
        ));
    }

    #[test]
    fn single_order_paths_drain_the_orders_bucket() {
        let limiter = limiter();
        let now = Instant::now();

        for i in 0..20 {
            let path = format!("/orders/v0/orders/123-1234567-{i:07}");
            assert_eq!(limiter.admit_at(&path, now), Admission::Admitted);
        }
        assert!(matches!(
            limiter.admit_at("/orders/v0/orders/555-5555555-5555555", now),
            Admission::Denied { .. }
        ));
        // The orderItems bucket is separate and still full.
        assert_eq!(
            limiter.admit_at("/orders/v0/orders/555-5555555-5555555/orderItems", now),
            Admission::Admitted
        );
    }

    #[test]
    fn unmatched_paths_share_the_default_bucket_and_stay_bounded() {
        let limiter = limiter();
        let now = Instant::now();

        // Ten distinct unknown paths exhaust the single default bucket.
        for i in 0..10 {
            let path = format!("/sellers/v1/thing-{i}");
            assert_eq!(limiter.admit_at(&path, now), Admission::Admitted);
        }
        assert!(matches!(
            limiter.admit_at("/sellers/v1/thing-next", now),
            Admission::Denied { .. }
        ));

        // Only one bucket was minted for all of them.
        assert_eq!(limiter.buckets.lock().len(), 1);
    }

    #[test]
    fn fractional_admission_rate_is_bounded_long_run() {
        // Property over a synthetic schedule: with arbitrary gaps, total
        // admissions never exceed burst + elapsed * rate.
        let limiter = limiter();
        let start = Instant::now();
        let gaps_ms: &[u64] = &[0, 10, 250, 0, 0, 900, 50, 1200, 0, 300, 5, 5000];

        let mut now = start;
        let mut admitted = 0u32;
        for gap in gaps_ms.iter().cycle().take(200) {
            now += Duration::from_millis(*gap);
            if limiter.admit_at("/listings/2021-08-01/items", now) == Admission::Admitted {
                admitted += 1;
            }
        }
        let elapsed = (now - start).as_secs_f64();
        let bound = 10.0 + elapsed * 5.0;
        assert!(
            (admitted as f64) <= bound + 1.0,
            "admitted {admitted} exceeds bound {bound}"
        );
    }
}
