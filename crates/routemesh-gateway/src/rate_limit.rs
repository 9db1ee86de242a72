//! Per-client-address token bucket rate limiting.
//!
//! One bucket per observed client address, created lazily on first sight.
//! The address map is read-mostly: lookups take the shared lock and only a
//! miss takes the exclusive lock (checking again before inserting).

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

impl TokenBucket {
    fn full(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_refill: now,
            last_seen: now,
        }
    }

    fn refill(&mut self, now: Instant, rate_per_sec: f64, capacity: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate_per_sec).min(capacity);
        self.last_refill = now;
    }
}

/// Token bucket limiter keyed by client address.
#[derive(Debug)]
pub struct RateLimiter {
    rate_per_sec: f64,
    burst: u32,
    buckets: RwLock<HashMap<String, Arc<Mutex<TokenBucket>>>>,
}

impl RateLimiter {
    /// `rate_per_sec` tokens are added per second, up to `burst`
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        Self {
            rate_per_sec: if rate_per_sec > 0.0 { rate_per_sec } else { f64::MIN_POSITIVE },
            burst: burst.max(1),
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// `count` requests per minute with a burst of `count`
    pub fn per_minute(count: u32) -> Self {
        Self::new(f64::from(count) / 60.0, count)
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    fn bucket(&self, key: &str, now: Instant) -> Arc<Mutex<TokenBucket>> {
        if let Some(bucket) = self.buckets.read().get(key) {
            return bucket.clone();
        }

        let mut buckets = self.buckets.write();
        buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::full(f64::from(self.burst), now))))
            .clone()
    }

    /// Take one token for `key`.
    ///
    /// On denial returns how long until a token is available.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let bucket = self.bucket(key, now);
        let mut bucket = bucket.lock();

        bucket.refill(now, self.rate_per_sec, f64::from(self.burst));
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let wait = (1.0 - bucket.tokens) / self.rate_per_sec;
            Err(Duration::try_from_secs_f64(wait).unwrap_or(Duration::MAX))
        }
    }

    pub fn allow(&self, key: &str) -> bool {
        self.check(key).is_ok()
    }

    /// Drop buckets not used within `ttl`. Returns how many were dropped.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets.write();
        let before = buckets.len();
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.lock().last_seen) < ttl);
        let evicted = before - buckets.len();
        if evicted > 0 {
            debug!("[RateLimit] Evicted {} idle buckets", evicted);
        }
        evicted
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.read().len()
    }
}

/// Address used as the rate-limit key: first `X-Forwarded-For` hop,
/// then `X-Real-IP`, then the peer address.
pub fn client_addr(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(addr) = forwarded {
        return addr.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(addr) = real_ip {
        return addr.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Peer address recorded by `into_make_service_with_connect_info`
pub fn peer_addr<B>(request: &Request<B>) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}
