//! Token bucket shared by every worker.
//!
//! Gates calls to the rate-limited source (listing and downloads). Waiting
//! is fair in the long run but not strictly first come, first served.

use crate::error::{ErrorKind, Result};
use governor::{DefaultDirectRateLimiter, Quota};
use std::num::NonZeroU32;
use std::time::Duration;

pub struct RateLimiter {
    inner: DefaultDirectRateLimiter,
    burst: NonZeroU32,
}

impl RateLimiter {
    /// A bucket holding up to `burst` tokens, refilled at
    /// `requests_per_second`.
    pub fn new(requests_per_second: f64, burst: u32) -> Result<Self> {
        if !(requests_per_second.is_finite() && requests_per_second > 0.0) {
            exn::bail!(ErrorKind::RateLimit(format!("{requests_per_second} requests per second")));
        }
        let burst =
            NonZeroU32::new(burst).ok_or_else(|| exn::Exn::from(ErrorKind::RateLimit("burst of zero".to_string())))?;
        let period = Duration::from_secs_f64(1.0 / requests_per_second);
        let quota = Quota::with_period(period)
            .ok_or_else(|| exn::Exn::from(ErrorKind::RateLimit(format!("{requests_per_second} requests per second"))))?
            .allow_burst(burst);
        Ok(Self { inner: governor::RateLimiter::direct(quota), burst })
    }

    /// Wait for one token.
    pub async fn acquire(&self) {
        self.inner.until_ready().await;
    }

    /// Wait until `n` tokens are available at once.
    ///
    /// # Errors
    ///
    /// When `n` exceeds the burst size, as it could never be satisfied.
    pub async fn acquire_n(&self, n: u32) -> Result<()> {
        let Some(n) = NonZeroU32::new(n) else {
            return Ok(());
        };
        self.inner
            .until_n_ready(n)
            .await
            .map_err(|_| ErrorKind::RateLimit(format!("{n} tokens requested, burst is {}", self.burst)))?;
        Ok(())
    }

    pub fn burst(&self) -> u32 {
        self.burst.get()
    }
}
