/// Sliding-window rate limiting backed by the record store
///
/// One window row per identity key. The first attempt opens a window; each
/// further attempt inside the window increments the counter until the
/// threshold is reached, after which checks fail with the time the window
/// ages out. Expired windows reset on the next attempt and are also removed
/// by the cleanup sweep, which is safe to run on a schedule.
use crate::error::{AuthError, AuthResult};
use crate::store::{RateLimitStore, RateLimitWindow};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

pub struct SlidingWindowLimiter {
    store: Arc<dyn RateLimitStore>,
    window: Duration,
    max_attempts: u32,
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, window_secs: i64, max_attempts: u32) -> Self {
        Self {
            store,
            window: Duration::seconds(window_secs),
            max_attempts,
        }
    }

    /// Count one attempt for `identity_key`
    ///
    /// Fails with `RateLimitExceeded` once the window already holds
    /// `max_attempts`; the attempt is not recorded in that case.
    pub async fn check(&self, identity_key: &str, now: DateTime<Utc>) -> AuthResult<()> {
        let window = match self.store.find(identity_key).await? {
            Some(current) if now - current.window_start < self.window => {
                if current.attempt_count >= self.max_attempts {
                    let retry_after = current.window_start + self.window;
                    tracing::warn!(
                        identity = identity_key,
                        attempts = current.attempt_count,
                        "rate limit exceeded"
                    );
                    return Err(AuthError::RateLimitExceeded {
                        attempts: current.attempt_count,
                        retry_after,
                    });
                }
                RateLimitWindow {
                    attempt_count: current.attempt_count + 1,
                    ..current
                }
            }
            // No window yet, or the old one has aged out
            _ => RateLimitWindow {
                identity_key: identity_key.to_string(),
                window_start: now,
                attempt_count: 1,
            },
        };

        self.store.put(&window).await?;
        Ok(())
    }

    /// Remove windows that have aged out; returns the count removed
    pub async fn cleanup(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let removed = self.store.delete_started_before(now - self.window).await?;
        if removed > 0 {
            tracing::info!(removed, "cleaned up expired rate-limit windows");
        }
        Ok(removed)
    }
}
