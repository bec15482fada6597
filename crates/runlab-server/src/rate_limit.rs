//! Rate-limit pre-check consulted before dispatching a run.
//!
//! The real limiter lives outside this service; [`RateLimiter`] is the seam
//! it plugs into. [`AllowAll`] is the default when none is configured.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Answer of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Unix time in milliseconds at which the window resets.
    pub reset_at: u64,
    /// Seconds to wait before retrying, when refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

pub trait RateLimiter: Send + Sync {
    fn check(&self, user_id: &str) -> RateLimitDecision;
}

/// Permits every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl RateLimiter for AllowAll {
    fn check(&self, _user_id: &str) -> RateLimitDecision {
        RateLimitDecision {
            allowed: true,
            remaining: u32::MAX,
            reset_at: now_ms(),
            retry_after: None,
        }
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
