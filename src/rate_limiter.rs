// SPDX-License-Identifier: LGPL-3.0-or-later

use std::fmt::{self, Debug, Formatter};
use std::time::{Duration, Instant};

/// Token-bucket rate limiter used to gate Overwatch's chat-warning and
/// vote-kick cadence (spec.md §4.10, §8 property 9: at most one warning per
/// 30s window per player).
pub struct RateLimiter {
    props: RateLimiterProps,
    state: RateLimiterState,
}

/// Widest integer type that doesn't inflate [`RateLimiterState`] on a 64-bit
/// system, and is natively accepted by [`Duration::saturating_mul`].
pub type Units = u32;

pub struct RateLimiterState {
    until: Instant,
    burst_used: Units,
}

impl Debug for RateLimiterState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiterState")
            .field(
                "until",
                &self.until.saturating_duration_since(Instant::now()).as_secs_f32(),
            )
            .field("burst_used", &self.burst_used)
            .finish()
    }
}

#[derive(Debug)]
pub struct RateLimiterProps {
    rate_limit: Duration,
    burst: Units,
}

impl RateLimiterState {
    pub fn should_limit_rate(&mut self, props: &RateLimiterProps) -> bool {
        self.should_limit_rate_with_now(props, Instant::now())
    }

    pub fn should_limit_rate_with_now(&mut self, props: &RateLimiterProps, now: Instant) -> bool {
        if props.rate_limit == Duration::ZERO {
            return false;
        }
        let ok = if now > self.until {
            self.burst_used = 0;
            true
        } else if self.burst_used < props.burst {
            self.burst_used += 1;
            true
        } else {
            false
        };
        if ok {
            if let Some(instant) = self.until.checked_add(props.rate_limit) {
                self.until = instant.max(now);
            }
        }
        !ok
    }
}

impl Default for RateLimiterState {
    fn default() -> Self {
        Self {
            until: Instant::now(),
            burst_used: 0,
        }
    }
}

impl RateLimiterProps {
    /// `rate_limit` should be more than zero; use [`RateLimiterProps::no_limit`]
    /// to explicitly opt out.
    pub fn new(rate_limit: Duration, burst: Units) -> Self {
        debug_assert!(rate_limit != Duration::ZERO);
        Self { rate_limit, burst }
    }

    pub fn no_limit() -> Self {
        Self {
            rate_limit: Duration::ZERO,
            burst: 0,
        }
    }
}

impl RateLimiter {
    pub fn new(rate_limit: Duration, burst: Units) -> Self {
        Self::from(RateLimiterProps::new(rate_limit, burst))
    }

    /// Constructs a limiter that allows exactly one action per `rate_limit`,
    /// with no burst allowance. Used for the per-player chat-warning cooldown
    /// and the server-wide vote-kick cooldown, both of which are "one per
    /// window" rather than bursty.
    pub fn once_per(rate_limit: Duration) -> Self {
        Self::new(rate_limit, 0)
    }

    pub fn should_limit_rate(&mut self) -> bool {
        self.state.should_limit_rate(&self.props)
    }

    pub fn should_limit_rate_with_now(&mut self, now: Instant) -> bool {
        self.state.should_limit_rate_with_now(&self.props, now)
    }
}

impl From<RateLimiterProps> for RateLimiter {
    fn from(props: RateLimiterProps) -> Self {
        Self {
            props,
            state: RateLimiterState::default(),
        }
    }
}
