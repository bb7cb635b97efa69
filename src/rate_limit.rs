use std::fmt;
use std::num::NonZeroU32;
use std::thread;

use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota};

/// Requests per second for ordinary routes.
pub const GENERAL_RPS: NonZeroU32 = match NonZeroU32::new(10) {
    Some(n) => n,
    None => unreachable!(),
};
/// Requests per second for `/telephony/` routes.
pub const TELEPHONY_RPS: NonZeroU32 = match NonZeroU32::new(40) {
    Some(n) => n,
    None => unreachable!(),
};

/// Route classes that get their own request budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    General,
    Telephony,
}

impl RouteClass {
    /// Pick the class for a route path relative to the API version prefix.
    pub fn for_path(path: &str) -> Self {
        if path.starts_with("/telephony/") {
            RouteClass::Telephony
        } else {
            RouteClass::General
        }
    }
}

/// Blocking token-bucket pacing, one bucket per [`RouteClass`].
pub struct RateLimiter {
    general: DefaultDirectRateLimiter,
    telephony: DefaultDirectRateLimiter,
    clock: DefaultClock,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_quotas(GENERAL_RPS, TELEPHONY_RPS)
    }

    pub fn with_quotas(general_rps: NonZeroU32, telephony_rps: NonZeroU32) -> Self {
        Self {
            general: governor::RateLimiter::direct(Quota::per_second(general_rps)),
            telephony: governor::RateLimiter::direct(Quota::per_second(telephony_rps)),
            clock: DefaultClock::default(),
        }
    }

    fn bucket(&self, class: RouteClass) -> &DefaultDirectRateLimiter {
        match class {
            RouteClass::General => &self.general,
            RouteClass::Telephony => &self.telephony,
        }
    }

    /// Block until the bucket for `class` admits one request.
    pub fn acquire(&self, class: RouteClass) {
        let bucket = self.bucket(class);
        while let Err(not_until) = bucket.check() {
            let wait = not_until.wait_time_from(self.clock.now());
            tracing::trace!(?class, wait_ms = wait.as_millis() as u64, "rate limited");
            thread::sleep(wait);
        }
    }

    /// Non-blocking variant of [`RateLimiter::acquire`].
    pub fn try_acquire(&self, class: RouteClass) -> bool {
        self.bucket(class).check().is_ok()
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
