use governor::{
    Quota, RateLimiter as GovernorRateLimiter,
    clock::{QuantaClock, QuantaInstant},
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
};
use nonzero_ext::nonzero;
use std::{num::NonZeroU32, time::Duration};

// The portal starts answering with its outage page well before it drops
// connections, so stay far below what it can take.
const REQ_PER_SEC: NonZeroU32 = nonzero!(10u32);
const MS_BETWEEN_REQ: Duration = Duration::from_millis(50);

type SpecificGovernorRateLimiter =
    GovernorRateLimiter<NotKeyed, InMemoryState, QuantaClock, NoOpMiddleware<QuantaInstant>>;

pub struct RateLimiter {
    req_per_sec: SpecificGovernorRateLimiter,
    ms_between_req: SpecificGovernorRateLimiter,
}

impl RateLimiter {
    pub fn new() -> Self {
        let req_per_sec = GovernorRateLimiter::direct(Quota::per_second(REQ_PER_SEC));

        // No two requests closer than MS_BETWEEN_REQ.
        let spacing = Quota::with_period(MS_BETWEEN_REQ).unwrap_or(Quota::per_second(REQ_PER_SEC));
        let ms_between_req = GovernorRateLimiter::direct(spacing);

        RateLimiter {
            req_per_sec,
            ms_between_req,
        }
    }

    pub async fn wait_until_ready(&self) {
        // The per-second budget goes first so that callers queued behind the
        // spacing limiter cannot all cross the budget at once.
        self.req_per_sec.until_ready().await;
        self.ms_between_req.until_ready().await;
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
