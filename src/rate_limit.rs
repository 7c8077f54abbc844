/// Request rate limiting for order intake and the admin surface
use crate::{
    config::RateLimitConfig,
    context::AppContext,
    error::{RentalError, RentalResult},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiter manager
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    orders: Arc<DirectLimiter>,
    admin: Arc<DirectLimiter>,
}

fn quota(per_second: u32, fallback: NonZeroU32) -> Quota {
    let rate = NonZeroU32::new(per_second).unwrap_or(fallback);
    // Bursts up to twice the steady rate
    let burst = NonZeroU32::new(rate.get().saturating_mul(2)).unwrap_or(rate);
    Quota::per_second(rate).allow_burst(burst)
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let order_fallback = NonZeroU32::new(20).unwrap_or(NonZeroU32::MIN);
        let admin_fallback = NonZeroU32::new(100).unwrap_or(NonZeroU32::MIN);

        Self {
            enabled: config.enabled,
            orders: Arc::new(GovernorLimiter::direct(quota(
                config.order_requests_per_second,
                order_fallback,
            ))),
            admin: Arc::new(GovernorLimiter::direct(quota(
                config.admin_requests_per_second,
                admin_fallback,
            ))),
        }
    }

    fn check(&self, limiter: &DirectLimiter) -> RentalResult<()> {
        if !self.enabled {
            return Ok(());
        }
        limiter.check().map_err(|_| RentalError::RateLimitExceeded {
            retry_after: Duration::from_secs(1),
        })
    }

    /// Check rate limit for order webhooks
    pub fn check_orders(&self) -> RentalResult<()> {
        self.check(&self.orders)
    }

    /// Check rate limit for administrator calls
    pub fn check_admin(&self) -> RentalResult<()> {
        self.check(&self.admin)
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, RentalError> {
    let path = request.uri().path();

    if path.starts_with("/admin") {
        ctx.rate_limiter.check_admin()?;
    } else if path.starts_with("/orders") {
        ctx.rate_limiter.check_orders()?;
    }

    Ok(next.run(request).await)
}
