//! Rate limiting for remote store traffic.

mod limiter;

pub use limiter::RateLimiter;
