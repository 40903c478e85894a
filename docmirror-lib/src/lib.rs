//! docmirror client library
//!
//! Client-side caching and incremental synchronization for a remote
//! document store: an ephemeral TTL cache, calendar-day dataset snapshots,
//! a cached query/batch engine, a polling delta synchronizer, and an
//! offline-capable request gateway.

pub mod api;
pub mod cache;
pub mod connectivity;
pub mod delta;
pub mod error;
pub mod gateway;
pub mod model;
pub mod rate_limit;
pub mod response;
pub mod store;

mod client;

pub use client::*;
pub use response::CacheStatus;
pub use response::Response;
