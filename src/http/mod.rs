//! # Rate-Limited Provider HTTP
//!
//! One [`RateLimitedClient`] per provider. Each client exclusively owns its
//! [`IntervalGuard`], so request spacing is enforced by single ownership
//! (`&mut self` on every request) rather than by locking.
//!
//! ## What It Does
//!
//! 1. **Spacing**: waits out the provider's minimum interval, measured from the
//!    end of the previous request, before every attempt.
//! 2. **Retry**: 429 honours `Retry-After`; timeouts and transport errors back
//!    off for a fixed delay; 401/403 surface immediately.
//! 3. **Pagination**: cursor-based and page-number-based traversals that only
//!    return once every page is collected.

pub mod client;
pub mod paginate;
pub mod rate_limit;

pub use client::{ApiResponse, Auth, ClientConfig, RateLimitedClient};
pub use paginate::{CursorPage, PageMeta};
pub use rate_limit::IntervalGuard;
