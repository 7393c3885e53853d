//! Middleware for the API.

pub mod rate_limit;

pub use rate_limit::{RateLimiter, client_key, rate_limit};
