//! Shared errors and configuration for the Kan backend.
//!
//! This crate provides common types used across all other crates:
//! - Application-wide error types with their HTTP mapping
//! - Configuration management

pub mod config;
pub mod error;

pub use config::{AppConfig, RateLimitConfig, UploadConfig};
pub use error::AppError;
