//! Core logic for the Kan backend.
//!
//! This crate contains the storage facade and health evaluation with ZERO web
//! or database dependencies.
//!
//! # Modules
//!
//! - `storage` - Driver selection, key validation and the upload/download/delete facade
//! - `health` - Subsystem checks and overall status evaluation

pub mod health;
pub mod storage;
