//! # conveyor-core
//!
//! Core crate for the Conveyor worker agent. Contains the unified error
//! system, environment configuration, shared domain types, and the job
//! queue trait seam.
//!
//! This crate has **no** internal dependencies on other Conveyor crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
