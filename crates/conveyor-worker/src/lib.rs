//! Typed job dispatch and the worker loop for Conveyor.
//!
//! This crate provides:
//! - [`JobHandler`] — the typed per-job-type handler trait
//! - [`HandlerRegistry`] — maps job types to handlers and validates
//!   payloads in both directions at the dispatch boundary
//! - [`WorkerRunner`] — the poll → claim → dispatch → complete loop with
//!   idle shutdown

pub mod registry;
pub mod runner;

pub use registry::{DispatchError, DispatchOutcome, HandlerRegistry, JobHandler};
pub use runner::WorkerRunner;
