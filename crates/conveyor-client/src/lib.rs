//! Authenticated HTTP operations against the Conveyor job queue API.
//!
//! [`JobClient`] translates worker intents (poll, claim, complete) into
//! authenticated HTTP calls, consulting the auth session for a bearer
//! token on every request. The execution-environment metadata lookup
//! lives here too, since it is the other HTTP collaborator.

pub mod client;
pub mod metadata;

pub use client::JobClient;
