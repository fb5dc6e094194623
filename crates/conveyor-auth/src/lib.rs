//! Authenticated session lifecycle for the Conveyor queue API.
//!
//! This crate provides:
//! - [`AuthSession`] — owns credentials and the current token pair, and
//!   hands out a currently-valid access token, refreshing or re-logging-in
//!   transparently
//! - [`AuthTransport`] — the login/refresh HTTP seam, with the
//!   `reqwest`-backed [`HttpAuthTransport`] implementation
//! - token expiry decoding without signature verification

pub mod session;
pub mod token;
pub mod transport;

pub use session::AuthSession;
pub use token::TokenPair;
pub use transport::{AuthTransport, Credentials, HttpAuthTransport};
