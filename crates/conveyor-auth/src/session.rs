//! Authenticated session state machine.
//!
//! [`AuthSession`] owns the credentials and the current token pair and is
//! the only component that mutates them. Callers ask for a valid token and
//! never reason about expiry themselves: the session logs in on first use,
//! proactively refreshes when the token is close to expiring, and degrades
//! any refresh anomaly to a full re-login.

use std::sync::Arc;

use tokio::sync::Mutex;

use conveyor_core::AppResult;

use crate::token::{self, TokenPair};
use crate::transport::{AuthTransport, Credentials};

/// Refresh the access token when it expires within this many seconds.
const DEFAULT_REFRESH_THRESHOLD_SECONDS: i64 = 60;

/// Owns credentials and the current token pair for one worker process.
///
/// The pair is replaced wholesale on every transition; a single writer
/// (this session) performs all mutation under one lock.
pub struct AuthSession {
    credentials: Credentials,
    transport: Arc<dyn AuthTransport>,
    tokens: Mutex<Option<TokenPair>>,
    refresh_threshold_seconds: i64,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("email", &self.credentials.email)
            .field("refresh_threshold_seconds", &self.refresh_threshold_seconds)
            .finish()
    }
}

impl AuthSession {
    /// Create an unauthenticated session; no network call is made until
    /// the first token request.
    pub fn new(transport: Arc<dyn AuthTransport>, credentials: Credentials) -> Self {
        Self {
            credentials,
            transport,
            tokens: Mutex::new(None),
            refresh_threshold_seconds: DEFAULT_REFRESH_THRESHOLD_SECONDS,
        }
    }

    /// Override the refresh threshold (seconds before expiry).
    pub fn with_refresh_threshold(mut self, seconds: i64) -> Self {
        self.refresh_threshold_seconds = seconds;
        self
    }

    /// Return a currently-valid access token, logging in or refreshing as
    /// needed.
    ///
    /// Only a login failure propagates; refresh anomalies always degrade
    /// to a fresh login attempt first.
    pub async fn valid_token(&self) -> AppResult<String> {
        let mut guard = self.tokens.lock().await;

        let current = guard.clone();
        match current {
            None => self.login_locked(&mut guard).await,
            Some(pair) => {
                let remaining =
                    token::seconds_until_expiry(&pair.access_token).unwrap_or_else(|e| {
                        tracing::debug!("Could not decode token expiry, forcing refresh: {}", e);
                        0
                    });

                if remaining <= self.refresh_threshold_seconds {
                    tracing::debug!("Access token expires in {}s, refreshing", remaining);
                    self.refresh_locked(&mut guard).await
                } else {
                    Ok(pair.access_token)
                }
            }
        }
    }

    /// Log in and store the new pair; returns the fresh access token.
    async fn login_locked(&self, guard: &mut Option<TokenPair>) -> AppResult<String> {
        tracing::debug!("Logging in as '{}'", self.credentials.email);
        let pair = self.transport.login(&self.credentials).await?;
        let access = pair.access_token.clone();
        *guard = Some(pair);
        Ok(access)
    }

    /// Refresh the access token, falling back to a full login on any
    /// anomaly (no refresh token held, network failure, rejected token).
    async fn refresh_locked(&self, guard: &mut Option<TokenPair>) -> AppResult<String> {
        let refresh_token = guard.as_ref().and_then(|p| p.refresh_token.clone());

        let Some(refresh_token) = refresh_token else {
            tracing::debug!("No refresh token held, performing full login");
            return self.login_locked(guard).await;
        };

        match self.transport.refresh(&refresh_token).await {
            Ok(access) => {
                let access_token = access.clone();
                // The refresh endpoint only rotates the access token.
                *guard = Some(TokenPair {
                    access_token: access,
                    refresh_token: Some(refresh_token),
                });
                Ok(access_token)
            }
            Err(e) => {
                tracing::warn!("Token refresh failed, falling back to login: {}", e);
                *guard = None;
                self.login_locked(guard).await
            }
        }
    }
}
