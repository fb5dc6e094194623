//! Login/refresh HTTP transport.
//!
//! [`AuthTransport`] is the seam between [`crate::AuthSession`] and the
//! queue API's unauthenticated auth endpoints; tests substitute an
//! in-memory implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use conveyor_core::AppError;
use conveyor_core::AppResult;

use crate::token::TokenPair;

/// Worker credentials, supplied at startup and immutable for the process
/// lifetime.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Login email.
    pub email: String,
    /// Login password.
    pub password: String,
}

/// The auth endpoints a session needs.
#[async_trait]
pub trait AuthTransport: Send + Sync {
    /// Exchange credentials for a fresh token pair.
    async fn login(&self, credentials: &Credentials) -> AppResult<TokenPair>;

    /// Exchange a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &str) -> AppResult<String>;
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    #[serde(rename = "refreshToken", default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    token: String,
}

/// `reqwest`-backed transport against the queue API's auth endpoints.
///
/// These are the only API paths called without a bearer token.
#[derive(Debug, Clone)]
pub struct HttpAuthTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAuthTransport {
    /// Create a transport against the given API base URL.
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl AuthTransport for HttpAuthTransport {
    async fn login(&self, credentials: &Credentials) -> AppResult<TokenPair> {
        let url = format!("{}/auth/login", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&LoginRequest {
                email: &credentials.email,
                password: &credentials.password,
            })
            .send()
            .await
            // Transport-level failures surface as a synthetic 500.
            .map_err(|e| AppError::authentication(format!("Login failed with status 500: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::authentication(format!(
                "Login failed with status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body: LoginResponse = response.json().await.map_err(|e| {
            AppError::authentication(format!("Login response was not valid JSON: {e}"))
        })?;

        Ok(TokenPair {
            access_token: body.token,
            refresh_token: body.refresh_token,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> AppResult<String> {
        let url = format!("{}/auth/token", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| AppError::transport(format!("Token refresh request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::authentication(format!(
                "Token refresh failed with status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body: RefreshResponse = response.json().await.map_err(|e| {
            AppError::protocol(format!("Token refresh response was not valid JSON: {e}"))
        })?;

        Ok(body.token)
    }
}
