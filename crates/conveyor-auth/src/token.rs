//! Access/refresh token pair and expiry decoding.
//!
//! The access token is a JWT whose payload carries a numeric `exp` claim.
//! The worker only ever echoes the token back to its issuer, so the
//! signature is deliberately not verified — the token is decoded purely to
//! read its expiry.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;

use conveyor_core::AppError;
use conveyor_core::AppResult;

/// The current access/refresh token pair held by a session.
///
/// Replaced wholesale on every login or refresh, never edited in place.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPair {
    /// Bearer token attached to authenticated requests.
    pub access_token: String,
    /// Long-lived token used to obtain a new access token, when issued.
    pub refresh_token: Option<String>,
}

/// Minimal claims shape — only the expiry matters here.
#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    exp: i64,
}

/// Decode the `exp` claim (seconds since epoch) from an access token.
///
/// The signature is not verified and an already-expired token is not an
/// error; callers compare the returned expiry against the clock.
pub fn token_expiry(access_token: &str) -> AppResult<i64> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;

    let data = decode::<ExpiryClaims>(access_token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| {
            AppError::authentication(format!("Failed to decode access token expiry: {e}"))
        })?;

    Ok(data.claims.exp)
}

/// Seconds until the access token expires (negative when already expired).
pub fn seconds_until_expiry(access_token: &str) -> AppResult<i64> {
    Ok(token_expiry(access_token)? - Utc::now().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde::Serialize;

    #[derive(Serialize)]
    struct Claims {
        sub: String,
        exp: i64,
    }

    fn make_token(exp: i64) -> String {
        encode(
            &Header::default(),
            &Claims {
                sub: "worker".to_string(),
                exp,
            },
            &EncodingKey::from_secret(b"issuer-side-secret"),
        )
        .expect("encode token")
    }

    #[test]
    fn test_expiry_decoded_without_verification() {
        let exp = Utc::now().timestamp() + 3_600;
        // Decoder holds no key material; only the issuer knows the secret.
        assert_eq!(token_expiry(&make_token(exp)).expect("decode"), exp);
    }

    #[test]
    fn test_expired_token_still_decodes() {
        let exp = Utc::now().timestamp() - 100;
        let remaining = seconds_until_expiry(&make_token(exp)).expect("decode");
        assert!(remaining < 0);
    }

    #[test]
    fn test_garbage_token_is_an_error() {
        assert!(token_expiry("not-a-jwt").is_err());
    }

    #[test]
    fn test_fresh_token_has_positive_remaining() {
        let token = make_token(Utc::now().timestamp() + 3_600);
        let remaining = seconds_until_expiry(&token).expect("decode");
        assert!(remaining > 3_500 && remaining <= 3_600);
    }
}
