//! Double-submit CSRF protection.
//!
//! `csrf_issue` keeps a script-readable token cookie alive on every response
//! and mirrors it into the `X-CSRF-Token` header; `csrf_guard` requires
//! mutating requests to echo the cookie back in the `x-csrf-token` request
//! header and compares the two in constant time.

use axum::{
    extract::{Request, State},
    http::{HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::config::{CSRF_COOKIE_NAME, CSRF_HEADER_NAME};
use crate::middleware::auth::ErrorResponse;
use crate::AppState;

/// Mint a fresh CSRF token: 32 random bytes, hex encoded.
pub fn generate_csrf_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Constant-time equality that tolerates unequal lengths. A length mismatch
/// still burns a comparison so the reject path does length-independent work.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        let _ = a.ct_eq(a);
        return false;
    }
    a.ct_eq(b).into()
}

fn is_safe_method(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

fn rejection() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorResponse {
            error: "CSRF validation failed".to_string(),
        }),
    )
}

/// Reject mutating requests whose `x-csrf-token` header does not match the
/// CSRF cookie. The reject body never says which check failed.
pub async fn csrf_guard(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    if is_safe_method(req.method()) {
        return Ok(next.run(req).await);
    }

    let path = req.uri().path();
    if state
        .config
        .security
        .csrf_exempt_suffixes
        .iter()
        .any(|suffix| path.ends_with(suffix.as_str()))
    {
        return Ok(next.run(req).await);
    }

    let jar = CookieJar::from_headers(req.headers());
    let cookie_token = match jar.get(CSRF_COOKIE_NAME).map(|c| c.value()) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => {
            tracing::debug!(path = %path, "CSRF cookie missing");
            return Err(rejection());
        }
    };

    let header_token = req
        .headers()
        .get(CSRF_HEADER_NAME)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if !constant_time_eq(cookie_token.as_bytes(), header_token.as_bytes()) {
        tracing::debug!(path = %path, "CSRF token mismatch");
        return Err(rejection());
    }

    Ok(next.run(req).await)
}

/// Ensure every response carries a CSRF cookie, minting one when the request
/// arrived without it, and mirror the value into a response header so
/// non-browser clients can pick it up.
pub async fn csrf_issue(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let jar = CookieJar::from_headers(req.headers());
    let token = match jar.get(CSRF_COOKIE_NAME).map(|c| c.value()) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => generate_csrf_token(),
    };

    let is_prod = state.config.is_prod();
    let cookie = Cookie::build((CSRF_COOKIE_NAME, token.clone()))
        .path("/")
        .http_only(false)
        .secure(is_prod)
        .same_site(if is_prod { SameSite::Strict } else { SameSite::Lax })
        .max_age(time::Duration::seconds(state.config.jwt.token_expiry_seconds))
        .build();

    let mut response = next.run(req).await;

    if let Ok(header_value) = HeaderValue::from_str(&token) {
        response
            .headers_mut()
            .insert("X-CSRF-Token", header_value);
    }
    (CookieJar::new().add(cookie), response).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_64_hex_chars() {
        let token = generate_csrf_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tokens_are_unique() {
        assert_ne!(generate_csrf_token(), generate_csrf_token());
    }

    #[test]
    fn equal_tokens_compare_equal() {
        let token = generate_csrf_token();
        assert!(constant_time_eq(token.as_bytes(), token.as_bytes()));
    }

    #[test]
    fn different_tokens_compare_unequal() {
        assert!(!constant_time_eq(
            generate_csrf_token().as_bytes(),
            generate_csrf_token().as_bytes()
        ));
    }

    #[test]
    fn unequal_lengths_reject_without_panicking() {
        assert!(!constant_time_eq(b"short", b"a much longer token value"));
        assert!(!constant_time_eq(b"", b"x"));
    }
}
