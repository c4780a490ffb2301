use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use validator::Validate;

use crate::config::{GatewayConfig, AUTH_COOKIE_NAME};
use crate::dtos::{AuthResponse, LoginRequest, MessageResponse, RefreshResponse, RegisterRequest};
use crate::error::AppError;
use crate::middleware::{CurrentUser, RawCredential};
use crate::services::NewRegistration;
use crate::utils::password::Password;
use crate::AppState;

/// Client address as reported by the reverse proxy, for audit logging only.
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
                .map(|value| value.to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

fn auth_cookie(config: &GatewayConfig, token: String) -> Cookie<'static> {
    let is_prod = config.is_prod();
    Cookie::build((AUTH_COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .secure(is_prod)
        .same_site(if is_prod { SameSite::Strict } else { SameSite::Lax })
        .max_age(time::Duration::seconds(config.jwt.token_expiry_seconds))
        .build()
}

fn expired_auth_cookie(config: &GatewayConfig) -> Cookie<'static> {
    let mut cookie = auth_cookie(config, String::new());
    cookie.set_max_age(time::Duration::ZERO);
    cookie
}

pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let session = state
        .auth
        .register(
            NewRegistration {
                email: payload.email,
                password: Password::new(payload.password),
                first_name: payload.first_name,
                last_name: payload.last_name,
                organization_name: payload.organization_name,
                organization_slug: payload.organization_slug,
            },
            &client_ip(&headers),
        )
        .await?;

    let jar = CookieJar::new().add(auth_cookie(&state.config, session.token.clone()));
    let body = AuthResponse {
        user: session.user.sanitized(),
        organization: session.organization.summary(),
        token: session.token,
        expires_in: state.auth.token_expiry_seconds(),
    };

    Ok((StatusCode::CREATED, jar, Json(body)))
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let session = state
        .auth
        .login(
            &payload.email,
            &Password::new(payload.password),
            &client_ip(&headers),
        )
        .await?;

    let jar = CookieJar::new().add(auth_cookie(&state.config, session.token.clone()));
    let body = AuthResponse {
        user: session.user.sanitized(),
        organization: session.organization.summary(),
        token: session.token,
        expires_in: state.auth.token_expiry_seconds(),
    };

    Ok((StatusCode::OK, jar, Json(body)))
}

pub async fn refresh(
    State(state): State<AppState>,
    CurrentUser(principal): CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let token = state.auth.refresh(&principal)?;

    let jar = CookieJar::new().add(auth_cookie(&state.config, token.clone()));
    let body = RefreshResponse {
        token,
        expires_in: state.auth.token_expiry_seconds(),
    };

    Ok((jar, Json(body)))
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    credential: Option<Extension<RawCredential>>,
) -> impl IntoResponse {
    let token = credential.map(|Extension(RawCredential(token))| token);
    state
        .auth
        .logout(token.as_deref(), &client_ip(&headers))
        .await;

    let jar = CookieJar::new().add(expired_auth_cookie(&state.config));
    (
        jar,
        Json(MessageResponse {
            message: "Logged out".to_string(),
        }),
    )
}

pub async fn me(CurrentUser(principal): CurrentUser) -> impl IntoResponse {
    Json(principal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_ip_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers), "203.0.113.9");
    }

    #[test]
    fn client_ip_falls_back_to_real_ip_then_unknown() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers), "10.0.0.1");

        assert_eq!(client_ip(&HeaderMap::new()), "unknown");
    }
}
