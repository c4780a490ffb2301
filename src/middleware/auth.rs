use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::IntoResponse,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;

use crate::config::AUTH_COOKIE_NAME;
use crate::models::Principal;
use crate::services::validator::ValidateError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Pull the credential off the request: the HttpOnly cookie wins, the
/// Authorization bearer header is the fallback.
pub fn extract_credential(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(AUTH_COOKIE_NAME) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

/// Middleware guarding protected routes. Every refusal reason collapses into
/// one 401 body; the specific reason only reaches the logs.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let token = extract_credential(req.headers());

    let principal = match state.validator.validate(token.as_deref()).await {
        Ok(principal) => principal,
        Err(ValidateError::Rejected(rejection)) => {
            tracing::debug!(reason = rejection.reason(), "Request not authenticated");
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Not authenticated".to_string(),
                }),
            ));
        }
        Err(ValidateError::Unavailable(e)) => {
            tracing::error!(error = %e, "Token validation unavailable");
            return Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "Service temporarily unavailable".to_string(),
                }),
            ));
        }
    };

    // Keep the raw token around for logout.
    if let Some(token) = token {
        req.extensions_mut().insert(RawCredential(token));
    }
    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

/// The credential string as presented, available behind `require_auth`.
#[derive(Clone)]
pub struct RawCredential(pub String);

/// Extractor for the validated principal in handlers.
pub struct CurrentUser(pub Principal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = parts.extensions.get::<Principal>().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Principal missing from request extensions".to_string(),
            }),
        ))?;

        Ok(CurrentUser(principal.clone()))
    }
}
