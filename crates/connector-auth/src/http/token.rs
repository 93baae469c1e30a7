//! OAuth 2.0 token endpoint handler.
//!
//! Supported grant types:
//!
//! - `authorization_code` - Exchange a claimed authorization code for tokens
//! - `refresh_token` - Rotate a refresh token and mint a new access token
//!
//! # Example
//!
//! ```ignore
//! POST /token
//! Content-Type: application/x-www-form-urlencoded
//!
//! grant_type=authorization_code
//! &code=SplxlOBeZQQYbYS6WxSbIA
//! &redirect_uri=https://app.example.com/callback
//! &code_verifier=dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk
//! &client_id=cli_1
//! ```
//!
//! The body may also be JSON, or urlencoded text sent with any other content
//! type. All three are normalized into one [`TokenRequest`] before the grant
//! logic runs.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::{debug, info, warn};

use super::TokenState;
use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::client_auth::parse_basic_auth;
use crate::oauth::token::{RawTokenParams, TokenError, TokenRequest, TokenResponse};

/// POST /token handler.
pub async fn token_handler(
    State(state): State<TokenState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = match normalize_request(&headers, &body) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Malformed token request");
            return token_error_response(&e);
        }
    };

    let grant_type = request.grant.grant_type();
    debug!(
        client_id = %request.client_id(),
        grant_type = %grant_type,
        "Processing token request"
    );

    match state.token_service.handle(&request).await {
        Ok(response) => {
            info!(
                client_id = %request.client_id(),
                grant_type = %grant_type,
                "Token issued successfully"
            );
            token_success_response(response)
        }
        Err(e) => {
            if e.is_server_error() {
                warn!(
                    client_id = %request.client_id(),
                    grant_type = %grant_type,
                    error = %e,
                    "Token request failed"
                );
            } else {
                debug!(
                    client_id = %request.client_id(),
                    grant_type = %grant_type,
                    error = %e,
                    "Token request rejected"
                );
            }
            token_error_response(&e)
        }
    }
}

/// OPTIONS /token handler (CORS preflight).
pub async fn token_preflight_handler() -> Response {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
            (
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                "Authorization, Content-Type",
            ),
            (header::ACCESS_CONTROL_MAX_AGE, "86400"),
        ],
    )
        .into_response()
}

/// Parses the body by content type and merges the Basic header credentials.
fn normalize_request(headers: &HeaderMap, body: &[u8]) -> AuthResult<TokenRequest> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim_start().starts_with("application/json"));

    let params = if is_json {
        RawTokenParams::from_json(body)?
    } else {
        RawTokenParams::from_form(body)
    };

    let basic = match headers.get(header::AUTHORIZATION) {
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| AuthError::invalid_client("Malformed Authorization header"))?;
            if value.trim_start().starts_with("Basic ") {
                Some(parse_basic_auth(value).ok_or_else(|| {
                    AuthError::invalid_client("Malformed Basic authentication header")
                })?)
            } else {
                None
            }
        }
        None => None,
    };

    TokenRequest::from_params(params, basic)
}

fn token_success_response(response: TokenResponse) -> Response {
    (
        StatusCode::OK,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(response),
    )
        .into_response()
}

fn token_error_response(error: &AuthError) -> Response {
    let token_error = TokenError::from(error);
    let status = StatusCode::from_u16(token_error.http_status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut response = (
        status,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(token_error),
    )
        .into_response();

    if status == StatusCode::UNAUTHORIZED {
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            header::HeaderValue::from_static("Basic realm=\"token\""),
        );
    }
    response
}
