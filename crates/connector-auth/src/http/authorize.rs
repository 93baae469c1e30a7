//! OAuth 2.0 authorization endpoint handlers.
//!
//! # Flow
//!
//! ```text
//! GET /authorize?response_type=code&client_id=...&redirect_uri=...
//!     ├─► Invalid parameters, client or redirect_uri → JSON error (no redirect)
//!     ├─► Failure after redirect_uri is trusted → 302 to redirect_uri with error
//!     └─► Valid → 302 to the login surface with auth_code
//!
//! POST /authorize (JSON, called by the login surface)
//!     ├─► bad or missing bearer secret (when configured) → 401 invalid_client
//!     ├─► approved=false → {redirect_uri} carrying error=access_denied
//!     └─► approved=true  → {redirect_uri} carrying code and state
//! ```

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use super::{AuthorizeState, error_response};
use crate::oauth::authorize::{AuthorizationRequest, AuthorizeRejection, CompletionRequest};

/// GET /authorize handler.
///
/// Parameter names follow RFC 6749 Section 4.1.1 and RFC 7636.
pub async fn authorize_get(
    State(state): State<AuthorizeState>,
    Query(params): Query<AuthorizationRequest>,
) -> Response {
    match state.authorization_service.authorize(&params).await {
        Ok(login_url) => found(&login_url),
        Err(AuthorizeRejection::Direct(err)) => {
            debug!(
                client_id = ?params.client_id,
                error = %err,
                "Authorization request rejected"
            );
            error_response(&err)
        }
        Err(AuthorizeRejection::Redirect(error, redirect_uri)) => {
            warn!(
                client_id = ?params.client_id,
                error = %error.error,
                "Authorization request failed after redirect verification"
            );
            match error.to_redirect_url(&redirect_uri) {
                Ok(url) => found(&url),
                Err(e) => {
                    warn!(error = %e, "Registered redirect_uri is not a valid URL");
                    (
                        StatusCode::BAD_REQUEST,
                        Json(serde_json::json!({
                            "error": error.error.as_str(),
                            "error_description": error.error_description,
                        })),
                    )
                        .into_response()
                }
            }
        }
    }
}

/// POST /authorize handler.
///
/// Internal callback from the login surface. Answers with the final redirect
/// for the login surface to perform. When `auth.callback_secret` is set the
/// caller must send it as `Authorization: Bearer <secret>`.
pub async fn authorize_complete(
    State(state): State<AuthorizeState>,
    headers: HeaderMap,
    Json(request): Json<CompletionRequest>,
) -> Response {
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().strip_prefix("Bearer "))
        .map(str::trim);
    if let Err(err) = state
        .authorization_service
        .verify_callback_secret(presented)
    {
        warn!("Authorization completion callback failed authentication");
        return error_response(&err);
    }

    match state.authorization_service.complete(&request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(err) => {
            debug!(error = %err, "Authorization completion rejected");
            error_response(&err)
        }
    }
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}
