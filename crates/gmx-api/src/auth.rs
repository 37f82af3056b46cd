//! # Authentication Middleware
//!
//! Bearer token middleware that binds each request to a marketplace profile.
//!
//! ## Token Format
//!
//! ```text
//! Bearer {profile_uuid}:{secret}
//! ```
//!
//! The secret is compared against `AUTH_TOKEN` in constant time. When no
//! `AUTH_TOKEN` is configured (development), the secret part is optional
//! and ignored, but the profile id is still required: every operation acts
//! as some profile.
//!
//! ## Identity and Privileges
//!
//! The middleware injects a [`CallerIdentity`] holding only the profile id.
//! Privileges (`is_admin`, `is_banned`) are never taken from the token;
//! the [`CurrentActor`] extractor loads them from the profile store.
//!
//! ## Trust Model
//!
//! `AUTH_TOKEN` is one secret shared by every caller, not a per-profile
//! credential: whoever holds it can assert any profile id, admins included.
//! The service therefore expects to sit behind a trusted gateway that
//! authenticates end users and forwards their profile id with the shared
//! secret. It must not be exposed to end users directly.

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use gmx_core::{Actor, ProfileId};

use crate::error::{AppError, ErrorBody, ErrorDetail};
use crate::state::AppState;

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// The authenticated profile, injected by [`auth_middleware`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    pub profile_id: ProfileId,
}

impl<S: Send + Sync> FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .copied()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// The caller as an [`Actor`], with privileges read from their profile.
#[derive(Debug, Clone, Copy)]
pub struct CurrentActor(pub Actor);

impl FromRequestParts<AppState> for CurrentActor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let caller = CallerIdentity::from_request_parts(parts, state).await?;
        let actor = state.engine.resolve_actor(caller.profile_id).await?;
        Ok(Self(actor))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer secrets.
///
/// On a length mismatch a dummy comparison still runs, so timing does not
/// reveal the expected length.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse `{profile_uuid}:{secret}`.
///
/// With `expected_secret = None` the secret may be absent.
pub fn parse_bearer_token(
    provided: &str,
    expected_secret: Option<&str>,
) -> Result<CallerIdentity, String> {
    let (id_part, secret) = match provided.split_once(':') {
        Some((id, secret)) => (id, Some(secret)),
        None => (provided, None),
    };

    if let Some(expected) = expected_secret {
        match secret {
            Some(secret) if constant_time_token_eq(secret, expected) => {}
            Some(_) => return Err("invalid bearer token".into()),
            None => {
                return Err("invalid token format, expected {profile_id}:{secret}".into());
            }
        }
    }

    let profile_id = id_part
        .parse::<Uuid>()
        .map_err(|e| format!("invalid profile id: {e}"))?;
    Ok(CallerIdentity {
        profile_id: ProfileId::from_uuid(profile_id),
    })
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Validate the bearer token and inject the caller's [`CallerIdentity`].
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected = request
        .extensions()
        .get::<AuthConfig>()
        .and_then(|c| c.token.clone());

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(header_value) if header_value.starts_with("Bearer ") => {
            let provided = header_value["Bearer ".len()..].trim();
            match parse_bearer_token(provided, expected.as_deref()) {
                Ok(identity) => {
                    request.extensions_mut().insert(identity);
                    next.run(request).await
                }
                Err(msg) => {
                    tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
                    unauthorized_response(&msg)
                }
            }
        }
        Some(_) => {
            tracing::warn!("authentication failed: non-Bearer authorization scheme");
            unauthorized_response("authorization header must use Bearer scheme")
        }
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            unauthorized_response("missing authorization header")
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const PROFILE: &str = "550e8400-e29b-41d4-a716-446655440000";

    /// Router whose handler echoes the caller's profile id.
    fn test_app(token: Option<String>) -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|caller: CallerIdentity| async move { caller.profile_id.as_uuid().to_string() }),
            )
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(AuthConfig { token }))
    }

    async fn call(app: Router, authorization: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/whoami");
        if let Some(value) = authorization {
            builder = builder.header("Authorization", value);
        }
        let response = app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn valid_token_injects_profile() {
        let app = test_app(Some("s3cret".into()));
        let (status, body) = call(app, Some(&format!("Bearer {PROFILE}:s3cret"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, PROFILE);
    }

    #[tokio::test]
    async fn missing_authorization_header_rejected() {
        let (status, body) = call(test_app(Some("s3cret".into())), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let err: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(err["error"]["code"], "UNAUTHORIZED");
        assert!(err["error"]["message"].as_str().unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn wrong_secret_rejected() {
        let app = test_app(Some("s3cret".into()));
        let (status, body) = call(app, Some(&format!("Bearer {PROFILE}:guess"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("invalid bearer token"));
    }

    #[tokio::test]
    async fn non_bearer_scheme_rejected() {
        let (status, body) = call(test_app(None), Some("Basic dXNlcjpwYXNz")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("Bearer scheme"));
    }

    #[tokio::test]
    async fn secret_required_when_configured() {
        let app = test_app(Some("s3cret".into()));
        let (status, _) = call(app, Some(&format!("Bearer {PROFILE}"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_disabled_accepts_bare_profile_id() {
        let (status, body) = call(test_app(None), Some(&format!("Bearer {PROFILE}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, PROFILE);

        let (status, _) = call(test_app(None), Some(&format!("Bearer {PROFILE}:anything"))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn auth_disabled_still_needs_profile_id() {
        let (status, body) = call(test_app(None), Some("Bearer not-a-uuid")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("invalid profile id"));
    }

    #[test]
    fn constant_time_eq_behaviour() {
        assert!(constant_time_token_eq("secret-token-123", "secret-token-123"));
        assert!(!constant_time_token_eq("wrong-token", "secret-token-123"));
        assert!(!constant_time_token_eq("secret", "secret-token-123"));
        assert!(!constant_time_token_eq("", "secret-token-123"));
    }

    #[test]
    fn secret_may_contain_colons() {
        let identity = parse_bearer_token(&format!("{PROFILE}:a:b:c"), Some("a:b:c")).unwrap();
        assert_eq!(identity.profile_id.as_uuid().to_string(), PROFILE);
    }

    #[test]
    fn auth_config_debug_redacts_token() {
        let dbg = format!("{:?}", AuthConfig { token: Some("hunter2".into()) });
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("REDACTED"));
    }
}
