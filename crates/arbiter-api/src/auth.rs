//! # Authentication Middleware
//!
//! Resolves the calling actor for every API request.
//!
//! ## Token Format
//!
//! ```text
//! Authorization: Bearer {actor}:{secret}
//! ```
//!
//! The secret is compared in constant time against `AUTH_TOKEN`. The actor
//! is what the workflow records as resolver, filer, or reviewer, and what
//! the access policy checks permissions for.
//!
//! When `AUTH_TOKEN` is unset, authentication is disabled and the actor is
//! taken from the `X-Actor-Ref` header, defaulting to `anonymous`.
//!
//! ## CallerIdentity
//!
//! Every authenticated request gets a [`CallerIdentity`] injected into the
//! request extensions. Handlers extract it via the `FromRequestParts` impl.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, HeaderName, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subtle::ConstantTimeEq;

use arbiter_core::ActorRef;

use crate::error::{AppError, ErrorBody, ErrorDetail};

/// Header naming the actor when authentication is disabled.
pub const ACTOR_HEADER: HeaderName = HeaderName::from_static("x-actor-ref");

/// Actor used when authentication is disabled and no header is sent.
pub const ANONYMOUS_ACTOR: &str = "anonymous";

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub actor: ActorRef,
}

/// Extracts the identity that the auth middleware injected into extensions.
/// Returns 401 if no identity is present (middleware didn't run or failed).
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value to prevent credential leakage in logs.
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

/// Constant-time comparison of secrets.
///
/// When lengths differ, performs a dummy comparison so timing does not
/// depend on where the mismatch is.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse a bearer token of the form `{actor}:{secret}`.
///
/// The actor ends at the first `:`; the secret may itself contain colons.
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<CallerIdentity, String> {
    let (actor, secret) = provided
        .split_once(':')
        .ok_or_else(|| "invalid token format, expected {actor}:{secret}".to_string())?;
    if !constant_time_token_eq(secret, expected_secret) {
        return Err("invalid bearer token".into());
    }
    let actor = ActorRef::new(actor).map_err(|e| format!("invalid actor in token: {e}"))?;
    Ok(CallerIdentity { actor })
}

fn header_identity(request: &Request) -> Result<CallerIdentity, String> {
    let raw = match request.headers().get(&ACTOR_HEADER) {
        Some(value) => value
            .to_str()
            .map_err(|_| format!("{ACTOR_HEADER} header is not valid text"))?,
        None => ANONYMOUS_ACTOR,
    };
    let actor = ActorRef::new(raw).map_err(|e| format!("invalid {ACTOR_HEADER} header: {e}"))?;
    Ok(CallerIdentity { actor })
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Resolve the caller and inject a [`CallerIdentity`] for downstream handlers.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected_token = request.extensions().get::<AuthConfig>().cloned();

    let identity = match expected_token {
        Some(AuthConfig {
            token: Some(ref expected),
        }) => {
            let auth_header = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());

            match auth_header {
                Some(header_value) => match header_value.strip_prefix("Bearer ") {
                    Some(provided) => parse_bearer_token(provided, expected),
                    None => Err("authorization header must use Bearer scheme".to_string()),
                },
                None => Err("missing authorization header".to_string()),
            }
        }
        // Auth disabled: the caller names itself.
        _ => header_identity(&request),
    };

    match identity {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(msg) => {
            tracing::warn!(reason = %msg, "authentication failed");
            unauthorized_response(&msg)
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
