//! # Identity Resolution
//!
//! Turns the `Authorization` header into an optional [`Identity`].
//!
//! The server never decides *whether* a request is allowed here. It only
//! works out *who* is asking; the core's access guard makes the decision.
//! A missing or unknown token yields no identity, which the core reports as
//! `Unauthenticated` for any operation that needs one.
//!
//! ## Usage
//!
//! ```text
//! Authorization: Bearer <session-token>
//! ```

use crate::config::SessionEntry;
use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, header, request::Parts},
    middleware::Next,
    response::Response,
};
use dealpipe_core::Identity;
use std::convert::Infallible;
use std::sync::Arc;
use subtle::ConstantTimeEq;

// =============================================================================
// RESOLVER SEAM
// =============================================================================

/// Maps an opaque credential to an identity.
///
/// Implementations must not interpret the token's contents.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, token: &str) -> Option<Identity>;
}

/// Fixed token table, usually loaded from a sessions file.
#[derive(Default)]
pub struct StaticSessions {
    entries: Vec<(String, Identity)>,
}

impl StaticSessions {
    #[must_use]
    pub fn new(sessions: impl IntoIterator<Item = SessionEntry>) -> Self {
        Self {
            entries: sessions
                .into_iter()
                .map(|s| {
                    let identity = s.identity();
                    (s.token, identity)
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IdentityResolver for StaticSessions {
    fn resolve(&self, token: &str) -> Option<Identity> {
        // Every entry is compared so the scan time does not reveal which one matched.
        let mut found = None;
        for (expected, identity) in &self.entries {
            if tokens_match(token, expected) && found.is_none() {
                found = Some(identity.clone());
            }
        }
        found
    }
}

/// Constant-time token comparison.
///
/// Both tokens are padded to the same length so `ct_eq` always runs over
/// the same number of bytes.
fn tokens_match(provided: &str, expected: &str) -> bool {
    let provided_bytes = provided.as_bytes();
    let expected_bytes = expected.as_bytes();

    let max_len = provided_bytes.len().max(expected_bytes.len());
    let mut padded_provided = vec![0u8; max_len];
    let mut padded_expected = vec![0u8; max_len];
    padded_provided[..provided_bytes.len()].copy_from_slice(provided_bytes);
    padded_expected[..expected_bytes.len()].copy_from_slice(expected_bytes);

    let bytes_match: bool = padded_provided.ct_eq(&padded_expected).into();
    bytes_match && provided_bytes.len() == expected_bytes.len()
}

// =============================================================================
// REQUEST IDENTITY
// =============================================================================

/// The identity attached to a request, if any.
#[derive(Debug, Clone, Default)]
pub struct Caller(pub Option<Identity>);

impl Caller {
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.0.as_ref()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Caller>().cloned().unwrap_or_default())
    }
}

/// Resolve the bearer token and attach a [`Caller`] to the request.
///
/// Accepts both `Bearer <token>` and a raw `<token>`. Never rejects: an
/// unknown token is logged and the request continues anonymously.
pub async fn identity_middleware(
    State(resolver): State<Arc<dyn IdentityResolver>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim())
        .filter(|t| !t.is_empty());

    let identity = match token {
        Some(token) => {
            let resolved = resolver.resolve(token);
            if resolved.is_none() {
                tracing::warn!(
                    event = "auth_failure",
                    reason = "unknown_session_token",
                    "Authentication failed: unknown session token"
                );
            }
            resolved
        }
        None => None,
    };

    request.extensions_mut().insert(Caller(identity));
    next.run(request).await
}

// =============================================================================
// TESTS
// =============================================================================
