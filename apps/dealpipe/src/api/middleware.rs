//! # Middleware Module
//!
//! Per-caller rate limiting for the dealpipe HTTP API.
//!
//! ## Configuration
//!
//! Rate limiting is configured via environment variable:
//! - `DEALPIPE_RATE_LIMIT`: Requests per second per caller (default: 100, 0 disables)
//!
//! Callers are keyed by user id. Anonymous requests are keyed by peer
//! address, so one unauthenticated client cannot drain the public reads of
//! everyone else.

use super::auth::Caller;
use super::types::ErrorResponse;
use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Default rate limit: 100 requests per second.
const DEFAULT_RPS: u32 = 100;

/// Bucket for anonymous requests whose peer address is unknown.
const ANONYMOUS_KEY: &str = "<anonymous>";

// =============================================================================
// RATE LIMITER
// =============================================================================

/// Rate limiter keyed by caller.
pub type CallerRateLimiter = Arc<DefaultKeyedRateLimiter<String>>;

/// Create a new per-caller rate limiter.
///
/// A zero rate falls back to the default.
pub fn create_rate_limiter(requests_per_second: u32) -> CallerRateLimiter {
    let rps = NonZeroU32::new(requests_per_second)
        .or(NonZeroU32::new(DEFAULT_RPS))
        .unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::keyed(Quota::per_second(rps)))
}

/// Get rate limit from environment variable.
///
/// Returns the value of `DEALPIPE_RATE_LIMIT` or 100 if not set.
pub fn get_rate_limit_from_env() -> u32 {
    std::env::var("DEALPIPE_RATE_LIMIT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_RPS)
}

/// Bucket key for a request: `user:<id>` when identified, else `peer:<ip>`.
///
/// The peer address is only present when the server was started with
/// connect info; without it anonymous requests share one bucket.
fn caller_key(request: &Request<Body>) -> String {
    let extensions = request.extensions();
    if let Some(identity) = extensions.get::<Caller>().and_then(|c| c.identity()) {
        return format!("user:{}", identity.user_id);
    }
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(
            || ANONYMOUS_KEY.to_string(),
            |ConnectInfo(addr)| format!("peer:{}", addr.ip()),
        )
}

/// Rate limiting middleware.
///
/// Runs after identity resolution so it can key on the caller. Returns
/// 429 Too Many Requests once the caller's bucket is empty.
pub async fn rate_limit_middleware(
    State(limiter): State<CallerRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = caller_key(&request);

    if limiter.check_key(&key).is_ok() {
        return next.run(request).await;
    }

    tracing::warn!(caller = %key, "Rate limit exceeded");
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ErrorResponse {
            error: "RateLimited".to_string(),
            message: "Too Many Requests".to_string(),
        }),
    )
        .into_response()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use dealpipe_core::Identity;

    #[test]
    fn test_create_rate_limiter() {
        let limiter = create_rate_limiter(50);
        assert!(limiter.check_key(&"alice".to_string()).is_ok());
    }

    #[test]
    fn test_create_rate_limiter_zero_defaults() {
        let limiter = create_rate_limiter(0);
        assert!(limiter.check_key(&"alice".to_string()).is_ok());
    }

    fn request_with(caller: Option<Caller>, peer: Option<&str>) -> Request<Body> {
        let mut request = Request::new(Body::empty());
        if let Some(caller) = caller {
            request.extensions_mut().insert(caller);
        }
        if let Some(peer) = peer {
            let addr: SocketAddr = peer.parse().unwrap();
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        request
    }

    #[test]
    fn test_identified_caller_keyed_by_user() {
        let caller = Caller(Some(Identity::member("alice")));
        let request = request_with(Some(caller), Some("10.0.0.1:5000"));
        assert_eq!(caller_key(&request), "user:alice");
    }

    #[test]
    fn test_anonymous_keyed_by_peer_ip() {
        let first = request_with(Some(Caller(None)), Some("10.0.0.1:5000"));
        let same_host = request_with(None, Some("10.0.0.1:6000"));
        let other_host = request_with(None, Some("10.0.0.2:5000"));
        assert_eq!(caller_key(&first), "peer:10.0.0.1");
        assert_eq!(caller_key(&same_host), caller_key(&first));
        assert_ne!(caller_key(&other_host), caller_key(&first));
    }

    #[test]
    fn test_anonymous_without_peer_shares_bucket() {
        assert_eq!(caller_key(&request_with(None, None)), ANONYMOUS_KEY);
    }

    #[test]
    fn test_anonymous_clients_do_not_share_quota() {
        let limiter = create_rate_limiter(1);
        let noisy = caller_key(&request_with(None, Some("10.0.0.1:5000")));
        let quiet = caller_key(&request_with(None, Some("10.0.0.2:5000")));
        assert!(limiter.check_key(&noisy).is_ok());
        assert!(limiter.check_key(&noisy).is_err());
        assert!(limiter.check_key(&quiet).is_ok());
    }

    #[test]
    fn test_buckets_are_per_caller() {
        let limiter = create_rate_limiter(1);
        assert!(limiter.check_key(&"alice".to_string()).is_ok());
        assert!(limiter.check_key(&"alice".to_string()).is_err());
        assert!(limiter.check_key(&"bob".to_string()).is_ok());
    }
}
