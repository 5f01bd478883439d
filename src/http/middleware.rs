//! Axum middleware that enforces the rate limit.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{trace, warn};

use super::client::ClientKey;
use crate::ratelimit::{RateLimitInfo, RateLimiter};

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Admit or reject the request based on the caller's sliding window.
///
/// Rejected requests never reach `next`; they get a 429 carrying the reset
/// time and a `Retry-After` in whole seconds.
pub async fn enforce_rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let key = ClientKey::from_request_parts(request.headers(), request.extensions());
    let client_id = key.to_string_key();

    if !limiter.is_allowed(&client_id) {
        let info = limiter.get_rate_limit_info(&client_id);
        warn!(
            client = %key,
            path = %request.uri().path(),
            reset_time = %info.reset_time,
            "Rate limit exceeded"
        );
        return too_many_requests(&limiter, &info);
    }

    trace!(client = %key, "Request admitted");

    // Quota as of admission, not after whatever the handler triggers
    let info = limiter.get_rate_limit_info(&client_id);

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        X_RATELIMIT_LIMIT,
        HeaderValue::from(limiter.settings().max_requests),
    );
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(info.remaining));
    headers.insert(X_RATELIMIT_RESET, reset_header(&info));
    response
}

/// Reset time in unix seconds, rounded up.
fn reset_header(info: &RateLimitInfo) -> HeaderValue {
    let reset = info.reset_time;
    let secs = reset.timestamp() + i64::from(reset.timestamp_subsec_nanos() > 0);
    HeaderValue::from(secs.max(0) as u64)
}

fn too_many_requests(limiter: &RateLimiter, info: &RateLimitInfo) -> Response {
    let retry_after = info.retry_after_secs(limiter.now());

    let body = Json(json!({
        "error": "rate_limit_exceeded",
        "message": "Too many requests. Please try again later.",
        "remaining": 0,
        "reset_time": info.reset_time,
    }));

    let mut headers = HeaderMap::new();
    headers.insert(
        X_RATELIMIT_LIMIT,
        HeaderValue::from(limiter.settings().max_requests),
    );
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(0u32));
    headers.insert(X_RATELIMIT_RESET, reset_header(info));
    headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));

    (StatusCode::TOO_MANY_REQUESTS, headers, body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::client::AuthenticatedUser;
    use crate::ratelimit::{LimitSettings, ManualClock};
    use axum::body::{to_bytes, Body};
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use axum::Router;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(limiter: Arc<RateLimiter>) -> Router {
        Router::new()
            .route("/orders", get(|| async { "ok" }))
            .layer(from_fn_with_state(limiter, enforce_rate_limit))
    }

    fn limiter(max_requests: u32) -> Arc<RateLimiter> {
        Arc::new(
            RateLimiter::new(LimitSettings::new(max_requests, Duration::from_secs(60))).unwrap(),
        )
    }

    fn request_from(ip: &str) -> Request {
        Request::builder()
            .uri("/orders")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_admitted_request_has_quota_headers() {
        let limiter = limiter(3);
        let response = app(limiter.clone())
            .oneshot(request_from("1.2.3.4"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[&X_RATELIMIT_LIMIT], "3");
        assert_eq!(response.headers()[&X_RATELIMIT_REMAINING], "2");
        assert_eq!(limiter.request_count("ip:1.2.3.4"), Some(1));
    }

    #[tokio::test]
    async fn test_rejects_over_limit() {
        let limiter = limiter(2);
        let app = app(limiter.clone());

        for _ in 0..2 {
            let response = app.clone().oneshot(request_from("1.2.3.4")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(request_from("1.2.3.4")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[&X_RATELIMIT_REMAINING], "0");
        assert!(response.headers().contains_key(&X_RATELIMIT_RESET));

        let retry_after: u64 = response.headers()[RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=60).contains(&retry_after));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "rate_limit_exceeded");
        assert_eq!(body["remaining"], 0);
        assert!(body["reset_time"].is_string());

        // Rejections are not recorded
        assert_eq!(limiter.request_count("ip:1.2.3.4"), Some(2));
    }

    #[tokio::test]
    async fn test_waiting_retry_after_is_enough() {
        let clock = Arc::new(ManualClock::default());
        let limiter = Arc::new(
            RateLimiter::with_clock(LimitSettings::new(1, Duration::from_secs(60)), clock.clone())
                .unwrap(),
        );
        let app = app(limiter);

        let first = app.clone().oneshot(request_from("1.2.3.4")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        clock.advance(Duration::from_millis(500));
        let rejected = app.clone().oneshot(request_from("1.2.3.4")).await.unwrap();
        assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);

        // 59.5s remain, so the header must say 60
        let retry_after: u64 = rejected.headers()[RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(retry_after, 60);

        clock.advance(Duration::from_secs(retry_after));
        let retried = app.clone().oneshot(request_from("1.2.3.4")).await.unwrap();
        assert_eq!(retried.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admitted_headers_reflect_admission() {
        let limiter = limiter(3);
        let busy_handler = {
            let limiter = limiter.clone();
            move || {
                let limiter = limiter.clone();
                async move {
                    // Another request from the same client lands mid-handler
                    limiter.is_allowed("ip:1.2.3.4");
                    "ok"
                }
            }
        };
        let app = Router::new()
            .route("/orders", get(busy_handler))
            .layer(from_fn_with_state(limiter.clone(), enforce_rate_limit));

        let response = app.oneshot(request_from("1.2.3.4")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[&X_RATELIMIT_REMAINING], "2");
        assert_eq!(limiter.request_count("ip:1.2.3.4"), Some(2));

        let reset: i64 = response.headers()[&X_RATELIMIT_RESET]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        let now = limiter.now().timestamp();
        assert!((now + 59..=now + 61).contains(&reset));
    }

    #[tokio::test]
    async fn test_clients_limited_separately() {
        let limiter = limiter(1);
        let app = app(limiter);

        let first = app.clone().oneshot(request_from("1.1.1.1")).await.unwrap();
        let second = app.clone().oneshot(request_from("2.2.2.2")).await.unwrap();
        let again = app.clone().oneshot(request_from("1.1.1.1")).await.unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(again.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_authenticated_user_keyed_by_id() {
        let limiter = limiter(5);
        let mut request = request_from("1.2.3.4");
        request
            .extensions_mut()
            .insert(AuthenticatedUser("7".to_string()));

        let response = app(limiter.clone()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(limiter.request_count("user:7"), Some(1));
        assert_eq!(limiter.request_count("ip:1.2.3.4"), None);
    }
}
