//! Axum middleware applying the throttle to authentication submissions.
//!
//! Only `POST` requests are examined. A throttled submission is answered with
//! `403` without reaching the handler. A `401` from the handler counts as a
//! failed authentication for the client key.

use axum::{
    body::{Body, to_bytes},
    extract::{ConnectInfo, Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::{net::SocketAddr, sync::Arc};
use tracing::debug;

use super::{ThrottleDecision, ThrottleInterceptor, key::client_ip};

/// Upper bound on buffered submission bodies when the key needs a username.
const MAX_SUBMISSION_BYTES: usize = 64 * 1024;

pub async fn throttle_submissions(
    State(interceptor): State<Arc<ThrottleInterceptor>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::POST {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(
        request.headers(),
        peer,
        interceptor.config().trust_forwarded_headers(),
    );

    let strategy = interceptor.config().key_strategy();
    let (request, username) = if strategy.needs_username() {
        match buffer_username(request, interceptor.config().username_field()).await {
            Ok(buffered) => buffered,
            Err(response) => return response,
        }
    } else {
        (request, None)
    };

    let key = strategy.construct_key(&ip, username.as_deref());

    if interceptor.before_request(&key) == ThrottleDecision::Denied {
        return (
            StatusCode::FORBIDDEN,
            format!(
                "Access Denied for user [{}] from IP Address [{ip}]",
                username.unwrap_or_default()
            ),
        )
            .into_response();
    }

    let response = next.run(request).await;

    if response.status() == StatusCode::UNAUTHORIZED {
        interceptor.on_authentication_failure(&key);
    }

    response
}

// Read the username field from a JSON body and hand the same bytes on.
async fn buffer_username(
    request: Request,
    field: &str,
) -> Result<(Request, Option<String>), Response> {
    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_SUBMISSION_BYTES).await.map_err(|err| {
        debug!("Failed to buffer submission body: {err}");
        (StatusCode::BAD_REQUEST, "Invalid request body".to_string()).into_response()
    })?;

    let username = serde_json::from_slice::<Value>(&bytes)
        .ok()
        .and_then(|value| value.get(field).and_then(Value::as_str).map(str::to_string));

    Ok((Request::from_parts(parts, Body::from(bytes)), username))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::throttle::{KeyStrategy, ThrottleConfig};
    use axum::{Router, middleware, routing::any};
    use tower::ServiceExt;

    // Fails whenever the body does not carry the right password.
    async fn authenticate(method: Method, body: String) -> StatusCode {
        if method != Method::POST || body.contains("\"password\":\"secret\"") {
            StatusCode::OK
        } else {
            StatusCode::UNAUTHORIZED
        }
    }

    fn app(interceptor: Arc<ThrottleInterceptor>) -> Router {
        Router::new()
            .route("/login", any(authenticate))
            .route_layer(middleware::from_fn_with_state(
                interceptor,
                throttle_submissions,
            ))
    }

    fn interceptor(strategy: KeyStrategy) -> Arc<ThrottleInterceptor> {
        let config = ThrottleConfig::new()
            .with_failure_threshold(1)
            .with_failure_range_seconds(1)
            .with_key_strategy(strategy);
        Arc::new(ThrottleInterceptor::new(config, false))
    }

    const PEER: &str = "192.0.2.10:50000";

    fn submit(method: Method, body: &str) -> Request {
        let mut request = Request::builder()
            .method(method)
            .uri("/login")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("valid request");
        let peer: SocketAddr = PEER.parse().expect("valid peer");
        request.extensions_mut().insert(ConnectInfo(peer));
        request
    }

    fn submit_forwarded_for(forwarded_for: &str) -> Request {
        let mut request = submit(Method::POST, r#"{"password":"wrong"}"#);
        request.headers_mut().insert(
            "x-forwarded-for",
            forwarded_for.parse().expect("valid header value"),
        );
        request
    }

    #[tokio::test]
    async fn failure_then_throttled() {
        let interceptor = interceptor(KeyStrategy::IpAddress);
        let app = app(interceptor.clone());

        let response = app
            .clone()
            .oneshot(submit(Method::POST, r#"{"password":"wrong"}"#))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(interceptor.tracker().last_failure("192.0.2.10").is_some());

        let response = app
            .oneshot(submit(Method::POST, r#"{"password":"secret"}"#))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn success_records_nothing() {
        let interceptor = interceptor(KeyStrategy::IpAddress);
        let response = app(interceptor.clone())
            .oneshot(submit(Method::POST, r#"{"password":"secret"}"#))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(interceptor.tracker().is_empty());
    }

    #[tokio::test]
    async fn non_post_passes_through() {
        let interceptor = interceptor(KeyStrategy::IpAddress);
        interceptor.on_authentication_failure("192.0.2.10");

        let response = app(interceptor)
            .oneshot(submit(Method::GET, ""))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn username_key_keeps_body_for_handler() {
        let interceptor = interceptor(KeyStrategy::IpAddressAndUsername);
        let app = app(interceptor.clone());

        let response = app
            .clone()
            .oneshot(submit(
                Method::POST,
                r#"{"username":"Alice","password":"secret"}"#,
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(submit(
                Method::POST,
                r#"{"username":"Alice","password":"wrong"}"#,
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(
            interceptor
                .tracker()
                .last_failure("alice;192.0.2.10")
                .is_some()
        );

        // Another account from the same address is tracked separately.
        let response = app
            .oneshot(submit(
                Method::POST,
                r#"{"username":"bob","password":"secret"}"#,
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rotating_forwarded_for_is_still_throttled() {
        let interceptor = interceptor(KeyStrategy::IpAddress);
        let app = app(interceptor.clone());

        let mut forbidden = 0;
        for i in 0..20 {
            let response = app
                .clone()
                .oneshot(submit_forwarded_for(&format!("10.9.9.{i}")))
                .await
                .expect("response");
            if response.status() == StatusCode::FORBIDDEN {
                forbidden += 1;
            }
        }

        assert_eq!(forbidden, 19);
        assert_eq!(interceptor.tracker().len(), 1);
        assert!(interceptor.tracker().last_failure("192.0.2.10").is_some());
    }

    #[tokio::test]
    async fn trusted_forwarded_for_keys_by_forwarded_address() {
        let config = ThrottleConfig::new()
            .with_failure_threshold(1)
            .with_failure_range_seconds(1)
            .with_trust_forwarded_headers(true);
        let interceptor = Arc::new(ThrottleInterceptor::new(config, false));
        let app = app(interceptor.clone());

        let response = app
            .clone()
            .oneshot(submit_forwarded_for("10.9.9.1"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(interceptor.tracker().last_failure("10.9.9.1").is_some());
        assert!(interceptor.tracker().last_failure("192.0.2.10").is_none());

        let response = app
            .oneshot(submit_forwarded_for("10.9.9.1"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
