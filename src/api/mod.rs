use crate::{
    api::handlers::{health, login, tickets},
    auth::DelegatedAuthenticationHandler,
    throttle::{ThrottleInterceptor, throttle_submissions},
    ticket::ExpirationPolicy,
};
use anyhow::{Context, Result};
use axum::{
    Extension, Json, Router,
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::{get, post},
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, debug_span, error, info};
use ulid::Ulid;
use utoipa::OpenApi;

pub mod handlers;

#[derive(OpenApi)]
#[openapi(
    paths(health::health, login::login, tickets::expiration),
    components(schemas(
        health::Health,
        login::LoginRequest,
        login::LoginError,
        tickets::ExpirationRequest,
        tickets::ExpirationResponse,
        crate::auth::HandlerResult,
        crate::auth::UserProfile,
        crate::ticket::TicketSnapshot,
    )),
    tags(
        (name = "authentication", description = "Throttled delegated authentication"),
        (name = "tickets", description = "Ticket expiration decisions"),
    )
)]
pub struct ApiDoc;

/// Shared components wired into the router.
#[derive(Clone, Debug)]
pub struct Services {
    pub interceptor: Arc<ThrottleInterceptor>,
    pub authentication: Arc<DelegatedAuthenticationHandler>,
    pub expiration_policy: Arc<dyn ExpirationPolicy>,
}

/// Build the application router. The throttle only wraps the login route.
pub fn router(services: &Services) -> Router {
    let login = Router::new()
        .route("/v1/login", post(login::login))
        .route_layer(middleware::from_fn_with_state(
            services.interceptor.clone(),
            throttle_submissions,
        ));

    Router::new()
        .merge(login)
        .route("/v1/tickets/expiration", post(tickets::expiration))
        .route("/health", get(health::health).options(health::health))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(services.interceptor.clone()))
                .layer(Extension(services.authentication.clone()))
                .layer(Extension(services.expiration_policy.clone())),
        )
}

/// Serve until a shutdown signal arrives, running the throttle cleaner alongside.
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn new(port: u16, services: Services) -> Result<()> {
    let cleaner = services.interceptor.start_cleaner();

    let app = router(&services);

    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("Listening on [::]:{}", port);

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    if let Some(cleaner) = cleaner {
        cleaner.stop().await;
    }

    served.context("Server error")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", path, ?headers, request_id)
}
