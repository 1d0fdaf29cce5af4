use crate::auth::{ClientCredential, DelegatedAuthenticationHandler, HandlerResult, UserProfile};
use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    /// Name of the delegated client that produced the profile.
    pub client_name: String,
    /// Submitted username; only used to key the throttle.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub profile: Option<UserProfile>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginError {
    pub error: String,
}

/// Turn a profile produced by the identity front end into a principal.
///
/// The profile in the request body is trusted as-is: nothing here proves the
/// caller authenticated the user. Expose this route only to the
/// trusted identity front end, never to end-user clients.
#[utoipa::path(
    post,
    path= "/v1/login",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Authentication succeeded", body = HandlerResult),
        (status = 400, description = "Missing payload"),
        (status = 401, description = "Authentication failed", body = LoginError),
        (status = 403, description = "Submission throttled"),
    ),
    tag= "authentication"
)]
#[instrument(skip(handler, payload))]
pub async fn login(
    handler: Extension<Arc<DelegatedAuthenticationHandler>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };

    let credential = ClientCredential {
        client_name: request.client_name,
    };

    match handler.create_result(&credential, request.profile) {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => {
            debug!("Authentication failed: {err}");
            (
                StatusCode::UNAUTHORIZED,
                Json(LoginError {
                    error: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}
