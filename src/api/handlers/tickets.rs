use crate::ticket::{ExpirationPolicy, TicketSnapshot, TicketState};
use axum::{Json, extract::Extension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ExpirationRequest {
    /// Ticket state from the ticket store; absent when the ticket is unknown.
    #[serde(default)]
    pub ticket: Option<TicketSnapshot>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ExpirationResponse {
    pub expired: bool,
}

#[utoipa::path(
    post,
    path= "/v1/tickets/expiration",
    request_body = ExpirationRequest,
    responses (
        (status = 200, description = "Expiration decision", body = ExpirationResponse),
    ),
    tag= "tickets"
)]
pub async fn expiration(
    policy: Extension<Arc<dyn ExpirationPolicy>>,
    Json(request): Json<ExpirationRequest>,
) -> Json<ExpirationResponse> {
    let state = request.ticket.as_ref().map(|ticket| ticket as &dyn TicketState);
    Json(ExpirationResponse {
        expired: policy.is_expired(state),
    })
}
