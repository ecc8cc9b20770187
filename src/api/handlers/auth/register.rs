//! Registration placeholder.
//!
//! Account creation happens through the onboarding pipeline, not this
//! service; the endpoint accepts the request shape so clients built against
//! the eventual contract do not break.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    responses(
        (status = 202, description = "Accepted; registration is not performed here yet")
    ),
    tag = "auth"
)]
pub async fn register() -> Response {
    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))).into_response()
}
