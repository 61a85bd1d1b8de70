// API handlers for the web server

use super::{
    SharedDispatcher,
    client_addr::ClientAddr,
    error::ApiError,
    models::{ApiModelInfo, ReplicateRequest},
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use tracing::error;

// --- POST /replicate ---
// Generates images and returns the names of the files written
pub async fn replicate(
    State(dispatcher): State<SharedDispatcher>,
    ClientAddr(client_addr): ClientAddr,
    payload: Result<Json<ReplicateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Vec<String>>), ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        error!("{} Invalid request body: {}", client_addr, rejection.body_text());
        ApiError::from(rejection)
    })?;

    let file_names = dispatcher
        .dispatch(payload.into_generation_request(client_addr))
        .await?;

    Ok((StatusCode::CREATED, Json(file_names)))
}

// --- GET /models ---
// Lists the models accepted by POST /replicate
pub async fn list_models(State(dispatcher): State<SharedDispatcher>) -> Json<Vec<ApiModelInfo>> {
    Json(dispatcher.registry().list().map(ApiModelInfo::from).collect())
}
