//! History endpoints.
//!
//! - `POST   /api/patients/:patient_id/histories`: generate
//! - `GET    /api/patients/:patient_id/histories`: list, most recent first
//! - `GET    /api/histories/:id`: one record
//! - `DELETE /api/histories/:id`: delete record and cached PDF

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext, RequestingUser};
use crate::models::{GeneratedHistory, GenerationOptions};

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub id: String,
    pub deleted: bool,
}

/// `POST /api/patients/:patient_id/histories`: generate a new history.
///
/// The generation runs in its own task: a client that hangs up does not
/// abort a call that is already consuming provider quota.
pub async fn generate(
    State(ctx): State<ApiContext>,
    Path(patient_id): Path<String>,
    RequestingUser(user_id): RequestingUser,
    payload: Result<Json<GenerationOptions>, JsonRejection>,
) -> Result<(StatusCode, Json<GeneratedHistory>), ApiError> {
    let patient_id = parse_id(&patient_id)?;
    let Json(options) = payload?;

    let orchestrator = ctx.orchestrator.clone();
    let history = tokio::spawn(async move {
        orchestrator.generate(patient_id, options, user_id).await
    })
    .await??;

    Ok((StatusCode::CREATED, Json(history)))
}

/// `GET /api/patients/:patient_id/histories?limit=N`
pub async fn list(
    State(ctx): State<ApiContext>,
    Path(patient_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<GeneratedHistory>>, ApiError> {
    let patient_id = parse_id(&patient_id)?;
    let histories = ctx.orchestrator.list(&patient_id, query.limit)?;
    Ok(Json(histories))
}

/// `GET /api/histories/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(history_id): Path<String>,
) -> Result<Json<GeneratedHistory>, ApiError> {
    let history_id = parse_id(&history_id)?;
    Ok(Json(ctx.orchestrator.get_by_id(&history_id)?))
}

/// `DELETE /api/histories/:id`
pub async fn delete(
    State(ctx): State<ApiContext>,
    Path(history_id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let id = parse_id(&history_id)?;
    ctx.orchestrator.delete(&id)?;

    Ok(Json(DeleteResponse {
        id: id.to_string(),
        deleted: true,
    }))
}
