use crate::{
    entities::resource_movement::CausalRef,
    services::{restoration::RestorationReport, TransitionContext},
    ApiResponse, ApiResult, AppState,
};
use axum::{extract::State, response::Json};
use serde::Deserialize;
use uuid::Uuid;

/// Direct restoration request, for operational recovery outside the normal
/// ticket-close / report-delete paths.
#[derive(Debug, Deserialize)]
pub struct RestoreByCausalRefRequest {
    pub causal_ref: CausalRef,
    pub actor_id: Option<Uuid>,
    pub note: Option<String>,
}

pub async fn restore_by_causal_ref(
    State(state): State<AppState>,
    Json(payload): Json<RestoreByCausalRefRequest>,
) -> ApiResult<RestorationReport> {
    let mut ctx = TransitionContext::new(payload.actor_id);
    ctx.note = payload.note;

    let report = state
        .restoration_service()
        .restore_by_causal_ref(payload.causal_ref, ctx)
        .await?;

    Ok(Json(ApiResponse::success(report)))
}
