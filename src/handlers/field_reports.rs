use crate::{
    entities::field_report,
    errors::ServiceError,
    services::{
        field_reports::{EquipmentOperation, ReportApplication},
        restoration::RestorationReport,
    },
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReportRequest {
    #[validate(length(min = 1, message = "Report number cannot be empty"))]
    pub number: String,
    pub ticket_id: Option<Uuid>,
    pub custodian_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ApplyOperationsRequest {
    pub operations: Vec<EquipmentOperation>,
    pub actor_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DeleteReportQuery {
    pub actor_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ReportSummary {
    pub id: Uuid,
    pub number: String,
    pub ticket_id: Option<Uuid>,
    pub custodian_id: Option<Uuid>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<field_report::Model> for ReportSummary {
    fn from(model: field_report::Model) -> Self {
        Self {
            id: model.id,
            number: model.number,
            ticket_id: model.ticket_id,
            custodian_id: model.custodian_id,
            status: model.status,
            created_at: model.created_at,
        }
    }
}

pub async fn create_report(
    State(state): State<AppState>,
    Json(payload): Json<CreateReportRequest>,
) -> ApiResult<ReportSummary> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let created = state
        .field_report_service()
        .create_report(payload.number, payload.ticket_id, payload.custodian_id)
        .await?;

    Ok(Json(ApiResponse::success(ReportSummary::from(created))))
}

pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ReportSummary> {
    let model = state.field_report_service().get_report(id).await?;
    Ok(Json(ApiResponse::success(ReportSummary::from(model))))
}

pub async fn apply_report_operations(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApplyOperationsRequest>,
) -> ApiResult<ReportApplication> {
    let outcome = state
        .field_report_service()
        .apply_operations(id, payload.operations, payload.actor_id)
        .await?;

    Ok(Json(ApiResponse::success(outcome)))
}

pub async fn delete_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(payload): Query<DeleteReportQuery>,
) -> ApiResult<RestorationReport> {
    let restoration = state
        .field_report_service()
        .delete_report(id, payload.actor_id)
        .await?;

    Ok(Json(ApiResponse::success(restoration)))
}
