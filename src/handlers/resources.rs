use crate::{
    entities::{
        resource,
        resource_movement::{self, CausalRef},
    },
    errors::ServiceError,
    services::TransitionContext,
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::entities::resource::ResourceStatus;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateResourceRequest {
    #[validate(length(min = 1, message = "Resource code cannot be empty"))]
    pub code: String,
    pub notes: Option<String>,
    #[validate(range(min = 1, message = "Maintenance interval must be positive"))]
    pub maintenance_interval_days: Option<i32>,
}

/// Shared fields every transition body carries.
#[derive(Debug, Deserialize, Default)]
pub struct TransitionRequest {
    pub actor_id: Option<Uuid>,
    pub causal_ref: Option<CausalRef>,
    pub note: Option<String>,
    pub cost: Option<Decimal>,
}

impl TransitionRequest {
    fn into_context(self) -> TransitionContext {
        TransitionContext {
            actor_id: self.actor_id,
            causal_ref: self.causal_ref,
            note: self.note,
            cost: self.cost,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub custodian_id: Uuid,
    pub target_status: Option<ResourceStatus>,
    #[serde(flatten)]
    pub transition: TransitionRequest,
}

#[derive(Debug, Deserialize)]
pub struct LoanRequest {
    pub custodian_id: Uuid,
    #[serde(default)]
    pub substitute: bool,
    #[serde(flatten)]
    pub transition: TransitionRequest,
}

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub custodian_id: Option<Uuid>,
    pub sale_price: Option<Decimal>,
    #[serde(flatten)]
    pub transition: TransitionRequest,
}

#[derive(Debug, Deserialize)]
pub struct RestoreStatusRequest {
    pub target_status: ResourceStatus,
    pub custodian_id: Option<Uuid>,
    #[serde(flatten)]
    pub transition: TransitionRequest,
}

#[derive(Debug, Serialize)]
pub struct ResourceSummary {
    pub id: Uuid,
    pub code: String,
    pub status: String,
    pub custodian_id: Option<Uuid>,
    pub location: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub sale_date: Option<DateTime<Utc>>,
    pub sale_price: Option<Decimal>,
    pub next_maintenance_due: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<resource::Model> for ResourceSummary {
    fn from(model: resource::Model) -> Self {
        Self {
            id: model.id,
            code: model.code,
            status: model.status,
            custodian_id: model.custodian_id,
            location: model.location,
            assigned_at: model.assigned_at,
            sale_date: model.sale_date,
            sale_price: model.sale_price,
            next_maintenance_due: model.next_maintenance_due,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MovementSummary {
    pub id: Uuid,
    pub resource_id: Uuid,
    pub movement_type: String,
    pub previous_status: Option<String>,
    pub new_status: Option<String>,
    pub custodian_id: Option<Uuid>,
    pub causal_ref: Option<CausalRef>,
    pub is_substitute_loan: bool,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<resource_movement::Model> for MovementSummary {
    fn from(model: resource_movement::Model) -> Self {
        let causal_ref = model.causal_ref();
        Self {
            id: model.id,
            resource_id: model.resource_id,
            movement_type: model.movement_type,
            previous_status: model.previous_status,
            new_status: model.new_status,
            custodian_id: model.custodian_id,
            causal_ref,
            is_substitute_loan: model.is_substitute_loan,
            note: model.note,
            created_at: model.created_at,
        }
    }
}

pub async fn create_resource(
    State(state): State<AppState>,
    Json(payload): Json<CreateResourceRequest>,
) -> ApiResult<ResourceSummary> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let created = state
        .resource_service()
        .create_resource(payload.code, payload.notes, payload.maintenance_interval_days)
        .await?;

    Ok(Json(ApiResponse::success(ResourceSummary::from(created))))
}

pub async fn get_resource(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ResourceSummary> {
    let model = state.resource_service().get_resource(id).await?;
    Ok(Json(ApiResponse::success(ResourceSummary::from(model))))
}

pub async fn get_resource_movements(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<MovementSummary>> {
    let movements = state.resource_service().movement_history(id).await?;
    Ok(Json(ApiResponse::success(
        movements.into_iter().map(MovementSummary::from).collect(),
    )))
}

pub async fn delete_resource(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<()> {
    state.resource_service().delete_resource(id).await?;
    Ok(Json(ApiResponse::success(())))
}

pub async fn assign_resource(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> ApiResult<MovementSummary> {
    let movement = state
        .resource_service()
        .assign_to_custodian(
            id,
            payload.custodian_id,
            payload.target_status,
            payload.transition.into_context(),
        )
        .await?;

    Ok(Json(ApiResponse::success(MovementSummary::from(movement))))
}

pub async fn loan_resource(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LoanRequest>,
) -> ApiResult<MovementSummary> {
    let ctx = payload.transition.into_context();
    let movement = if payload.substitute {
        state
            .resource_service()
            .loan_substitute(id, payload.custodian_id, ctx)
            .await?
    } else {
        state
            .resource_service()
            .loan_temporarily(id, payload.custodian_id, ctx)
            .await?
    };

    Ok(Json(ApiResponse::success(MovementSummary::from(movement))))
}

pub async fn return_resource(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> ApiResult<MovementSummary> {
    let movement = state
        .resource_service()
        .return_to_warehouse(id, payload.into_context())
        .await?;

    Ok(Json(ApiResponse::success(MovementSummary::from(movement))))
}

pub async fn send_resource_to_repair(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> ApiResult<MovementSummary> {
    let movement = state
        .resource_service()
        .send_to_repair(id, payload.into_context())
        .await?;

    Ok(Json(ApiResponse::success(MovementSummary::from(movement))))
}

pub async fn complete_resource_repair(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> ApiResult<MovementSummary> {
    let movement = state
        .resource_service()
        .complete_repair(id, payload.into_context())
        .await?;

    Ok(Json(ApiResponse::success(MovementSummary::from(movement))))
}

pub async fn activate_resource(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ActivateRequest>,
) -> ApiResult<MovementSummary> {
    let movement = state
        .resource_service()
        .activate(
            id,
            payload.custodian_id,
            payload.sale_price,
            payload.transition.into_context(),
        )
        .await?;

    Ok(Json(ApiResponse::success(MovementSummary::from(movement))))
}

pub async fn restore_resource_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RestoreStatusRequest>,
) -> ApiResult<MovementSummary> {
    let movement = state
        .resource_service()
        .restore_to_status(
            id,
            payload.target_status,
            payload.custodian_id,
            payload.transition.into_context(),
        )
        .await?;

    Ok(Json(ApiResponse::success(MovementSummary::from(movement))))
}
