use crate::{
    entities::ticket, errors::ServiceError, services::restoration::RestorationReport, ApiResponse,
    ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTicketRequest {
    #[validate(length(min = 1, message = "Ticket number cannot be empty"))]
    pub number: String,
    #[validate(length(min = 1, message = "Subject cannot be empty"))]
    pub subject: String,
    pub custodian_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CloseTicketRequest {
    pub actor_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct TicketSummary {
    pub id: Uuid,
    pub number: String,
    pub subject: String,
    pub status: String,
    pub custodian_id: Option<Uuid>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ticket::Model> for TicketSummary {
    fn from(model: ticket::Model) -> Self {
        Self {
            id: model.id,
            number: model.number,
            subject: model.subject,
            status: model.status,
            custodian_id: model.custodian_id,
            closed_at: model.closed_at,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CloseTicketResponse {
    pub ticket: TicketSummary,
    pub restoration: RestorationReport,
}

pub async fn create_ticket(
    State(state): State<AppState>,
    Json(payload): Json<CreateTicketRequest>,
) -> ApiResult<TicketSummary> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let created = state
        .ticket_service()
        .create_ticket(payload.number, payload.subject, payload.custodian_id)
        .await?;

    Ok(Json(ApiResponse::success(TicketSummary::from(created))))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<TicketSummary> {
    let model = state.ticket_service().get_ticket(id).await?;
    Ok(Json(ApiResponse::success(TicketSummary::from(model))))
}

pub async fn close_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CloseTicketRequest>,
) -> ApiResult<CloseTicketResponse> {
    let (ticket, restoration) = state
        .ticket_service()
        .close_ticket(id, payload.actor_id)
        .await?;

    Ok(Json(ApiResponse::success(CloseTicketResponse {
        ticket: TicketSummary::from(ticket),
        restoration,
    })))
}

pub async fn reopen_ticket(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<TicketSummary> {
    let model = state.ticket_service().reopen_ticket(id).await?;
    Ok(Json(ApiResponse::success(TicketSummary::from(model))))
}
