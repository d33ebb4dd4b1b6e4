//! FieldTrack API Library
//!
//! Machine lifecycle backend for field service management: a resource state
//! machine, an append-only movement ledger, and the restoration protocol
//! that undoes movements when their triggering ticket or field report goes
//! away.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod ledger;
pub mod locks;
pub mod migrator;
pub mod services;

use axum::{
    response::Json,
    routing::{delete, get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn resource_service(&self) -> &services::resource_lifecycle::ResourceLifecycleService {
        &self.services.resources
    }

    pub fn restoration_service(&self) -> &services::restoration::RestorationService {
        &self.services.restoration
    }

    pub fn ticket_service(&self) -> &services::tickets::TicketService {
        &self.services.tickets
    }

    pub fn field_report_service(&self) -> &services::field_reports::FieldReportService {
        &self.services.field_reports
    }
}

// Common response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// All business routes, mounted under `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    let resources = Router::new()
        .route("/resources", post(handlers::resources::create_resource))
        .route("/resources/:id", get(handlers::resources::get_resource))
        .route(
            "/resources/:id",
            delete(handlers::resources::delete_resource),
        )
        .route(
            "/resources/:id/movements",
            get(handlers::resources::get_resource_movements),
        )
        .route(
            "/resources/:id/assign",
            post(handlers::resources::assign_resource),
        )
        .route(
            "/resources/:id/loan",
            post(handlers::resources::loan_resource),
        )
        .route(
            "/resources/:id/return",
            post(handlers::resources::return_resource),
        )
        .route(
            "/resources/:id/repair",
            post(handlers::resources::send_resource_to_repair),
        )
        .route(
            "/resources/:id/repair-complete",
            post(handlers::resources::complete_resource_repair),
        )
        .route(
            "/resources/:id/activate",
            post(handlers::resources::activate_resource),
        )
        .route(
            "/resources/:id/restore",
            post(handlers::resources::restore_resource_status),
        );

    let tickets = Router::new()
        .route("/tickets", post(handlers::tickets::create_ticket))
        .route("/tickets/:id", get(handlers::tickets::get_ticket))
        .route("/tickets/:id/close", post(handlers::tickets::close_ticket))
        .route(
            "/tickets/:id/reopen",
            post(handlers::tickets::reopen_ticket),
        );

    let field_reports = Router::new()
        .route(
            "/field-reports",
            post(handlers::field_reports::create_report),
        )
        .route(
            "/field-reports/:id",
            get(handlers::field_reports::get_report),
        )
        .route(
            "/field-reports/:id",
            delete(handlers::field_reports::delete_report),
        )
        .route(
            "/field-reports/:id/operations",
            post(handlers::field_reports::apply_report_operations),
        );

    let restorations = Router::new().route(
        "/restorations",
        post(handlers::restorations::restore_by_causal_ref),
    );

    Router::new()
        .merge(resources)
        .merge(tickets)
        .merge(field_reports)
        .merge(restorations)
}

/// Full application router: business routes plus health probes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes())
        .nest("/health", handlers::health::health_routes())
        .with_state(state)
}
