use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};

use fieldtrack_api::{
    config, db,
    errors::AppError,
    events::{self, EventSender},
    handlers::AppServices,
    locks::ResourceLockRegistry,
    services::{
        field_reports::FieldReportService, resource_lifecycle::ResourceLifecycleService,
        restoration::RestorationService, tickets::TicketService,
    },
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = config::load_config()
        .map_err(|e| AppError::ConfigError(format!("Failed to load configuration: {}", e)))?;

    config::init_tracing(&config.log_level, config.log_json);

    info!(
        environment = %config.environment,
        "Starting fieldtrack-api v{}",
        env!("CARGO_PKG_VERSION")
    );

    let db_pool = Arc::new(db::establish_connection_from_app_config(&config).await?);

    if config.auto_migrate {
        db::run_migrations(&db_pool).await?;
    }

    let (event_tx, event_rx) = mpsc::channel(1000);
    let event_sender = EventSender::new(event_tx);

    tokio::spawn(async move {
        events::process_events(event_rx).await;
    });

    let locks = ResourceLockRegistry::new();

    let resources =
        ResourceLifecycleService::new(db_pool.clone(), event_sender.clone(), locks.clone());
    let restoration =
        RestorationService::new(db_pool.clone(), event_sender.clone(), locks.clone());
    let tickets = TicketService::new(db_pool.clone(), event_sender.clone(), restoration.clone());
    let field_reports = FieldReportService::new(
        db_pool.clone(),
        event_sender.clone(),
        resources.clone(),
        restoration.clone(),
    );

    let state = AppState {
        db: db_pool.clone(),
        config: config.clone(),
        event_sender,
        services: AppServices {
            resources,
            restoration,
            tickets,
            field_reports,
        },
    };

    let app = fieldtrack_api::app_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(Duration::from_secs(30)))
            .layer(CorsLayer::permissive()),
    );

    let addr = format!("{}:{}", config.host, config.port);
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::ConfigError(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::ConfigError(format!("Server error: {}", e)))?;

    info!("Shutting down, closing database pool");
    if let Err(e) = db::close_pool((*db_pool).clone()).await {
        error!("Failed to close database pool cleanly: {}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
