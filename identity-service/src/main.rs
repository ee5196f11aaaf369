use identity_service::{
    build_router,
    config::IdentityConfig,
    db::{CredentialStore, MongoCredentialStore},
    services::{
        bootstrap, EmailChannel, NotificationChannels, RoutePermissionTable, SmsChannel,
    },
    AppState,
};
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = IdentityConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    identity_service::services::metrics::init_metrics()?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    let route_table = RoutePermissionTable::load(config.route_permissions_path.as_deref())?;

    tracing::info!("Initializing credential store");
    let mongo = MongoCredentialStore::connect(&config.mongodb.uri, &config.mongodb.database)
        .await?;
    mongo.initialize_indexes().await?;
    let store: Arc<dyn CredentialStore> = Arc::new(mongo);
    tracing::info!("Credential store initialized successfully");

    let report = bootstrap(&store, &route_table, &config.roles).await?;
    tracing::info!(
        permissions_created = report.permissions_created,
        admin_promoted = report.admin_promoted,
        "Roles and permissions seeded"
    );

    let channels = NotificationChannels::new(
        Arc::new(EmailChannel::new(&config.smtp)?),
        Arc::new(SmsChannel::new(config.sms.clone())?),
    );
    tracing::info!(sms_enabled = config.sms.enabled, "Notification channels initialized");

    let state = AppState::new(config.clone(), store, channels)?;
    let app = build_router(state).await?;

    let addr = config.common.bind_address()?;

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
