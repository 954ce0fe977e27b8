use amo_checkbox_bridge::{
    config::AppConfig, create_app_router, services::shift_maintenance_service::ShiftMaintenanceService,
    state::AppState,
};
use anyhow::Result;
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let log_level = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|v| v.parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = AppConfig::from_env()?;
    let port = config.port;
    let app_state = Arc::new(AppState::new(config)?);
    info!(
        "Application state initialized ({} fiscal profile(s), {} courier account(s))",
        app_state.config.checkbox.profiles.len(),
        app_state.config.nova_poshta.accounts.len()
    );

    // Nightly shift close/open maintenance runs next to the webhook server.
    // The handle stays alive for the whole process lifetime.
    let _maintenance = match ShiftMaintenanceService::new(Arc::clone(&app_state)).await {
        Ok(service) => match service.start().await {
            Ok(()) => Some(service),
            Err(e) => {
                tracing::error!("Failed to start shift maintenance scheduler: {}", e);
                None
            }
        },
        Err(e) => {
            tracing::error!("Failed to create shift maintenance scheduler: {}", e);
            None
        }
    };

    let app = create_app_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
