use axum::http::{HeaderValue, Method};
use kyrat_api::{config, db, events, AppState};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_config = match config::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    config::init_tracing(app_config.log_level(), app_config.log_json);
    info!(
        environment = %app_config.environment,
        "starting {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let pool = db::establish_connection_from_app_config(&app_config).await?;
    if app_config.auto_migrate {
        db::run_migrations(&pool).await?;
    }

    let (event_tx, event_rx) = mpsc::channel(app_config.event_channel_capacity);
    tokio::spawn(events::process_events(event_rx));

    let cors = build_cors_layer(&app_config);
    let addr = format!("{}:{}", app_config.host, app_config.port);

    let state = AppState::new(
        Arc::new(pool),
        Arc::new(app_config),
        events::EventSender::new(event_tx),
    );
    let app = kyrat_api::create_router(state)
        .layer(cors)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    let listener = TcpListener::bind(&addr).await?;
    info!("listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

fn build_cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter_map(|origin| {
            let trimmed = origin.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = trimmed, "ignoring unparseable CORS origin");
                    None
                }
            }
        })
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    if !origins.is_empty() {
        layer.allow_origin(AllowOrigin::list(origins))
    } else if cfg.should_allow_permissive_cors() {
        layer.allow_origin(Any)
    } else {
        // Config validation requires explicit origins outside development,
        // so this arm only triggers when every entry failed to parse.
        error!("no usable CORS origins configured, denying cross-origin requests");
        layer
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!("failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
