use qubic_server::env::Config;
use qubic_server::routes;
use qubic_server::state::AppState;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often lapsed sessions get swept out.
const SESSION_SWEEP_INTERVAL: tokio::time::Duration = tokio::time::Duration::from_secs(1200);

#[tokio::main]
/// Activates tracing, loads the environment, hydrates the summary cache,
/// spawns the session sweeper and serves the API on port 8000.
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(%err, "Configuration error.");
            panic!("Configuration error: {err}");
        }
    };
    if let Err(err) = config.ensure_paths() {
        tracing::error!(%err, "Could not create resource paths.");
        panic!("Could not create resource paths: {err}");
    }

    let app_state = match AppState::initialize(config).await {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(%err, "Initial load error.");
            panic!("Initial load error: {err}");
        }
    };

    let sweeper_state = app_state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = sweeper_state.sessions.sweep_expired();
            if removed > 0 {
                tracing::info!(removed, "Swept expired sessions");
            }
        }
    });

    let app = routes::router(app_state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8000")
        .await
        .unwrap();
    tracing::info!("Listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
