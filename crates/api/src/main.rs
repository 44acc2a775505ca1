//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::routes::AppState;
use application::{PasswordHasher, Services, TokenService};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{InMemoryStore, PostgresStore, Store};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the store
    match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url, config.database_max_connections)
                .await
                .expect("failed to connect to PostgreSQL");
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL store");
            run(store, config, metrics_handle).await;
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            run(InMemoryStore::new(), config, metrics_handle).await;
        }
    }
}

async fn run<S: Store>(store: S, config: Config, metrics_handle: PrometheusHandle) {
    // 4. Wire the services
    let services = Services::new(
        store,
        config.settings(),
        PasswordHasher::default(),
        TokenService::new(&config.jwt_secret, config.jwt_ttl()),
    );

    // 5. Make sure an admin exists
    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        match services.identity.bootstrap_admin(email, password).await {
            Ok(Some(admin)) => tracing::info!(user_id = %admin.id, "admin account created"),
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "admin bootstrap failed"),
        }
    }

    // 6. Start the background sweeper
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = services.sweeper(config.purge_interval).spawn(shutdown_rx);

    // 7. Build the application
    let state = Arc::new(AppState::new(services));
    let app = api::create_app(state, metrics_handle);

    // 8. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 9. Stop background work
    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        tracing::error!(error = %e, "sweeper task failed");
    }

    tracing::info!("server shut down gracefully");
}
