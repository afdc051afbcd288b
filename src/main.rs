use std::{net::Ipv4Addr, process::ExitCode, sync::Arc};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tasklet::{auth::now_millis, create_app, db, AppState};

struct Config {
    port: u16,
    db_path: String,
    base_path: String,
}

impl Config {
    fn from_env() -> Result<Self, String> {
        let port = std::env::var("TASKLET_PORT")
            .map_err(|_| "TASKLET_PORT must be set".to_string())?
            .parse()
            .map_err(|e| format!("TASKLET_PORT is not a port number: {e}"))?;

        let db_path = std::env::var("TASKLET_DB").unwrap_or_else(|_| "tasklet.db".to_string());

        let base_path = std::env::var("TASKLET_BASE_PATH")
            .ok()
            .map(|path| normalize_base_path(&path))
            .unwrap_or_default();

        Ok(Config {
            port,
            db_path,
            base_path,
        })
    }
}

fn normalize_base_path(path: &str) -> String {
    let path = path.trim_end_matches('/');
    if path.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let db = match db::init_db(&config.db_path) {
        Ok(db) => db,
        Err(e) => {
            error!(path = %config.db_path, "initializing database: {e}");
            return ExitCode::FAILURE;
        }
    };
    match db::cleanup_expired_sessions(&db, now_millis()) {
        Ok(removed) => info!(removed, "Purged expired sessions"),
        Err(e) => error!("purging expired sessions: {e}"),
    }

    let state = AppState {
        db,
        base_path: Arc::new(config.base_path),
    };
    let app = create_app(state);
    let addr = (Ipv4Addr::UNSPECIFIED, config.port);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("binding to port {}: {e}", config.port);
            return ExitCode::FAILURE;
        }
    };

    info!("running on {addr:?}");

    if let Err(e) = axum::serve(listener, app).await {
        error!("failed serving: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
