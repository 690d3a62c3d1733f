use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    invocation_log_path: PathBuf,
}

impl HealthState {
    pub fn new(invocation_log_path: impl Into<PathBuf>) -> Self {
        Self { invocation_log_path: invocation_log_path.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub invocation_log: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, state: HealthState) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let invocation_log = invocation_log_check(&state.invocation_log_path).await;
    let ready = invocation_log.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "querybot-server runtime initialized".to_string(),
        },
        invocation_log,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn invocation_log_check(path: &Path) -> HealthCheck {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => {
            return degraded(format!("{} is a directory", path.display()));
        }
        Ok(meta) if meta.permissions().readonly() => {
            return degraded(format!("{} is read-only", path.display()));
        }
        Ok(_) => return ready(format!("{} is writable", path.display())),
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(error) => return degraded(format!("{}: {error}", path.display())),
    }

    // The file is created on first write; its nearest existing ancestor decides.
    let mut ancestor = path.parent();
    while let Some(dir) = ancestor.filter(|dir| !dir.as_os_str().is_empty()) {
        match tokio::fs::metadata(dir).await {
            Ok(meta) if !meta.is_dir() => {
                return degraded(format!("{} is not a directory", dir.display()));
            }
            Ok(meta) if meta.permissions().readonly() => {
                return degraded(format!("{} is read-only", dir.display()));
            }
            Ok(_) => return ready(format!("{} will be created on first write", path.display())),
            Err(_) => ancestor = dir.parent(),
        }
    }

    ready(format!("{} will be created in the working directory", path.display()))
}

fn ready(detail: String) -> HealthCheck {
    HealthCheck { status: "ready", detail }
}

fn degraded(detail: String) -> HealthCheck {
    HealthCheck { status: "degraded", detail }
}
