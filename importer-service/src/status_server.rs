use std::net::SocketAddr;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use time::format_description::well_known::Rfc3339;
use tokio::sync::watch;

use crate::coordinator::{PollResult, RefreshHandle};

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(Clone)]
struct ServerState {
    latest: watch::Receiver<Option<PollResult>>,
    refresh: RefreshHandle,
}

pub fn init(
    bind_addr: &str,
    latest: watch::Receiver<Option<PollResult>>,
    refresh: RefreshHandle,
) {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus metrics recorder");

    // Ignore error if the handle was already set; this should only be called once.
    let _ = PROM_HANDLE.set(handle);

    let addr: SocketAddr = bind_addr.parse().expect("invalid status bind address");

    let state = ServerState { latest, refresh };

    tokio::spawn(async move {
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/status", get(status_handler))
            .route("/refresh", post(refresh_handler))
            .with_state(state);

        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                    tracing::error!(error = %e, "status server error");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to bind status listener");
            }
        }
    });
}

async fn metrics_handler() -> String {
    PROM_HANDLE
        .get()
        .expect("Prometheus recorder not initialized")
        .render()
}

/// Read-only view of the coordinator's latest successful poll: the current
/// numeric state of the water meter plus auxiliary attributes.
async fn status_handler(State(state): State<ServerState>) -> Json<serde_json::Value> {
    let latest = state.latest.borrow().clone();

    let body = match latest {
        Some(result) => serde_json::json!({
            "latest_value": result.latest_value,
            "latest_time": result.latest_time.and_then(|t| t.format(&Rfc3339).ok()),
            "imported_count": result.imported_count,
        }),
        None => serde_json::json!({
            "latest_value": null,
            "latest_time": null,
            "imported_count": 0,
        }),
    };

    Json(body)
}

async fn refresh_handler(State(state): State<ServerState>) -> StatusCode {
    state.refresh.request();
    StatusCode::ACCEPTED
}
