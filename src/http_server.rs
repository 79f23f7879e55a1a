use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::{io, sync::Arc};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::refresh::{RefreshError, ZoneRefresher};
use crate::zone::ZoneDocument;

/// Control plane failures, each mapped to an HTTP status
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Auth failed: incorrect key")]
    Unauthorized,
    #[error("Error parsing JSON zones: {0}")]
    BadDocument(String),
    #[error(transparent)]
    Refresh(#[from] RefreshError),
}

impl ControlError {
    fn status(&self) -> StatusCode {
        match self {
            ControlError::Unauthorized => StatusCode::FORBIDDEN,
            ControlError::BadDocument(_) => StatusCode::BAD_REQUEST,
            ControlError::Refresh(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            status,
            Json(json!({
                "status": "error",
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}

/// HTTP server for zone pushes, refresh triggers and diagnostics
pub struct HttpServer {
    refresher: Arc<ZoneRefresher>,
    api_key: Option<String>,
}

impl HttpServer {
    pub fn new(refresher: Arc<ZoneRefresher>, api_key: Option<String>) -> Self {
        Self { refresher, api_key }
    }

    pub fn router(self) -> Router {
        if self.api_key.is_none() {
            warn!("No control plane key configured; protected endpoints will reject every request");
        }
        let state = AppState {
            refresher: self.refresher,
            api_key: self.api_key.map(Arc::from),
        };

        Router::new()
            .route("/health", get(health_check))
            .route("/notify", get(notify).post(notify))
            .route("/notify/zones", post(push_zones))
            .route("/hits", get(hits))
            .route("/zones", get(dump_zones))
            .with_state(state)
            .layer(CorsLayer::permissive())
    }

    /// Serve on an already bound listener until the shutdown signal fires.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> io::Result<()> {
        info!("Control plane listening on {}", listener.local_addr()?);
        let app = self.router();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Control plane received shutdown signal");
            })
            .await
    }
}

#[derive(Clone)]
struct AppState {
    refresher: Arc<ZoneRefresher>,
    api_key: Option<Arc<str>>,
}

#[derive(Debug, Deserialize)]
struct KeyParam {
    key: Option<String>,
}

impl AppState {
    fn authorize(&self, params: &KeyParam) -> Result<(), ControlError> {
        match (&self.api_key, &params.key) {
            (Some(expected), Some(given)) if expected.as_ref() == given.as_str() => Ok(()),
            _ => {
                warn!("Rejected control plane request with missing or incorrect key");
                Err(ControlError::Unauthorized)
            }
        }
    }
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let zones = state.refresher.zone_store().zone_count();
    (StatusCode::OK, Json(json!({"status": "healthy", "zones": zones})))
}

/// Full refresh from the configured zone source
async fn notify(
    State(state): State<AppState>,
    Query(params): Query<KeyParam>,
) -> Result<&'static str, ControlError> {
    state.authorize(&params)?;
    match state.refresher.refresh().await {
        Ok(stats) => {
            info!("Zone refresh on notify complete: {}", stats);
            Ok("ok\n")
        }
        Err(e) => {
            error!("Zone refresh on notify failed: {}", e);
            Err(e.into())
        }
    }
}

/// Partial apply of the pushed apexes
async fn push_zones(
    State(state): State<AppState>,
    Query(params): Query<KeyParam>,
    body: Bytes,
) -> Result<String, ControlError> {
    state.authorize(&params)?;
    let document: ZoneDocument =
        serde_json::from_slice(&body).map_err(|e| ControlError::BadDocument(e.to_string()))?;

    let stats = state.refresher.apply_push(document).await;
    info!("Pushed zones applied: {}", stats);
    Ok(format!("Loaded {} zones into cache\nok\n", stats.zones))
}

async fn hits(
    State(state): State<AppState>,
    Query(params): Query<KeyParam>,
) -> Result<impl IntoResponse, ControlError> {
    state.authorize(&params)?;
    Ok(Json(state.refresher.zone_store().hits()))
}

async fn dump_zones(
    State(state): State<AppState>,
    Query(params): Query<KeyParam>,
) -> Result<impl IntoResponse, ControlError> {
    state.authorize(&params)?;
    Ok(Json(state.refresher.zone_store().snapshot().to_document()))
}
