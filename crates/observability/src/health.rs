//! Health-Check-Endpunkt fuer den Konferenz-Server
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Engine-Zustand

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub gestartet: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub engine_running: bool,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    pub gestartet: DateTime<Utc>,
    pub engine_laeuft: Arc<AtomicBool>,
}

impl HealthState {
    pub fn neu() -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            gestartet: Utc::now(),
            engine_laeuft: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn engine_laeuft(&self) -> bool {
        self.engine_laeuft.load(Ordering::Relaxed)
    }

    pub fn engine_status_setzen(&self, laeuft: bool) {
        self.engine_laeuft.store(laeuft, Ordering::Relaxed);
    }

    fn antwort(&self) -> (StatusCode, HealthResponse) {
        let engine_running = self.engine_laeuft();
        let (http_status, status) = if engine_running {
            (StatusCode::OK, HealthStatus::Healthy)
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, HealthStatus::Unhealthy)
        };
        let response = HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            gestartet: self.gestartet,
            uptime_seconds: self.uptime_seconds(),
            engine_running,
        };
        (http_status, response)
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::neu()
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let (http_status, response) = state.antwort();
    (http_status, Json(response))
}
