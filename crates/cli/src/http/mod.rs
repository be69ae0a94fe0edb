//! HTTP surface: ingestion, latest-position query and live subscriptions.
//!
//! | Route               | Purpose                                   |
//! |---------------------|-------------------------------------------|
//! | `POST /telemetry`   | publish one record onto the stream        |
//! | `GET /vehicles/{id}`| latest stored record of a vehicle         |
//! | `GET /ws`           | WebSocket feed of every distributed record|

mod ws;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, Request, State, WebSocketUpgrade};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use contracts::{IngestResponse, Record, RecordStore};
use dispatcher::SubscriberRegistry;
use ingestion::{Ingestor, MemoryBroker};
use serde::Deserialize;
use store::AnyStore;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shared state of every handler
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Arc<Ingestor<MemoryBroker>>,
    pub store: Arc<AnyStore>,
    pub registry: Arc<SubscriberRegistry>,
    /// Fires when the server stops; ends every subscriber read loop
    pub shutdown: CancellationToken,
    pub ingested: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(
        ingestor: Arc<Ingestor<MemoryBroker>>,
        store: Arc<AnyStore>,
        registry: Arc<SubscriberRegistry>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            ingestor,
            store,
            registry,
            shutdown,
            ingested: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records accepted by the ingestion endpoint so far
    pub fn ingested(&self) -> u64 {
        self.ingested.load(Ordering::Relaxed)
    }
}

/// Body of `POST /telemetry`; `observed_at` defaults to the receive time.
#[derive(Debug, Deserialize)]
struct TelemetryRequest {
    vehicle_id: String,
    latitude: f64,
    longitude: f64,
    speed: f64,
    engine_temp: f64,
    #[serde(default)]
    observed_at: Option<DateTime<Utc>>,
}

impl From<TelemetryRequest> for Record {
    fn from(req: TelemetryRequest) -> Self {
        Record {
            vehicle_id: req.vehicle_id,
            latitude: req.latitude,
            longitude: req.longitude,
            speed: req.speed,
            engine_temp: req.engine_temp,
            observed_at: req.observed_at.unwrap_or_else(Utc::now),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/telemetry", post(ingest))
        .route("/vehicles/{id}", get(latest_position))
        .route("/ws", get(subscribe))
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

/// Serve until `shutdown` fires, then wait for open connections to finish.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "HTTP server listening");
    }
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
}

async fn ingest(State(state): State<AppState>, body: Bytes) -> Response {
    let request: TelemetryRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Malformed telemetry body");
            observability::record_ingest(false);
            return (
                StatusCode::BAD_REQUEST,
                Json(IngestResponse::rejected(format!("invalid body: {e}"))),
            )
                .into_response();
        }
    };

    let record = Record::from(request);
    if let Err(e) = record.validate() {
        observability::record_ingest(false);
        return (
            StatusCode::BAD_REQUEST,
            Json(IngestResponse::rejected(e.to_string())),
        )
            .into_response();
    }

    let response = state.ingestor.ingest(record).await;
    observability::record_ingest(response.success);
    if response.success {
        state.ingested.fetch_add(1, Ordering::Relaxed);
        (StatusCode::OK, Json(response)).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response)).into_response()
    }
}

async fn latest_position(
    State(state): State<AppState>,
    Path(vehicle_id): Path<String>,
) -> Response {
    match state.store.latest(&vehicle_id).await {
        Ok(Some(stored)) => {
            observability::record_query(true);
            (StatusCode::OK, Json(stored)).into_response()
        }
        Ok(None) => {
            observability::record_query(false);
            (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": "Vehicle Not Found" })),
            )
                .into_response()
        }
        Err(e) => {
            error!(vehicle_id = %vehicle_id, error = %e, "Latest position query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn subscribe(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    if state.shutdown.is_cancelled() {
        warn!(peer = %peer, "Subscription refused during shutdown");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.on_upgrade(move |socket| ws::serve_subscriber(socket, peer, state.registry, state.shutdown))
}

/// Any-origin CORS for browser dashboards.
async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}
