// HTTP surface: ISO 20022 in, ISO 20022 out

use axum::{
    extract::{MatchedPath, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::coordinator::{RenderedResponse, TransferFlowCoordinator};
use crate::error::GatewayError;
use crate::metrics::METRICS;
use crate::models::{CurrentState, TransferRequest, TransferState};

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<TransferFlowCoordinator>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub bus: String,
}

impl IntoResponse for RenderedResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, [(header::CONTENT_TYPE, self.content_type)], self.body).into_response()
    }
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "iso-gateway",
        version: env!("CARGO_PKG_VERSION"),
        bus: state.coordinator.registry().bus().name().to_string(),
    })
}

async fn metrics_handler() -> Result<String, GatewayError> {
    METRICS
        .export()
        .map_err(|e| GatewayError::System(format!("Failed to export metrics: {}", e)))
}

// Any supported document; routed on its namespace
async fn handle_inbound(State(state): State<AppState>, body: String) -> RenderedResponse {
    state.coordinator.process_inbound(&body).await
}

// pacs.008 - FI to FI Customer Credit Transfer
async fn handle_pacs008(State(state): State<AppState>, body: String) -> RenderedResponse {
    info!("Received pacs.008 credit transfer");
    state.coordinator.process_credit_transfer(&body).await
}

// pacs.002 - FI to FI Payment Status Report (callback for outbound legs)
async fn handle_pacs002(State(state): State<AppState>, body: String) -> RenderedResponse {
    info!("Received pacs.002 status report");
    state.coordinator.process_status_report(&body).await
}

// camt.003 - Get Account
async fn handle_camt003(State(state): State<AppState>, body: String) -> RenderedResponse {
    info!("Received camt.003 account inquiry");
    state.coordinator.process_account_inquiry(&body).await
}

// Switch-initiated transfer: emits pacs.008 and waits for the pacs.002
async fn handle_outbound_transfer(
    State(state): State<AppState>,
    Json(request): Json<TransferRequest>,
) -> (StatusCode, Json<TransferState>) {
    info!(home_transaction_id = %request.home_transaction_id, "Received outbound transfer");
    let result = state.coordinator.initiate_credit_transfer(request).await;

    let status = match (&result.current_state, &result.last_error) {
        (CurrentState::Completed, _) => StatusCode::OK,
        (_, Some(info)) => StatusCode::from_u16(info.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        (_, None) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(result))
}

async fn track_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    METRICS
        .http_requests_total
        .with_label_values(&[route.as_str(), response.status().as_str()])
        .inc();
    METRICS
        .http_request_duration_seconds
        .with_label_values(&[route.as_str()])
        .observe(start.elapsed().as_secs_f64());
    response
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/iso20022", post(handle_inbound))
        .route("/iso20022/pacs.008", post(handle_pacs008))
        .route("/iso20022/pacs.002", post(handle_pacs002))
        .route("/iso20022/camt.003", post(handle_camt003))
        .route("/transfers", post(handle_outbound_transfer))
        .route_layer(middleware::from_fn(track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
