//! Collaborator-facing HTTP API.
//!
//! Thin layer over [`BridgeEngine`]: every handler parses the request,
//! calls one engine operation, and maps the error taxonomy onto HTTP
//! statuses. No business logic lives here.

use axum::{
	body::Bytes,
	extract::{Path, Query, State},
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Json, Response},
	routing::{get, post, put},
	Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use bridge_client::ClientError;
use bridge_core::{BridgeEngine, BridgeError, SaveConfigRequest};
use bridge_orders::{MergeOutcome, OrderError};
use bridge_sync::SyncError;
use bridge_types::{OrderAction, OrderBucket};

const SIGNATURE_HEADER: &str = "x-bridge-signature";

pub async fn start_http_server(engine: Arc<BridgeEngine>, port: u16) -> anyhow::Result<()> {
	let state = AppState { engine };

	let app = Router::new()
		.route("/health", get(health_check))
		.route("/status", get(get_status))
		.route("/config", get(get_config).put(save_config))
		.route("/orders", get(list_orders))
		.route("/orders/{id}", get(get_order))
		.route("/orders/{id}/action", post(perform_action))
		.route("/orders/{id}/advance", post(advance_order))
		.route("/sync", post(sync_now))
		.route("/mappings", get(list_mappings).post(create_mapping))
		.route("/webhook", post(ingest_webhook))
		.with_state(state)
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive());

	let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
	info!("API server listening on port {}", port);
	axum::serve(listener, app).await?;
	Ok(())
}

#[derive(Clone)]
struct AppState {
	engine: Arc<BridgeEngine>,
}

/// Wrapper so engine errors map onto HTTP responses at one place.
struct ApiError(BridgeError);

impl From<BridgeError> for ApiError {
	fn from(e: BridgeError) -> Self {
		Self(e)
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let (status, kind) = error_kind(&self.0);
		let body = Json(serde_json::json!({
			"error": { "kind": kind, "message": self.0.to_string() }
		}));
		(status, body).into_response()
	}
}

fn error_kind(error: &BridgeError) -> (StatusCode, &'static str) {
	match error {
		BridgeError::Validation(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
		BridgeError::WebhookDisabled => (StatusCode::NOT_FOUND, "webhook_disabled"),
		BridgeError::Builder(_) | BridgeError::Config(_) => {
			(StatusCode::INTERNAL_SERVER_ERROR, "configuration_error")
		}
		BridgeError::Auth(_) => (StatusCode::UNAUTHORIZED, "auth_error"),
		BridgeError::Client(e) => client_error_kind(e),
		BridgeError::Order(e) => order_error_kind(e),
		BridgeError::Sync(e) => sync_error_kind(e),
		BridgeError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
	}
}

fn client_error_kind(error: &ClientError) -> (StatusCode, &'static str) {
	match error {
		ClientError::NotConfigured(_) => (StatusCode::CONFLICT, "not_configured"),
		ClientError::Auth(_) => (StatusCode::UNAUTHORIZED, "auth_error"),
		ClientError::Timeout | ClientError::Network(_) | ClientError::Transient { .. } => {
			(StatusCode::BAD_GATEWAY, "transient_error")
		}
		ClientError::Platform { .. } => (StatusCode::BAD_GATEWAY, "platform_error"),
		ClientError::UnknownStatus(_) => (StatusCode::BAD_GATEWAY, "unknown_status"),
		ClientError::Deserialize(_) => (StatusCode::BAD_GATEWAY, "platform_error"),
	}
}

fn order_error_kind(error: &OrderError) -> (StatusCode, &'static str) {
	match error {
		OrderError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
		OrderError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
		OrderError::StaleOrder => (StatusCode::GONE, "stale_order"),
		OrderError::Client(e) => client_error_kind(e),
		OrderError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
	}
}

fn sync_error_kind(error: &SyncError) -> (StatusCode, &'static str) {
	match error {
		SyncError::StaleOrder => (StatusCode::GONE, "stale_order"),
		SyncError::AlreadyRunning => (StatusCode::CONFLICT, "sync_in_flight"),
		SyncError::InvalidSignature => (StatusCode::UNAUTHORIZED, "invalid_signature"),
		SyncError::Payload(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
		SyncError::UnknownStatus(_) => (StatusCode::BAD_GATEWAY, "unknown_status"),
		SyncError::Client(e) => client_error_kind(e),
		SyncError::Order(e) => order_error_kind(e),
		SyncError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
	}
}

async fn health_check() -> Json<serde_json::Value> {
	Json(serde_json::json!({
		"status": "ok",
		"timestamp": chrono::Utc::now().timestamp()
	}))
}

async fn get_status(State(state): State<AppState>) -> Result<Response, ApiError> {
	let status = state.engine.get_status().await?;
	Ok(Json(status).into_response())
}

async fn get_config(State(state): State<AppState>) -> Result<Response, ApiError> {
	match state.engine.get_config().await? {
		Some(view) => Ok(Json(view).into_response()),
		None => Ok((
			StatusCode::NOT_FOUND,
			Json(serde_json::json!({
				"error": { "kind": "not_configured", "message": "no integration configured" }
			})),
		)
			.into_response()),
	}
}

async fn save_config(
	State(state): State<AppState>,
	Json(request): Json<SaveConfigRequest>,
) -> Result<Response, ApiError> {
	let view = state.engine.save_config(request).await?;
	Ok(Json(view).into_response())
}

#[derive(Deserialize)]
struct ListOrdersQuery {
	bucket: Option<String>,
}

async fn list_orders(
	State(state): State<AppState>,
	Query(query): Query<ListOrdersQuery>,
) -> Result<Response, ApiError> {
	let bucket = match query.bucket.as_deref() {
		None => OrderBucket::Active,
		Some(raw) => raw
			.parse::<OrderBucket>()
			.map_err(BridgeError::Validation)?,
	};
	let orders = state.engine.list_orders(bucket).await?;
	Ok(Json(serde_json::json!({ "orders": orders })).into_response())
}

async fn get_order(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
) -> Result<Response, ApiError> {
	let order = state.engine.get_order(&order_id).await?;
	Ok(Json(order).into_response())
}

#[derive(Deserialize)]
struct ActionRequest {
	action: String,
}

async fn perform_action(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
	Json(request): Json<ActionRequest>,
) -> Result<Response, ApiError> {
	let action = request
		.action
		.parse::<OrderAction>()
		.map_err(BridgeError::Validation)?;
	let outcome = state.engine.perform_action(&order_id, action).await?;

	let status = if outcome.is_async {
		StatusCode::ACCEPTED
	} else {
		StatusCode::OK
	};
	Ok((
		status,
		Json(serde_json::json!({
			"order_id": order_id,
			"action": action,
			"is_async": outcome.is_async,
			"noop": outcome.noop
		})),
	)
		.into_response())
}

async fn advance_order(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
) -> Result<Response, ApiError> {
	let outcome = state.engine.advance_order(&order_id).await?;

	let status = if outcome.is_async {
		StatusCode::ACCEPTED
	} else {
		StatusCode::OK
	};
	Ok((
		status,
		Json(serde_json::json!({
			"order_id": order_id,
			"is_async": outcome.is_async,
			"noop": outcome.noop
		})),
	)
		.into_response())
}

async fn sync_now(State(state): State<AppState>) -> Result<Response, ApiError> {
	let merged = state.engine.sync_now().await?;
	Ok(Json(serde_json::json!({ "merged": merged })).into_response())
}

async fn list_mappings(State(state): State<AppState>) -> Result<Response, ApiError> {
	let mappings = state.engine.product_mappings().await?;
	Ok(Json(serde_json::json!({ "mappings": mappings })).into_response())
}

#[derive(Deserialize)]
struct CreateMappingRequest {
	remote_product_id: String,
	sku: Option<String>,
	local_product_id: String,
}

async fn create_mapping(
	State(state): State<AppState>,
	Json(request): Json<CreateMappingRequest>,
) -> Result<Response, ApiError> {
	let mapping = state
		.engine
		.create_mapping(
			&request.remote_product_id,
			request.sku.as_deref(),
			&request.local_product_id,
		)
		.await?;
	Ok((StatusCode::CREATED, Json(mapping)).into_response())
}

async fn ingest_webhook(
	State(state): State<AppState>,
	headers: HeaderMap,
	body: Bytes,
) -> Result<Response, ApiError> {
	let signature = headers
		.get(SIGNATURE_HEADER)
		.and_then(|value| value.to_str().ok());
	let outcome = state.engine.ingest_webhook(&body, signature).await?;

	let result = match outcome {
		MergeOutcome::Inserted => "inserted",
		MergeOutcome::Advanced { .. } => "advanced",
		MergeOutcome::Unchanged => "unchanged",
		MergeOutcome::Ignored => "ignored",
	};
	Ok(Json(serde_json::json!({ "result": result })).into_response())
}
