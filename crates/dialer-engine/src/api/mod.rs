//! REST API for the dialer engine
//!
//! Thin JSON handlers over [`DialerEngine`]. Every handler returns
//! `Result<_, AppError>`; [`AppError`] maps the engine's error taxonomy onto
//! HTTP status codes with a `{"error": {"code", "message"}}` body.

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::dashboard::ListDashboard;
use crate::disposition::{DispositionOutcome, DispositionRequest};
use crate::engine::DialerEngine;
use crate::error::DialerError;
use crate::population::{AddItemsResult, RefreshResult};
use crate::types::{
    CadenceType, CallList, CallListDisposition, CallListItem, CallLog, CallOutcome, CallSession, ItemStatus, NewCallList,
    NewCallListItem, NewDisposition,
};

/// Default page size for item listings
const DEFAULT_ITEM_LIMIT: i64 = 100;

// API State
#[derive(Clone)]
pub struct ApiState {
    pub engine: DialerEngine,
}

// Request/Response types
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct ItemQuery {
    #[serde(default)]
    pub status: Option<ItemStatus>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AgentRequest {
    pub agent_id: String,
}

#[derive(Debug, Serialize)]
pub struct NextItemResponse {
    pub item: Option<CallListItem>,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub agent_id: String,
    #[serde(default)]
    pub sync_owner: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddItemsRequest {
    #[serde(default)]
    pub record_ids: Vec<String>,
    #[serde(default)]
    pub items: Vec<NewCallListItem>,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub target_list_id: String,
}

#[derive(Debug, Serialize)]
pub struct MoveResponse {
    pub item: CallListItem,
}

#[derive(Debug, Deserialize)]
pub struct DispositionBody {
    pub code: String,
    pub agent_id: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub callback_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub call_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub talk_time_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub user_id: String,
    #[serde(default)]
    pub list_id: Option<String>,
    #[serde(default = "default_dialer_mode")]
    pub dialer_mode: CadenceType,
}

fn default_dialer_mode() -> CadenceType {
    CadenceType::Preview
}

#[derive(Debug, Deserialize)]
pub struct EndSessionRequest {
    #[serde(default = "default_end_reason")]
    pub reason: String,
}

fn default_end_reason() -> String {
    "agent_logout".to_string()
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct ActiveSessionResponse {
    pub session: Option<CallSession>,
}

#[derive(Debug, Serialize)]
pub struct SeedResponse {
    pub lists_inserted: usize,
    pub dispositions_inserted: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
}

// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Create the REST API router
pub fn create_router(engine: DialerEngine) -> Router {
    create_router_with_state(ApiState { engine })
}

pub fn create_router_with_state(state: ApiState) -> Router {
    Router::new()
        // Lists
        .route("/lists", get(list_lists).post(create_list))
        .route("/lists/:id", get(get_list))
        .route("/lists/:id/deactivate", post(deactivate_list))
        .route("/lists/:id/refresh", post(refresh_list))
        .route("/lists/:id/next", post(next_item))
        .route("/lists/:id/items", get(list_items).post(add_items))
        .route("/lists/:id/dispositions", get(list_catalog))
        .route("/lists/:id/calls", get(list_calls))
        // Items
        .route("/items/:id", get(get_item))
        .route("/items/:id/release", post(release_item))
        .route("/items/:id/skip", post(skip_item))
        .route("/items/:id/assign", post(assign_item))
        .route("/items/:id/remove", post(remove_item))
        .route("/items/:id/move", post(move_item))
        .route("/items/:id/disposition", post(apply_disposition))
        .route("/items/:id/calls", get(item_calls))
        // Dispositions
        .route("/dispositions", get(global_catalog).post(create_disposition))
        .route("/dispositions/:id", get(get_disposition))
        .route("/dispositions/:id/deactivate", post(deactivate_disposition))
        // Sessions
        .route("/sessions", get(active_session).post(start_session))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/end", post(end_session))
        .route("/sessions/:id/pause", post(toggle_pause))
        .route("/sessions/:id/stats", post(update_stats))
        // Dashboard
        .route("/dashboard", get(overview))
        .route("/dashboard/:list_id", get(list_dashboard))
        // Seeds and health
        .route("/seed", post(seed))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// List handlers

async fn list_lists(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CallList>>, AppError> {
    Ok(Json(state.engine.rules().list_lists(query.active_only).await?))
}

async fn create_list(
    State(state): State<ApiState>,
    Json(req): Json<NewCallList>,
) -> Result<(StatusCode, Json<CallList>), AppError> {
    let list = state.engine.create_call_list(req).await?;
    Ok((StatusCode::CREATED, Json(list)))
}

async fn get_list(State(state): State<ApiState>, Path(id): Path<String>) -> Result<Json<CallList>, AppError> {
    Ok(Json(state.engine.rules().get_list(&id).await?))
}

async fn deactivate_list(State(state): State<ApiState>, Path(id): Path<String>) -> Result<StatusCode, AppError> {
    state.engine.deactivate_list(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn refresh_list(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<RefreshResult>, AppError> {
    Ok(Json(state.engine.refresh_dynamic_list(&id).await?))
}

async fn next_item(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<AgentRequest>,
) -> Result<Json<NextItemResponse>, AppError> {
    let item = state.engine.get_next_call_item(&id, &req.agent_id).await?;
    Ok(Json(NextItemResponse { item }))
}

async fn list_items(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<ItemQuery>,
) -> Result<Json<Vec<CallListItem>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_ITEM_LIMIT).clamp(1, 1000);
    Ok(Json(state.engine.list_items(&id, query.status, limit).await?))
}

async fn add_items(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<AddItemsRequest>,
) -> Result<Json<AddItemsResult>, AppError> {
    if req.record_ids.is_empty() && req.items.is_empty() {
        return Err(DialerError::validation("provide record_ids or items").into());
    }

    let mut result = state.engine.add_records_to_list(&id, &req.record_ids).await?;
    if !req.items.is_empty() {
        let explicit = state.engine.add_items_to_list(&id, req.items).await?;
        result.added.extend(explicit.added);
        result.skipped_existing += explicit.skipped_existing;
        result.skipped_no_phone += explicit.skipped_no_phone;
    }
    Ok(Json(result))
}

async fn list_catalog(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<CallListDisposition>>, AppError> {
    let catalog = state.engine.rules().disposition_catalog(Some(&id)).await?;
    Ok(Json(catalog.merged()))
}

async fn list_calls(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<ItemQuery>,
) -> Result<Json<Vec<CallLog>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_ITEM_LIMIT).clamp(1, 1000);
    Ok(Json(state.engine.list_call_logs(&id, limit).await?))
}

// Item handlers

async fn get_item(State(state): State<ApiState>, Path(id): Path<String>) -> Result<Json<CallListItem>, AppError> {
    Ok(Json(state.engine.get_item(&id).await?))
}

async fn release_item(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<AgentRequest>,
) -> Result<Json<CallListItem>, AppError> {
    Ok(Json(state.engine.release_item(&id, &req.agent_id).await?))
}

async fn skip_item(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<AgentRequest>,
) -> Result<Json<CallListItem>, AppError> {
    Ok(Json(state.engine.skip_item(&id, &req.agent_id).await?))
}

async fn assign_item(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<AssignRequest>,
) -> Result<Json<CallListItem>, AppError> {
    Ok(Json(state.engine.assign_item(&id, &req.agent_id, req.sync_owner).await?))
}

async fn remove_item(State(state): State<ApiState>, Path(id): Path<String>) -> Result<Json<CallListItem>, AppError> {
    Ok(Json(state.engine.remove_item_from_list(&id).await?))
}

async fn move_item(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<MoveRequest>,
) -> Result<Json<MoveResponse>, AppError> {
    let item = state.engine.move_item_to_list(&id, &req.target_list_id).await?;
    Ok(Json(MoveResponse { item }))
}

async fn apply_disposition(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(body): Json<DispositionBody>,
) -> Result<Json<DispositionOutcome>, AppError> {
    let request = DispositionRequest {
        item_id: id,
        code: body.code,
        agent_id: body.agent_id,
        notes: body.notes,
        callback_at: body.callback_at,
        call_started_at: body.call_started_at,
        talk_time_ms: body.talk_time_ms,
    };
    Ok(Json(state.engine.apply_disposition_request(&request).await?))
}

async fn item_calls(State(state): State<ApiState>, Path(id): Path<String>) -> Result<Json<Vec<CallLog>>, AppError> {
    Ok(Json(state.engine.item_call_logs(&id).await?))
}

// Disposition handlers

async fn global_catalog(State(state): State<ApiState>) -> Result<Json<Vec<CallListDisposition>>, AppError> {
    let catalog = state.engine.rules().disposition_catalog(None).await?;
    Ok(Json(catalog.merged()))
}

async fn get_disposition(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<CallListDisposition>, AppError> {
    Ok(Json(state.engine.rules().get_disposition(&id).await?))
}

async fn create_disposition(
    State(state): State<ApiState>,
    Json(req): Json<NewDisposition>,
) -> Result<(StatusCode, Json<CallListDisposition>), AppError> {
    let disposition = state.engine.rules().create_disposition(&req).await?;
    Ok((StatusCode::CREATED, Json(disposition)))
}

async fn deactivate_disposition(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.engine.rules().deactivate_disposition(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn seed(State(state): State<ApiState>) -> Result<Json<SeedResponse>, AppError> {
    let lists_inserted = state.engine.ensure_predefined_lists().await?;
    let dispositions_inserted = state.engine.ensure_predefined_dispositions().await?;
    Ok(Json(SeedResponse {
        lists_inserted,
        dispositions_inserted,
    }))
}

// Session handlers

async fn start_session(
    State(state): State<ApiState>,
    Json(req): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<CallSession>), AppError> {
    let session = state
        .engine
        .start_session(&req.user_id, req.list_id.as_deref(), req.dialer_mode)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn active_session(
    State(state): State<ApiState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<ActiveSessionResponse>, AppError> {
    let session = state.engine.get_active_session(&query.user_id).await?;
    Ok(Json(ActiveSessionResponse { session }))
}

async fn get_session(State(state): State<ApiState>, Path(id): Path<String>) -> Result<Json<CallSession>, AppError> {
    Ok(Json(state.engine.sessions().get_session(&id).await?))
}

async fn end_session(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<EndSessionRequest>,
) -> Result<Json<CallSession>, AppError> {
    Ok(Json(state.engine.end_session(&id, &req.reason).await?))
}

async fn toggle_pause(State(state): State<ApiState>, Path(id): Path<String>) -> Result<Json<CallSession>, AppError> {
    Ok(Json(state.engine.toggle_pause(&id).await?))
}

async fn update_stats(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(outcome): Json<CallOutcome>,
) -> Result<Json<CallSession>, AppError> {
    Ok(Json(state.engine.update_session_stats(&id, &outcome).await?))
}

// Dashboard handlers

async fn overview(State(state): State<ApiState>) -> Result<Json<Vec<ListDashboard>>, AppError> {
    Ok(Json(state.engine.dashboard_overview().await?))
}

async fn list_dashboard(
    State(state): State<ApiState>,
    Path(list_id): Path<String>,
) -> Result<Json<ListDashboard>, AppError> {
    Ok(Json(state.engine.list_dashboard(&list_id).await?))
}

async fn health_check(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let database = state.engine.database().health_check().await;
    let status = if database { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(HealthResponse {
            status: if database { "ok" } else { "degraded" },
            database,
        }),
    )
}

// Error handling
#[derive(Debug)]
pub struct AppError(DialerError);

impl From<DialerError> for AppError {
    fn from(err: DialerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DialerError::NotFound(_) => StatusCode::NOT_FOUND,
            DialerError::Validation(_) => StatusCode::BAD_REQUEST,
            DialerError::Conflict(_) => StatusCode::CONFLICT,
            DialerError::ExternalFailure(_) => StatusCode::BAD_GATEWAY,
            DialerError::Database(_) | DialerError::Configuration(_) | DialerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Internal error: {}", self.0);
            "An internal error occurred".to_string()
        } else {
            self.0.to_string()
        };

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                code: self.0.code().to_string(),
                message,
            },
        });

        (status, body).into_response()
    }
}
