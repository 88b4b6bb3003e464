//! HTTP gateway for task management and live results.
//!
//! Exposes the store and scheduler over a JSON API and streams qualifying
//! run results as server-sent events.
//!
//! ## Endpoints
//!
//! - `POST /api/tasks`: create a task and register its schedule
//! - `GET /api/tasks`: list tasks (`owner`, `active` filters)
//! - `GET|PUT|DELETE /api/tasks/{id}`: fetch, patch, or delete one task
//! - `POST /api/tasks/{id}/pause`, `POST /api/tasks/{id}/resume`
//! - `POST /api/tasks/{id}/trigger?quick=bool`: run now, return the record
//! - `GET /api/tasks/{id}/history?page&per_page`: paginated run history
//! - `GET /api/tasks/{id}/trends?days`: trend rows, chronological
//! - `GET /api/tasks/{id}/statistics`, `GET /api/owners/{owner}/statistics`
//! - `GET /api/scheduler/status`: loop state and in-flight runs
//! - `GET /api/events`: SSE stream of `scheduled_result` events
//! - `GET /api/health`

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::error::{FaireError, Result};
use crate::notify::NotificationDispatcher;
use crate::scheduler::SchedulerManager;
use crate::store::WatchStore;
use crate::store::types::{AnalysisDepth, TaskUpdate, WatchTask};

/// Trend query window when `days` is not given.
const DEFAULT_TREND_DAYS: u32 = 30;

/// Largest trend query window accepted.
const MAX_TREND_DAYS: u32 = 365;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Body of `POST /api/tasks`. Omitted fields fall back to task defaults.
#[derive(Debug, Deserialize)]
struct CreateTaskRequest {
    topic: String,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default = "default_owner")]
    owner_id: String,
    #[serde(default = "default_interval_hours")]
    interval_hours: u32,
    #[serde(default)]
    analysis_depth: Option<AnalysisDepth>,
    #[serde(default)]
    source_types: Option<Vec<String>>,
    #[serde(default)]
    max_sources: Option<u32>,
    #[serde(default)]
    notification_threshold: Option<f64>,
}

fn default_owner() -> String {
    "local".to_owned()
}

fn default_interval_hours() -> u32 {
    24
}

impl CreateTaskRequest {
    fn into_task(self) -> WatchTask {
        let mut task = WatchTask::new(self.owner_id, self.topic, self.interval_hours)
            .with_keywords(self.keywords);
        if let Some(depth) = self.analysis_depth {
            task.analysis_depth = depth;
        }
        if let Some(sources) = self.source_types {
            task.source_types = sources;
        }
        if let Some(max) = self.max_sources {
            task.max_sources = max;
        }
        if let Some(threshold) = self.notification_threshold {
            task.notification_threshold = threshold;
        }
        task
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    owner: Option<String>,
    #[serde(default)]
    active: bool,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default = "default_page")]
    page: u32,
    #[serde(default = "default_per_page")]
    per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
struct TrendsQuery {
    #[serde(default = "default_trend_days")]
    days: u32,
}

fn default_trend_days() -> u32 {
    DEFAULT_TREND_DAYS
}

#[derive(Debug, Deserialize)]
struct TriggerQuery {
    #[serde(default)]
    quick: bool,
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    task_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Shared state for axum handlers.
#[derive(Clone)]
struct AppState {
    store: Arc<WatchStore>,
    scheduler: Arc<SchedulerManager>,
    dispatcher: NotificationDispatcher,
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Map a service error onto the HTTP status space.
fn error_status(e: &FaireError) -> StatusCode {
    match e {
        FaireError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
        FaireError::NotFound(_) => StatusCode::NOT_FOUND,
        FaireError::ConcurrencyConflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_body(e: &FaireError) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": e.to_string() }))
}

/// Render a handler result: the value as JSON, or the mapped error.
fn respond<T: Serialize>(result: Result<T>) -> Response {
    respond_with(StatusCode::OK, result)
}

fn respond_with<T: Serialize>(ok_status: StatusCode, result: Result<T>) -> Response {
    match result {
        Ok(value) => (ok_status, Json(value)).into_response(),
        Err(e) => {
            let status = error_status(&e);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                warn!(error = %e, "request failed");
            }
            (status, error_body(&e)).into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Handle to the running HTTP gateway.
pub struct Gateway {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl Gateway {
    /// Bind `config.bind` and start serving in a background task.
    ///
    /// Use port `0` to auto-assign.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot bind.
    pub async fn start(
        config: &GatewayConfig,
        store: Arc<WatchStore>,
        scheduler: Arc<SchedulerManager>,
        dispatcher: NotificationDispatcher,
    ) -> Result<Self> {
        let state = AppState {
            store,
            scheduler,
            dispatcher,
        };
        let app = router(state);

        let listener = TcpListener::bind(&config.bind).await?;
        let addr = listener.local_addr()?;
        info!("gateway listening on http://{addr}/api");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("gateway server error: {e}");
            }
        });

        Ok(Self { addr, handle })
    }

    /// The address the gateway is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The port the gateway is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Abort the server task.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/tasks", post(create_task).get(list_tasks))
        .route(
            "/api/tasks/{id}",
            get(fetch_task).put(update_task).delete(delete_task),
        )
        .route("/api/tasks/{id}/pause", post(pause_task))
        .route("/api/tasks/{id}/resume", post(resume_task))
        .route("/api/tasks/{id}/trigger", post(trigger_task))
        .route("/api/tasks/{id}/history", get(task_history))
        .route("/api/tasks/{id}/trends", get(task_trends))
        .route("/api/tasks/{id}/statistics", get(task_statistics))
        .route("/api/owners/{owner}/statistics", get(owner_statistics))
        .route("/api/scheduler/status", get(scheduler_status))
        .route("/api/events", get(events))
        .route("/api/health", get(health))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Task management handlers
// ---------------------------------------------------------------------------

async fn create_task(
    State(state): State<AppState>,
    Json(body): Json<CreateTaskRequest>,
) -> Response {
    let task = body.into_task();
    let result = state
        .store
        .create_task(&task)
        .and_then(|()| state.scheduler.schedule(&task))
        .and_then(|_| state.store.get_task(&task.id));
    respond_with(StatusCode::CREATED, result)
}

async fn list_tasks(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Response {
    respond(state.store.list_tasks(query.owner.as_deref(), query.active))
}

async fn fetch_task(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    respond(state.store.get_task(&id))
}

async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<TaskUpdate>,
) -> Response {
    let result = state.store.get_task(&id).and_then(|task| {
        let updated = patch.apply_to(&task)?;
        state.store.update_task(&updated)?;
        Ok(updated)
    });
    respond(result)
}

async fn delete_task(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.delete_task(&id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => (error_status(&e), error_body(&e)).into_response(),
    }
}

async fn pause_task(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    respond(state.scheduler.pause(&id))
}

async fn resume_task(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    respond(state.scheduler.resume(&id))
}

async fn trigger_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TriggerQuery>,
) -> Response {
    respond(state.scheduler.trigger_now(&id, query.quick).await)
}

// ---------------------------------------------------------------------------
// History, trends, and statistics handlers
// ---------------------------------------------------------------------------

async fn task_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let result = state
        .store
        .get_task(&id)
        .and_then(|_| state.store.history_page(&id, query.page, query.per_page));
    respond(result)
}

async fn task_trends(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TrendsQuery>,
) -> Response {
    let days = query.days.clamp(1, MAX_TREND_DAYS);
    let result = state
        .store
        .get_task(&id)
        .and_then(|_| state.store.trends_since(&id, days));
    respond(result)
}

async fn task_statistics(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    respond(state.store.task_statistics(&id))
}

async fn owner_statistics(State(state): State<AppState>, Path(owner): Path<String>) -> Response {
    respond(state.store.owner_statistics(&owner))
}

async fn scheduler_status(State(state): State<AppState>) -> Response {
    respond(state.scheduler.status())
}

// ---------------------------------------------------------------------------
// Events and health
// ---------------------------------------------------------------------------

/// SSE stream of qualifying run results, optionally filtered to one task.
///
/// A subscriber that falls behind the broadcast buffer skips ahead to the
/// newest events; duplicates are possible after reconnects, so consumers
/// de-duplicate on `(task_id, timestamp)`.
async fn events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = std::result::Result<Event, std::convert::Infallible>>> {
    let mut rx = state.dispatcher.subscribe();
    let filter = query.task_id;

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if filter.as_deref().is_some_and(|f| f != event.task_id) {
                        continue;
                    }
                    match serde_json::to_string(&event) {
                        Ok(json) => yield Ok(Event::default().data(json)),
                        Err(e) => warn!(error = %e, "cannot serialize event"),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagging, skipping ahead");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn health(State(state): State<AppState>) -> Response {
    let store_ok = state.store.count_active().is_ok();
    let running = state.scheduler.is_running();
    let status = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(serde_json::json!({
            "store": if store_ok { "healthy" } else { "unhealthy" },
            "scheduler": if running { "running" } else { "stopped" },
        })),
    )
        .into_response()
}
