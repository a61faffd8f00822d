//! HTTP API under `/api/users`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use kvbulk_core::{BulkError, BulkOrchestrator, Record, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::users::{mock_users, NewUser, UserService};

/// Users generated by `POST /migrate` when no `count` is given.
pub const DEFAULT_MIGRATION_COUNT: usize = 1000;

#[derive(Clone)]
pub struct AppState {
    pub users: UserService,
    pub orchestrator: Arc<BulkOrchestrator>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
pub struct ApiError {
    message: String,
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        Self {
            message: error.to_string(),
        }
    }
}

impl From<BulkError> for ApiError {
    fn from(error: BulkError) -> Self {
        Self {
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
struct MigrateParams {
    count: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MigrationStarted {
    message: String,
    estimated_items: usize,
    batch_size: usize,
    concurrency_limit: usize,
}

pub fn router(state: AppState) -> Router {
    let users = Router::new()
        .route("/", get(list_users))
        .route("/user/:id", get(get_user))
        .route("/user", post(register_user))
        .route("/migrate", post(start_migration));

    Router::new().nest("/api/users", users).with_state(state)
}

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<Record>>, ApiError> {
    Ok(Json(state.users.list().await?))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    match state.users.get(&id).await? {
        Some(user) => Ok(Json(user).into_response()),
        None => Ok((StatusCode::NOT_FOUND, "User not found").into_response()),
    }
}

async fn register_user(
    State(state): State<AppState>,
    Json(user): Json<NewUser>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    state.users.register(&user).await?;
    Ok((StatusCode::CREATED, Json(json!({ "status": "User registered" }))))
}

async fn start_migration(
    State(state): State<AppState>,
    Query(params): Query<MigrateParams>,
) -> Result<(StatusCode, Json<MigrationStarted>), ApiError> {
    let records = mock_users(params.count.unwrap_or(DEFAULT_MIGRATION_COUNT), Utc::now());
    let estimated_items = records.len();
    let handle = state
        .orchestrator
        .spawn(state.users.table().to_string(), records)?;

    tokio::spawn(async move {
        match handle.join().await {
            Ok(report) => info!(
                total = report.total_items,
                succeeded = report.succeeded_items,
                failed = report.failed_items,
                batch_errors = report.batch_errors.len(),
                elapsed_ms = report.elapsed_ms,
                "migration finished"
            ),
            Err(e) => error!(error = %e, "migration aborted"),
        }
    });

    let config = state.orchestrator.config();
    Ok((
        StatusCode::ACCEPTED,
        Json(MigrationStarted {
            message: "Heavy write migration started in the background.".into(),
            estimated_items,
            batch_size: config.chunk_size,
            concurrency_limit: config.concurrency_limit,
        }),
    ))
}
