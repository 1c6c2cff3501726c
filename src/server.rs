//! HTTP JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/forms/create` | Generate a new form from a prompt and documents |
//! | `GET`  | `/forms` | List forms, most recently updated first |
//! | `GET`  | `/forms/{formId}` | Current schema and version |
//! | `DELETE` | `/forms/{formId}` | Delete a form with its history and responses |
//! | `POST` | `/forms/{formId}/edit` | AI edit; returns the new schema and its diff |
//! | `POST` | `/forms/{formId}/accept` | Keep a pending AI edit |
//! | `POST` | `/forms/{formId}/save` | Manual save of a user-authored schema |
//! | `POST` | `/forms/{formId}/undo` | Revert the latest version |
//! | `GET`  | `/forms/{formId}/history` | Version list |
//! | `POST` | `/forms/{formId}/submit` | Submit answers |
//! | `GET`  | `/forms/{formId}/responses` | Submitted answers |
//! | `POST` | `/diff` | Diff two schemas without storing anything |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "review_in_progress", "message": "..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `invalid_schema` (400), `not_found` (404),
//! `review_in_progress` (409), `generation_failed` (502),
//! `persistence_failed` (500).
//!
//! Undo with nothing to undo is not an error: it answers 200 with
//! `{"success": false, "message": "Already at initial version"}`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the browser editor can
//! be served from a different origin.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use formflow_core::diff::{diff_schemas, Diff};
use formflow_core::error::FormError;
use formflow_core::models::{Answers, Document, FormSchema};
use formflow_core::store::{FormResponse, FormStore, FormSummary};

use crate::config::Config;
use crate::editor::{FormEditor, ManualSave};
use crate::generator::{create_generator, SchemaGenerator};
use crate::sqlite_store::SqliteStore;
use crate::{db, migrate};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    editor: Arc<FormEditor>,
}

/// Starts the HTTP server with the SQLite store and the configured generator.
///
/// Binds to `[server].bind` and runs until the process is terminated.
/// Migrations are applied on startup, so `formflow init` is optional.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let store: Arc<dyn FormStore> = Arc::new(SqliteStore::new(pool));
    let generator = create_generator(&config.generator)?;
    run_server_with(config, store, generator).await
}

/// Starts the HTTP server with caller-supplied collaborators.
pub async fn run_server_with(
    config: &Config,
    store: Arc<dyn FormStore>,
    generator: Arc<dyn SchemaGenerator>,
) -> anyhow::Result<()> {
    tracing::info!(
        generator = generator.name(),
        timeout_secs = config.generator.timeout_secs,
        "schema generator ready"
    );

    let editor = FormEditor::new(
        store,
        generator,
        Duration::from_secs(config.generator.timeout_secs),
    );
    let app = router(Arc::new(editor));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!("FormFlow server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router around an editor. Exposed so tests and embedding
/// binaries can serve it on their own listener.
pub fn router(editor: Arc<FormEditor>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/diff", post(handle_diff))
        .route("/forms", get(handle_list_forms))
        .route("/forms/create", post(handle_create))
        .route(
            "/forms/{form_id}",
            get(handle_get_form).delete(handle_delete_form),
        )
        .route("/forms/{form_id}/edit", post(handle_edit))
        .route("/forms/{form_id}/accept", post(handle_accept))
        .route("/forms/{form_id}/save", post(handle_save))
        .route("/forms/{form_id}/undo", post(handle_undo))
        .route("/forms/{form_id}/history", get(handle_history))
        .route("/forms/{form_id}/submit", post(handle_submit))
        .route("/forms/{form_id}/responses", get(handle_responses))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { editor })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = %self.code, message = %self.message, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<FormError> for AppError {
    fn from(err: FormError) -> Self {
        let status = match &err {
            FormError::InvalidRequest(_) | FormError::InvalidSchema(_) => StatusCode::BAD_REQUEST,
            FormError::NotFound(_) => StatusCode::NOT_FOUND,
            FormError::ReviewInProgress | FormError::NoHistoryToUndo => StatusCode::CONFLICT,
            FormError::GenerationFailed(_) => StatusCode::BAD_GATEWAY,
            FormError::PersistenceFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request".to_string(),
            message: rejection.body_text(),
        }
    }
}

type ApiResult<T> = Result<T, AppError>;

fn body<T: DeserializeOwned>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    Ok(payload?.0)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /diff ============

#[derive(Deserialize)]
struct DiffRequest {
    before: FormSchema,
    after: FormSchema,
}

async fn handle_diff(payload: Result<Json<DiffRequest>, JsonRejection>) -> ApiResult<Json<Diff>> {
    let req = body(payload)?;
    Ok(Json(diff_schemas(&req.before, &req.after)?))
}

// ============ Forms ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptRequest {
    #[serde(default)]
    user_query: String,
    #[serde(default)]
    documents: Vec<Document>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    form_id: String,
    redirect_url: String,
}

async fn handle_create(
    State(state): State<AppState>,
    payload: Result<Json<PromptRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreateResponse>)> {
    let req = body(payload)?;
    let created = state.editor.create(&req.user_query, &req.documents).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateResponse {
            redirect_url: format!("/{}/edit", created.form_id),
            form_id: created.form_id,
        }),
    ))
}

#[derive(Serialize)]
struct FormListResponse {
    forms: Vec<FormSummary>,
}

async fn handle_list_forms(State(state): State<AppState>) -> ApiResult<Json<FormListResponse>> {
    Ok(Json(FormListResponse {
        forms: state.editor.list_forms().await?,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FormResponseBody {
    form_id: String,
    title: String,
    description: String,
    schema: FormSchema,
    version: usize,
}

async fn handle_get_form(
    State(state): State<AppState>,
    Path(form_id): Path<String>,
) -> ApiResult<Json<FormResponseBody>> {
    let history = state.editor.history(&form_id).await?;
    let schema = history.current().clone();
    Ok(Json(FormResponseBody {
        form_id,
        title: schema.title.clone(),
        description: schema.description.clone(),
        version: history.version(),
        schema,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EditResponse {
    success: bool,
    schema: FormSchema,
    diff: Option<Diff>,
    title: String,
    description: String,
    version: usize,
}

async fn handle_edit(
    State(state): State<AppState>,
    Path(form_id): Path<String>,
    payload: Result<Json<PromptRequest>, JsonRejection>,
) -> ApiResult<Json<EditResponse>> {
    let req = body(payload)?;
    let outcome = state
        .editor
        .ai_edit(&form_id, &req.user_query, &req.documents)
        .await?;
    Ok(Json(EditResponse {
        success: true,
        title: outcome.schema.title.clone(),
        description: outcome.schema.description.clone(),
        schema: outcome.schema,
        diff: outcome.diff,
        version: outcome.version,
    }))
}

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
}

async fn handle_delete_form(
    State(state): State<AppState>,
    Path(form_id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    state.editor.delete(&form_id).await?;
    Ok(Json(DeleteResponse { success: true }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AcceptResponse {
    success: bool,
    had_pending_review: bool,
}

async fn handle_accept(
    State(state): State<AppState>,
    Path(form_id): Path<String>,
) -> ApiResult<Json<AcceptResponse>> {
    let had_pending_review = state.editor.accept(&form_id).await?;
    Ok(Json(AcceptResponse {
        success: true,
        had_pending_review,
    }))
}

#[derive(Serialize)]
struct SaveResponse {
    success: bool,
    version: usize,
}

async fn handle_save(
    State(state): State<AppState>,
    Path(form_id): Path<String>,
    payload: Result<Json<ManualSave>, JsonRejection>,
) -> ApiResult<Json<SaveResponse>> {
    let req = body(payload)?;
    let version = state.editor.save(&form_id, req).await?;
    Ok(Json(SaveResponse {
        success: true,
        version,
    }))
}

#[derive(Serialize)]
struct UndoResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<FormSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

async fn handle_undo(
    State(state): State<AppState>,
    Path(form_id): Path<String>,
) -> ApiResult<Json<UndoResponse>> {
    match state.editor.undo(&form_id).await {
        Ok(outcome) => Ok(Json(UndoResponse {
            success: true,
            schema: Some(outcome.schema),
            version: Some(outcome.version),
            message: None,
        })),
        Err(err @ FormError::NoHistoryToUndo) => Ok(Json(UndoResponse {
            success: false,
            schema: None,
            version: None,
            message: Some(err.to_string()),
        })),
        Err(err) => Err(err.into()),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VersionEntry {
    version: usize,
    change_description: String,
    created_at: DateTime<Utc>,
    component_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryResponse {
    form_id: String,
    versions: Vec<VersionEntry>,
}

async fn handle_history(
    State(state): State<AppState>,
    Path(form_id): Path<String>,
) -> ApiResult<Json<HistoryResponse>> {
    let history = state.editor.history(&form_id).await?;
    let versions = history
        .snapshots()
        .into_iter()
        .enumerate()
        .map(|(version, snapshot)| VersionEntry {
            version,
            change_description: snapshot.change_description.clone(),
            created_at: snapshot.created_at,
            component_count: snapshot.schema.components.len(),
        })
        .collect();
    Ok(Json(HistoryResponse { form_id, versions }))
}

#[derive(Deserialize)]
struct SubmitRequest {
    #[serde(default)]
    answers: Answers,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    success: bool,
    response_id: String,
}

async fn handle_submit(
    State(state): State<AppState>,
    Path(form_id): Path<String>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let req = body(payload)?;
    let response_id = state.editor.submit_response(&form_id, &req.answers).await?;
    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            success: true,
            response_id,
        }),
    ))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResponsesResponse {
    form_id: String,
    responses: Vec<FormResponse>,
}

async fn handle_responses(
    State(state): State<AppState>,
    Path(form_id): Path<String>,
) -> ApiResult<Json<ResponsesResponse>> {
    let responses = state.editor.responses(&form_id).await?;
    Ok(Json(ResponsesResponse { form_id, responses }))
}
