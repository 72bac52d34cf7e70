//! `/sessions` — session CRUD, spawn, events, timeline, messages (§6).

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use maestro_core::{SendMetadata, SessionPatch, SpawnRequest, SpawnSource};
use maestro_domain::entities::{SessionMode, SessionStatus};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Deserialize, Default)]
pub struct ListSessionsQuery {
    pub project_id: Option<String>,
}

#[derive(Deserialize)]
pub struct RegisterSessionRequest {
    pub id: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct PatchSessionRequest {
    pub status: Option<SessionStatus>,
    pub needs_input_active: Option<bool>,
}

#[derive(Deserialize)]
pub struct SpawnSessionRequest {
    pub project_id: String,
    #[serde(default)]
    pub task_ids: Vec<String>,
    #[serde(default)]
    pub mode: SessionMode,
    #[serde(default)]
    pub team_member_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub agent_tool: Option<String>,
    #[serde(default)]
    pub allowed_commands: Option<Vec<String>>,
    #[serde(default)]
    pub spawn_source: Option<SpawnSource>,
}

#[derive(Deserialize)]
pub struct RecordEventRequest {
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Deserialize)]
pub struct AppendSessionTimelineRequest {
    pub message: String,
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub to: String,
    pub body: String,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct InboxQuery {
    #[serde(default)]
    pub mark_read: bool,
}

#[derive(Deserialize)]
pub struct NeedsInputRequest {
    pub question: String,
}

#[derive(Deserialize)]
pub struct QueueCompleteRequest {
    pub task_id: String,
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<ListSessionsQuery>,
) -> impl IntoResponse {
    let sessions = match &query.project_id {
        Some(project_id) => state.sessions.list_by_project(project_id),
        None => Vec::new(),
    };
    Json(sessions)
}

/// Viewing a session clears any pending needs-input gate (§4.3).
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session = state.sessions.clear_needs_input(&id)?;
    Ok(Json(session))
}

pub async fn report_needs_input(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<NeedsInputRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = state.sessions.report_needs_input(&id, body.question)?;
    Ok(Json(session))
}

pub async fn register_session(
    State(state): State<AppState>,
    Json(body): Json<RegisterSessionRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = state.sessions.register_session(&body.id, body.project_id)?;
    Ok(Json(session))
}

pub async fn spawn_session(
    State(state): State<AppState>,
    Json(body): Json<SpawnSessionRequest>,
) -> ApiResult<impl IntoResponse> {
    let response = state
        .sessions
        .spawn_session(SpawnRequest {
            project_id: body.project_id,
            task_ids: body.task_ids,
            mode: body.mode,
            team_member_id: body.team_member_id,
            model: body.model,
            agent_tool: body.agent_tool,
            allowed_commands: body.allowed_commands,
            spawn_source: body.spawn_source,
        })
        .await?;
    Ok(Json(serde_json::json!({
        "sessionId": response.session_id,
        "manifestPath": response.manifest_path,
        "manifest": response.manifest,
        "envVars": response.env_vars,
        "initialCommand": response.initial_command,
    })))
}

pub async fn update_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PatchSessionRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = state.sessions.patch_session(
        &id,
        SessionPatch {
            status: body.status,
            needs_input_active: body.needs_input_active,
        },
    )?;
    Ok(Json(session))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.sessions.delete_session(&id)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn record_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RecordEventRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = state.sessions.record_event(&id, body.kind, body.payload)?;
    Ok(Json(session))
}

pub async fn append_session_timeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AppendSessionTimelineRequest>,
) -> ApiResult<impl IntoResponse> {
    let session = state.sessions.record_event(
        &id,
        "timeline".to_string(),
        serde_json::json!({ "message": body.message }),
    )?;
    Ok(Json(session))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let message = state.messages.send(
        &id,
        &body.to,
        &body.body,
        SendMetadata {
            task_id: body.task_id,
            r#type: body.r#type,
            priority: body.priority,
        },
    )?;
    Ok(Json(message))
}

pub async fn inbox(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<InboxQuery>,
) -> ApiResult<impl IntoResponse> {
    let messages = state.messages.inbox(&id, query.mark_read)?;
    Ok(Json(messages))
}

pub async fn list_queue(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.queues.list(&id)))
}

pub async fn start_queue(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let item = state.queues.start(&id)?;
    Ok(Json(item))
}

pub async fn complete_queue(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<QueueCompleteRequest>,
) -> ApiResult<impl IntoResponse> {
    let item = state.queues.complete(&id, &body.task_id)?;
    Ok(Json(item))
}

pub async fn fail_queue(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<QueueCompleteRequest>,
) -> ApiResult<impl IntoResponse> {
    let item = state.queues.fail(&id, &body.task_id)?;
    Ok(Json(item))
}

pub async fn skip_queue(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<QueueCompleteRequest>,
) -> ApiResult<impl IntoResponse> {
    let item = state.queues.skip(&id, &body.task_id)?;
    Ok(Json(item))
}
