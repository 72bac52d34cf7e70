//! `/tasks` — task CRUD, children, timeline (§6).

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use maestro_core::TaskPatch;
use maestro_domain::entities::{TaskPriority, TaskStatus, UpdateSource};
use maestro_domain::error::Error;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub project_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub title: String,
}

#[derive(Deserialize, Default)]
pub struct ListTasksQuery {
    pub project_id: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub parent_id: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct PatchTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub dependencies: Option<Vec<String>>,
    pub session_status: Option<maestro_domain::entities::TaskSessionStatus>,
    #[serde(default)]
    pub update_source: Option<UpdateSource>,
    pub session_id: Option<String>,
}

#[derive(Deserialize)]
pub struct AppendTimelineRequest {
    pub message: String,
    #[serde(default)]
    pub update_source: Option<UpdateSource>,
    pub session_id: Option<String>,
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> impl IntoResponse {
    let mut tasks = match &query.project_id {
        Some(project_id) => state.tasks.list_by_project(project_id),
        None => Vec::new(),
    };
    if let Some(status) = query.status {
        tasks.retain(|t| t.status == status);
    }
    if let Some(priority) = query.priority {
        tasks.retain(|t| t.priority == priority);
    }
    if let Some(parent_id) = &query.parent_id {
        tasks.retain(|t| t.parent_id.as_deref() == Some(parent_id.as_str()));
    }
    Json(tasks)
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    match state.tasks.get(&id) {
        Some(task) => Ok(Json(task)),
        None => Err(Error::NotFound(format!("task {id} not found")).into()),
    }
}

pub async fn get_children(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    Json(state.tasks.get_children(&id))
}

pub async fn create_task(
    State(state): State<AppState>,
    Json(body): Json<CreateTaskRequest>,
) -> ApiResult<impl IntoResponse> {
    let task = state
        .tasks
        .create_task(body.project_id, body.parent_id, body.title)?;
    Ok(Json(task))
}

pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PatchTaskRequest>,
) -> ApiResult<impl IntoResponse> {
    let update_source = body.update_source.unwrap_or(UpdateSource::User);
    let patch = TaskPatch {
        title: body.title,
        description: body.description,
        status: body.status,
        priority: body.priority,
        dependencies: body.dependencies,
        session_status: body.session_status,
    };
    let task = state
        .tasks
        .update_task(&id, patch, update_source, body.session_id)?;
    Ok(Json(task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.tasks.delete_task(&id)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn append_timeline(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AppendTimelineRequest>,
) -> ApiResult<impl IntoResponse> {
    let task = state.tasks.append_timeline(
        &id,
        body.message,
        body.update_source.unwrap_or(UpdateSource::User),
        body.session_id,
    )?;
    Ok(Json(task))
}
