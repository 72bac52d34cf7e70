//! `/projects` — project CRUD (§6).

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use maestro_core::ProjectPatch;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    #[serde(default)]
    pub working_dir: String,
}

#[derive(Deserialize, Default)]
pub struct PatchProjectRequest {
    pub name: Option<String>,
    pub working_dir: Option<String>,
}

pub async fn list_projects(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.projects.list())
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    match state.projects.get(&id) {
        Some(project) => Ok(Json(project)),
        None => Err(maestro_domain::error::Error::NotFound(format!("project {id} not found")).into()),
    }
}

pub async fn create_project(
    State(state): State<AppState>,
    Json(body): Json<CreateProjectRequest>,
) -> ApiResult<impl IntoResponse> {
    let project = state.projects.create(body.name, body.working_dir)?;
    Ok(Json(project))
}

pub async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PatchProjectRequest>,
) -> ApiResult<impl IntoResponse> {
    let project = state.projects.update(
        &id,
        ProjectPatch {
            name: body.name,
            working_dir: body.working_dir,
        },
    )?;
    Ok(Json(project))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.projects.delete(&id)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
