//! `/team-members` — default-override + custom member CRUD (§6, §9).

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use maestro_core::team_member_service::parse_default_id;
use maestro_core::TeamMemberPatch;
use maestro_domain::error::Error;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ListTeamMembersQuery {
    pub project_id: String,
}

#[derive(Deserialize)]
pub struct CreateTeamMemberRequest {
    pub project_id: String,
    pub name: String,
    pub role: String,
    pub identity: String,
    #[serde(default)]
    pub avatar: String,
}

#[derive(Deserialize, Default)]
pub struct PatchTeamMemberRequest {
    pub name: Option<String>,
    pub role: Option<String>,
    pub identity: Option<String>,
    pub avatar: Option<String>,
    pub model: Option<String>,
    pub agent_tool: Option<String>,
    pub skill_ids: Option<Vec<String>>,
}

impl From<PatchTeamMemberRequest> for TeamMemberPatch {
    fn from(p: PatchTeamMemberRequest) -> Self {
        TeamMemberPatch {
            name: p.name,
            role: p.role,
            identity: p.identity,
            avatar: p.avatar,
            model: p.model,
            agent_tool: p.agent_tool,
            skill_ids: p.skill_ids,
        }
    }
}

pub async fn list_team_members(
    State(state): State<AppState>,
    Query(query): Query<ListTeamMembersQuery>,
) -> ApiResult<impl IntoResponse> {
    let members = state.team_members.list_for_project(&query.project_id)?;
    Ok(Json(members))
}

pub async fn get_team_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    match state.team_members.find(&id)? {
        Some(member) => Ok(Json(member)),
        None => Err(Error::NotFound(format!("team member {id} not found")).into()),
    }
}

pub async fn create_team_member(
    State(state): State<AppState>,
    Json(body): Json<CreateTeamMemberRequest>,
) -> ApiResult<impl IntoResponse> {
    let member = state.team_members.create_custom(
        body.project_id,
        body.name,
        body.role,
        body.identity,
        body.avatar,
    )?;
    Ok(Json(member))
}

pub async fn update_team_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PatchTeamMemberRequest>,
) -> ApiResult<impl IntoResponse> {
    let member = state.team_members.update(&id, body.into())?;
    Ok(Json(member))
}

pub async fn delete_team_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.team_members.delete(&id)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn archive_team_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let member = state.team_members.archive(&id)?;
    Ok(Json(member))
}

pub async fn unarchive_team_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let member = state.team_members.unarchive(&id)?;
    Ok(Json(member))
}

pub async fn reset_default(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let (project_id, kind) = parse_default_id(&id)
        .ok_or_else(|| Error::Validation(format!("{id} is not a default team member id")))?;
    let member = state.team_members.reset(&project_id, kind)?;
    Ok(Json(member))
}
