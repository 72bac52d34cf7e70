//! `GET /metrics` — an operational snapshot of the running server, mirroring
//! the teacher's `api/admin.rs::system_info` handler (§C).

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let projects = state.projects.list();
    let project_count = projects.len();
    let task_count: usize = projects
        .iter()
        .map(|p| state.tasks.list_by_project(&p.id).len())
        .sum();
    let session_count: usize = projects
        .iter()
        .map(|p| state.sessions.list_by_project(&p.id).len())
        .sum();
    let queue_item_count: usize = projects
        .iter()
        .flat_map(|p| state.sessions.list_by_project(&p.id))
        .map(|s| state.queues.list(&s.id).len())
        .sum();

    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "server": {
            "host": state.config.server.host,
            "port": state.config.server.port,
        },
        "project_count": project_count,
        "task_count": task_count,
        "session_count": session_count,
        "queue_item_count": queue_item_count,
        "best_effort_failure_count": maestro_domain::error::best_effort_failure_count(),
    }))
}
