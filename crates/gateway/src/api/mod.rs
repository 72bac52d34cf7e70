pub mod admin;
pub mod health;
pub mod projects;
pub mod sessions;
pub mod tasks;
pub mod team_members;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;
use crate::ws::events_ws;

/// Build the full API router (§6).
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/ws", get(events_ws))
        .route(
            "/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/projects/:id",
            get(projects::get_project)
                .patch(projects::update_project)
                .delete(projects::delete_project),
        )
        .route(
            "/tasks",
            get(tasks::list_tasks).post(tasks::create_task),
        )
        .route(
            "/tasks/:id",
            get(tasks::get_task)
                .patch(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/tasks/:id/children", get(tasks::get_children))
        .route("/tasks/:id/timeline", post(tasks::append_timeline))
        .route(
            "/sessions",
            get(sessions::list_sessions).post(sessions::register_session),
        )
        .route("/sessions/spawn", post(sessions::spawn_session))
        .route(
            "/sessions/:id",
            get(sessions::get_session)
                .patch(sessions::update_session)
                .delete(sessions::delete_session),
        )
        .route("/sessions/:id/events", post(sessions::record_event))
        .route(
            "/sessions/:id/timeline",
            post(sessions::append_session_timeline),
        )
        .route(
            "/sessions/:id/messages",
            post(sessions::send_message).get(sessions::inbox),
        )
        .route(
            "/sessions/:id/needs-input",
            post(sessions::report_needs_input),
        )
        .route(
            "/sessions/:id/queue",
            get(sessions::list_queue).post(sessions::start_queue),
        )
        .route("/sessions/:id/queue/complete", post(sessions::complete_queue))
        .route("/sessions/:id/queue/fail", post(sessions::fail_queue))
        .route("/sessions/:id/queue/skip", post(sessions::skip_queue))
        .route("/metrics", get(admin::metrics))
        .route(
            "/team-members",
            get(team_members::list_team_members).post(team_members::create_team_member),
        )
        .route(
            "/team-members/:id",
            get(team_members::get_team_member)
                .patch(team_members::update_team_member)
                .delete(team_members::delete_team_member),
        )
        .route(
            "/team-members/:id/archive",
            post(team_members::archive_team_member),
        )
        .route(
            "/team-members/:id/unarchive",
            post(team_members::unarchive_team_member),
        )
        .route(
            "/team-members/:id/reset",
            post(team_members::reset_default),
        )
}
