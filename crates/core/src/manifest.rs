//! ManifestComposer — builds the deterministic context bundle an external
//! agent consumes at spawn: system envelope, task envelope, permissions
//! (§4.4).

use maestro_domain::config::Config;
use maestro_domain::entities::{SessionMode, Task, TeamMemberSnapshot};
use serde::Serialize;

const WORKER_COMMANDS: &[&str] = &["report", "complete", "fail", "send_message"];
const COORDINATOR_COMMANDS: &[&str] = &["report", "complete", "fail", "send_message", "spawn_session"];

#[derive(Debug, Clone, Serialize)]
pub struct TeamRosterEntry {
    pub team_member_id: String,
    pub name: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemEnvelope {
    pub mode: SessionMode,
    pub identity_block: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_member_identity: Option<String>,
    pub allowed_commands: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub team_roster: Vec<TeamRosterEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskEnvelopeEntry {
    pub task_id: String,
    pub title: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spawn_instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub session_id: String,
    pub system: SystemEnvelope,
    pub tasks: Vec<TaskEnvelopeEntry>,
    pub permissions: Vec<String>,
}

fn identity_block(mode: SessionMode) -> &'static str {
    match mode {
        SessionMode::Worker => {
            "You are a worker agent. Execute the assigned tasks directly. \
             Report progress via the session events API; mark tasks complete or failed when done."
        }
        SessionMode::Coordinator => {
            "You are a coordinator agent. Break work into subtasks and delegate them to worker \
             sessions by name. Do not perform implementation work yourself."
        }
    }
}

/// Role-default permission set, extended per mode, narrowed by an explicit
/// allowlist, with core commands always present (§4.4).
pub fn resolve_permissions(
    core_commands: &[String],
    mode: SessionMode,
    allowed_commands: Option<&[String]>,
) -> Vec<String> {
    let mut set: Vec<String> = core_commands.to_vec();
    let mode_commands: &[&str] = match mode {
        SessionMode::Worker => WORKER_COMMANDS,
        SessionMode::Coordinator => COORDINATOR_COMMANDS,
    };
    set.extend(mode_commands.iter().map(|s| s.to_string()));

    if let Some(allowed) = allowed_commands {
        set.retain(|c| core_commands.iter().any(|cc| cc == c) || allowed.contains(c));
    }
    set.sort();
    set.dedup();
    set
}

pub struct ManifestComposer;

impl ManifestComposer {
    /// Pure function of its inputs: same session/tasks/snapshot/permissions
    /// yield byte-identical output (§4.4, §8).
    pub fn compose(
        config: &Config,
        session_id: &str,
        mode: SessionMode,
        tasks: &[Task],
        team_member_snapshot: Option<&TeamMemberSnapshot>,
        allowed_commands: Option<&[String]>,
    ) -> Manifest {
        let team_roster = if mode == SessionMode::Coordinator {
            team_member_snapshot
                .map(|s| {
                    vec![TeamRosterEntry {
                        team_member_id: s.team_member_id.clone(),
                        name: s.name.clone(),
                        role: s.role.clone(),
                    }]
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let permissions = resolve_permissions(&config.manifest.core_commands, mode, allowed_commands);

        let task_entries = tasks
            .iter()
            .map(|t| TaskEnvelopeEntry {
                task_id: t.id.clone(),
                title: t.title.clone(),
                description: t.description.clone(),
                acceptance_criteria: t.acceptance_criteria.clone(),
                dependencies: t.dependencies.clone(),
                spawn_instructions: (mode == SessionMode::Coordinator).then(|| {
                    "Delegate subtasks with `spawn_session --task <taskId> --team-member <name>`."
                        .to_string()
                }),
            })
            .collect();

        Manifest {
            session_id: session_id.to_string(),
            system: SystemEnvelope {
                mode,
                identity_block: identity_block(mode).to_string(),
                // Only populated by the caller when a non-default team member was used (§4.4).
                team_member_identity: team_member_snapshot.map(|s| s.identity.clone()),
                allowed_commands: permissions.clone(),
                team_roster,
            },
            tasks: task_entries,
            permissions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_domain::entities::TaskStatus;

    fn sample_task() -> Task {
        let mut t = Task::new("t1".into(), "p1".into(), None, "Ship auth".into());
        t.description = "Finish the login flow".into();
        t.status = TaskStatus::Todo;
        t
    }

    #[test]
    fn compose_is_deterministic() {
        let config = Config::default();
        let tasks = vec![sample_task()];
        let a = ManifestComposer::compose(&config, "sess_1", SessionMode::Worker, &tasks, None, None);
        let b = ManifestComposer::compose(&config, "sess_1", SessionMode::Worker, &tasks, None, None);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn worker_cannot_spawn_sessions() {
        let core = Config::default().manifest.core_commands;
        let permissions = resolve_permissions(&core, SessionMode::Worker, None);
        assert!(!permissions.contains(&"spawn_session".to_string()));
        let permissions = resolve_permissions(&core, SessionMode::Coordinator, None);
        assert!(permissions.contains(&"spawn_session".to_string()));
    }

    #[test]
    fn explicit_allowlist_narrows_but_keeps_core() {
        let core = Config::default().manifest.core_commands;
        let permissions = resolve_permissions(&core, SessionMode::Coordinator, Some(&["report".to_string()]));
        assert!(permissions.contains(&"identity".to_string()));
        assert!(permissions.contains(&"report".to_string()));
        assert!(!permissions.contains(&"spawn_session".to_string()));
    }
}
