//! TeamMemberService — two code defaults per project (Worker, Coordinator)
//! resolved as `merge(codeDefault, diskOverride ?? {})`, plus custom members
//! (§3, §4.1, §9).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use maestro_domain::entities::{DefaultKind, TeamMember, TeamMemberOverride, TeamMemberStatus};
use maestro_domain::error::{Error, Result};
use maestro_domain::events::Event;
use maestro_domain::ids;
use maestro_repo::team_member::default_id;
use maestro_repo::TeamMemberRepo;

use crate::event_bus::EventBus;

/// Fixed so the code default is byte-identical across calls and across
/// restarts until an override is written (reset-idempotence, §8).
fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(0, 0).unwrap()
}

#[derive(Debug, Default, Clone)]
pub struct TeamMemberPatch {
    pub name: Option<String>,
    pub role: Option<String>,
    pub identity: Option<String>,
    pub avatar: Option<String>,
    pub model: Option<String>,
    pub agent_tool: Option<String>,
    pub skill_ids: Option<Vec<String>>,
}

impl From<TeamMemberPatch> for TeamMemberOverride {
    fn from(p: TeamMemberPatch) -> Self {
        TeamMemberOverride {
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

pub struct TeamMemberService {
    repo: Arc<TeamMemberRepo>,
    events: Arc<EventBus>,
}

/// `tm_{projectId}_{worker|coordinator}` → `(projectId, kind)`.
pub fn parse_default_id(id: &str) -> Option<(String, DefaultKind)> {
    let rest = id.strip_prefix("tm_")?;
    if let Some(project_id) = rest.strip_suffix("_worker") {
        Some((project_id.to_string(), DefaultKind::Worker))
    } else {
        rest.strip_suffix("_coordinator")
            .map(|project_id| (project_id.to_string(), DefaultKind::Coordinator))
    }
}

fn code_default(project_id: &str, kind: DefaultKind) -> TeamMember {
    let (name, role, identity, avatar) = match kind {
        DefaultKind::Worker => (
            "Worker",
            "Worker",
            "You are a worker agent. Execute the assigned task directly; report progress and completion.",
            "🛠️",
        ),
        DefaultKind::Coordinator => (
            "Coordinator",
            "Coordinator",
            "You are a coordinator agent. Plan work and delegate subtasks to worker sessions.",
            "🧭",
        ),
    };
    TeamMember {
        id: default_id(project_id, kind),
        project_id: project_id.to_string(),
        name: name.to_string(),
        role: role.to_string(),
        identity: identity.to_string(),
        avatar: avatar.to_string(),
        model: None,
        agent_tool: None,
        skill_ids: Vec::new(),
        is_default: Some(kind),
        status: TeamMemberStatus::Active,
        created_at: epoch(),
        updated_at: epoch(),
    }
}

impl TeamMemberService {
    pub fn new(repo: Arc<TeamMemberRepo>, events: Arc<EventBus>) -> Self {
        Self { repo, events }
    }

    /// `effective = merge(codeDefault, diskOverride ?? {})` (§9).
    pub fn effective_default(&self, project_id: &str, kind: DefaultKind) -> Result<TeamMember> {
        let mut base = code_default(project_id, kind);
        if let Some(patch) = self.repo.load_override(project_id, kind)? {
            patch.apply(&mut base);
        }
        Ok(base)
    }

    /// Every team member visible in a project: both defaults plus custom
    /// members.
    pub fn list_for_project(&self, project_id: &str) -> Result<Vec<TeamMember>> {
        let mut out = vec![
            self.effective_default(project_id, DefaultKind::Worker)?,
            self.effective_default(project_id, DefaultKind::Coordinator)?,
        ];
        out.extend(self.repo.find_by_project(project_id));
        Ok(out)
    }

    /// Resolve any team member id — default or custom.
    pub fn find(&self, id: &str) -> Result<Option<TeamMember>> {
        if let Some(member) = self.repo.find_by_id(id) {
            return Ok(Some(member));
        }
        if let Some((project_id, kind)) = parse_default_id(id) {
            return Ok(Some(self.effective_default(&project_id, kind)?));
        }
        Ok(None)
    }

    pub fn create_custom(
        &self,
        project_id: String,
        name: String,
        role: String,
        identity: String,
        avatar: String,
    ) -> Result<TeamMember> {
        let now = Utc::now();
        let member = TeamMember {
            id: ids::TEAM_MEMBER_IDS.generate(),
            project_id,
            name,
            role,
            identity,
            avatar,
            model: None,
            agent_tool: None,
            skill_ids: Vec::new(),
            is_default: None,
            status: TeamMemberStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let member = self.repo.create(member)?;
        self.events.publish(Event::TeamMemberCreated {
            team_member: serde_json::to_value(&member).unwrap_or_default(),
        });
        Ok(member)
    }

    /// Updates a default via its override patch, or a custom member in
    /// place.
    pub fn update(&self, id: &str, patch: TeamMemberPatch) -> Result<TeamMember> {
        if let Some((project_id, kind)) = parse_default_id(id) {
            self.repo
                .save_override(&project_id, kind, &patch.into())?;
            let effective = self.effective_default(&project_id, kind)?;
            self.events.publish(Event::TeamMemberUpdated {
                team_member: serde_json::to_value(&effective).unwrap_or_default(),
            });
            return Ok(effective);
        }

        let mut member = self
            .repo
            .find_by_id(id)
            .ok_or_else(|| Error::NotFound(format!("team member {id} not found")))?;
        if let Some(v) = patch.name {
            member.name = v;
        }
        if let Some(v) = patch.role {
            member.role = v;
        }
        if let Some(v) = patch.identity {
            member.identity = v;
        }
        if let Some(v) = patch.avatar {
            member.avatar = v;
        }
        if let Some(v) = patch.model {
            member.model = Some(v);
        }
        if let Some(v) = patch.agent_tool {
            member.agent_tool = Some(v);
        }
        if let Some(v) = patch.skill_ids {
            member.skill_ids = v;
        }
        member.updated_at = Utc::now();
        let member = self.repo.update(member)?;
        self.events.publish(Event::TeamMemberUpdated {
            team_member: serde_json::to_value(&member).unwrap_or_default(),
        });
        Ok(member)
    }

    /// "reset = deleteOverrideFile" (§9).
    pub fn reset(&self, project_id: &str, kind: DefaultKind) -> Result<TeamMember> {
        self.repo.reset_override(project_id, kind)?;
        let effective = self.effective_default(project_id, kind)?;
        self.events.publish(Event::TeamMemberUpdated {
            team_member: serde_json::to_value(&effective).unwrap_or_default(),
        });
        Ok(effective)
    }

    pub fn archive(&self, id: &str) -> Result<TeamMember> {
        if parse_default_id(id).is_some() {
            return Err(Error::Forbidden("default team members cannot be archived".into()));
        }
        let mut member = self
            .repo
            .find_by_id(id)
            .ok_or_else(|| Error::NotFound(format!("team member {id} not found")))?;
        member.status = TeamMemberStatus::Archived;
        member.updated_at = Utc::now();
        let member = self.repo.update(member)?;
        self.events.publish(Event::TeamMemberArchived {
            team_member_id: member.id.clone(),
        });
        Ok(member)
    }

    pub fn unarchive(&self, id: &str) -> Result<TeamMember> {
        let mut member = self
            .repo
            .find_by_id(id)
            .ok_or_else(|| Error::NotFound(format!("team member {id} not found")))?;
        member.status = TeamMemberStatus::Active;
        member.updated_at = Utc::now();
        let member = self.repo.update(member)?;
        self.events.publish(Event::TeamMemberUpdated {
            team_member: serde_json::to_value(&member).unwrap_or_default(),
        });
        Ok(member)
    }

    /// Deleting a default → forbidden; deleting a non-archived custom
    /// member → conflict (§7, §8).
    pub fn delete(&self, id: &str) -> Result<()> {
        if parse_default_id(id).is_some() {
            return Err(Error::Forbidden("default team members cannot be deleted, only reset".into()));
        }
        let member = self
            .repo
            .find_by_id(id)
            .ok_or_else(|| Error::NotFound(format!("team member {id} not found")))?;
        if member.status != TeamMemberStatus::Archived {
            return Err(Error::Conflict(
                "team member must be archived before deletion".into(),
            ));
        }
        self.repo.delete(id)?;
        self.events.publish(Event::TeamMemberDeleted {
            team_member_id: id.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> (TeamMemberService, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(TeamMemberRepo::new(dir.path()).unwrap());
        let events = Arc::new(EventBus::new());
        (TeamMemberService::new(repo, events), dir)
    }

    #[test]
    fn reset_then_empty_patch_restores_code_default() {
        let (service, _dir) = service();
        let original = service
            .effective_default("proj_1", DefaultKind::Worker)
            .unwrap();

        service
            .update(
                "tm_proj_1_worker",
                TeamMemberPatch {
                    identity: Some("X".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let overridden = service.find("tm_proj_1_worker").unwrap().unwrap();
        assert_eq!(overridden.identity, "X");

        service.reset("proj_1", DefaultKind::Worker).unwrap();
        let restored = service.find("tm_proj_1_worker").unwrap().unwrap();
        assert_eq!(
            serde_json::to_string(&restored).unwrap(),
            serde_json::to_string(&original).unwrap()
        );
    }

    #[test]
    fn deleting_default_is_forbidden() {
        let (service, _dir) = service();
        let err = service.delete("tm_proj_1_worker").unwrap_err();
        assert_eq!(err.code(), "forbidden");
    }

    #[test]
    fn deleting_non_archived_custom_member_is_conflict() {
        let (service, _dir) = service();
        let member = service
            .create_custom(
                "proj_1".into(),
                "Alice".into(),
                "Reviewer".into(),
                "You review code.".into(),
                "🔍".into(),
            )
            .unwrap();
        let err = service.delete(&member.id).unwrap_err();
        assert_eq!(err.code(), "conflict");

        service.archive(&member.id).unwrap();
        service.delete(&member.id).unwrap();
        assert!(service.find(&member.id).unwrap().is_none());
    }
}
