use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use estateerp_core::{Aggregate, AggregateRoot, DomainError, TenantId, define_aggregate_id};
use estateerp_events::Event;
use estateerp_invoicing::IndianState;

define_aggregate_id!(
    /// Project (site/tower development) identifier.
    ProjectId
);

/// Construction phase. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectPhase {
    Planning,
    UnderConstruction,
    Completed,
}

/// Aggregate root: Project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    id: ProjectId,
    tenant_id: Option<TenantId>,
    code: String,
    name: String,
    phase: ProjectPhase,
    version: u64,
    created: bool,
}

impl Project {
    pub fn empty(id: ProjectId) -> Self {
        Self {
            id,
            tenant_id: None,
            code: String::new(),
            name: String::new(),
            phase: ProjectPhase::Planning,
            version: 0,
            created: false,
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> ProjectPhase {
        self.phase
    }
}

impl AggregateRoot for Project {
    type Id = ProjectId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProject {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub code: String,
    pub name: String,
    pub location: String,
    pub state: String,
    pub launch_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeProjectPhase {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub phase: ProjectPhase,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectCommand {
    CreateProject(CreateProject),
    ChangeProjectPhase(ChangeProjectPhase),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCreated {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub code: String,
    pub name: String,
    pub location: String,
    pub state: IndianState,
    pub launch_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectPhaseChanged {
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub from: ProjectPhase,
    pub to: ProjectPhase,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectEvent {
    ProjectCreated(ProjectCreated),
    ProjectPhaseChanged(ProjectPhaseChanged),
}

impl Event for ProjectEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProjectEvent::ProjectCreated(_) => "property.project.created",
            ProjectEvent::ProjectPhaseChanged(_) => "property.project.phase_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProjectEvent::ProjectCreated(e) => e.occurred_at,
            ProjectEvent::ProjectPhaseChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Project {
    type Command = ProjectCommand;
    type Event = ProjectEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProjectEvent::ProjectCreated(e) => {
                self.id = e.project_id;
                self.tenant_id = Some(e.tenant_id);
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.phase = ProjectPhase::Planning;
                self.created = true;
            }
            ProjectEvent::ProjectPhaseChanged(e) => {
                self.phase = e.to;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProjectCommand::CreateProject(cmd) => self.handle_create(cmd),
            ProjectCommand::ChangeProjectPhase(cmd) => self.handle_phase(cmd),
        }
    }
}

impl Project {
    fn handle_create(&self, cmd: &CreateProject) -> Result<Vec<ProjectEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("project already exists"));
        }
        let code = cmd.code.trim().to_ascii_uppercase();
        if code.is_empty() {
            return Err(DomainError::validation("project code cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("project name cannot be empty"));
        }
        let state = IndianState::parse(&cmd.state)
            .ok_or_else(|| DomainError::validation("project state cannot be empty"))?;

        Ok(vec![ProjectEvent::ProjectCreated(ProjectCreated {
            tenant_id: cmd.tenant_id,
            project_id: cmd.project_id,
            code,
            name: cmd.name.trim().to_string(),
            location: cmd.location.trim().to_string(),
            state,
            launch_date: cmd.launch_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_phase(&self, cmd: &ChangeProjectPhase) -> Result<Vec<ProjectEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(cmd.tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if cmd.phase <= self.phase {
            return Err(DomainError::invariant(format!(
                "project phase can only move forward (currently {:?})",
                self.phase
            )));
        }
        Ok(vec![ProjectEvent::ProjectPhaseChanged(ProjectPhaseChanged {
            tenant_id: cmd.tenant_id,
            project_id: cmd.project_id,
            from: self.phase,
            to: cmd.phase,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estateerp_events::execute;

    #[test]
    fn phase_moves_forward_only() {
        let tenant_id = TenantId::new();
        let project_id = ProjectId::generate();
        let mut project = Project::empty(project_id);
        execute(
            &mut project,
            &ProjectCommand::CreateProject(CreateProject {
                tenant_id,
                project_id,
                code: "skyline".to_string(),
                name: "Skyline Residency".to_string(),
                location: "Baner, Pune".to_string(),
                state: "maharashtra".to_string(),
                launch_date: None,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(project.code(), "SKYLINE");

        let phase = |p| {
            ProjectCommand::ChangeProjectPhase(ChangeProjectPhase {
                tenant_id,
                project_id,
                phase: p,
                occurred_at: Utc::now(),
            })
        };
        execute(&mut project, &phase(ProjectPhase::Completed)).unwrap();
        assert!(project.handle(&phase(ProjectPhase::UnderConstruction)).is_err());
        assert!(project.handle(&phase(ProjectPhase::Completed)).is_err());
    }
}
