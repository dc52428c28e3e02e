use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use estateerp_core::{Aggregate, AggregateRoot, DomainError, TenantId, define_aggregate_id};
use estateerp_events::Event;

define_aggregate_id!(
    /// HR department identifier.
    DepartmentId
);

/// Aggregate root: Department.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Department {
    id: DepartmentId,
    tenant_id: Option<TenantId>,
    code: String,
    name: String,
    version: u64,
    created: bool,
}

impl Department {
    pub fn empty(id: DepartmentId) -> Self {
        Self {
            id,
            tenant_id: None,
            code: String::new(),
            name: String::new(),
            version: 0,
            created: false,
        }
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl AggregateRoot for Department {
    type Id = DepartmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDepartment {
    pub tenant_id: TenantId,
    pub department_id: DepartmentId,
    pub code: String,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameDepartment {
    pub tenant_id: TenantId,
    pub department_id: DepartmentId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepartmentCommand {
    CreateDepartment(CreateDepartment),
    RenameDepartment(RenameDepartment),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentCreated {
    pub tenant_id: TenantId,
    pub department_id: DepartmentId,
    pub code: String,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentRenamed {
    pub tenant_id: TenantId,
    pub department_id: DepartmentId,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepartmentEvent {
    DepartmentCreated(DepartmentCreated),
    DepartmentRenamed(DepartmentRenamed),
}

impl Event for DepartmentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            DepartmentEvent::DepartmentCreated(_) => "hr.department.created",
            DepartmentEvent::DepartmentRenamed(_) => "hr.department.renamed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DepartmentEvent::DepartmentCreated(e) => e.occurred_at,
            DepartmentEvent::DepartmentRenamed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Department {
    type Command = DepartmentCommand;
    type Event = DepartmentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            DepartmentEvent::DepartmentCreated(e) => {
                self.id = e.department_id;
                self.tenant_id = Some(e.tenant_id);
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.created = true;
            }
            DepartmentEvent::DepartmentRenamed(e) => {
                self.name = e.name.clone();
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            DepartmentCommand::CreateDepartment(cmd) => {
                if self.created {
                    return Err(DomainError::conflict("department already exists"));
                }
                let code = cmd.code.trim().to_ascii_uppercase();
                if code.is_empty() {
                    return Err(DomainError::validation("department code cannot be empty"));
                }
                let name = cmd.name.trim();
                if name.is_empty() {
                    return Err(DomainError::validation("department name cannot be empty"));
                }
                Ok(vec![DepartmentEvent::DepartmentCreated(DepartmentCreated {
                    tenant_id: cmd.tenant_id,
                    department_id: cmd.department_id,
                    code,
                    name: name.to_string(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            DepartmentCommand::RenameDepartment(cmd) => {
                if !self.created {
                    return Err(DomainError::not_found());
                }
                if self.tenant_id != Some(cmd.tenant_id) {
                    return Err(DomainError::invariant("tenant mismatch"));
                }
                let name = cmd.name.trim();
                if name.is_empty() {
                    return Err(DomainError::validation("department name cannot be empty"));
                }
                if name == self.name {
                    return Ok(vec![]);
                }
                Ok(vec![DepartmentEvent::DepartmentRenamed(DepartmentRenamed {
                    tenant_id: cmd.tenant_id,
                    department_id: cmd.department_id,
                    name: name.to_string(),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estateerp_events::execute;

    #[test]
    fn rename_to_same_name_is_a_no_op() {
        let tenant_id = TenantId::new();
        let department_id = DepartmentId::generate();
        let mut dept = Department::empty(department_id);
        execute(
            &mut dept,
            &DepartmentCommand::CreateDepartment(CreateDepartment {
                tenant_id,
                department_id,
                code: " site ".to_string(),
                name: "Site Engineering".to_string(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(dept.code(), "SITE");

        let rename = |name: &str| {
            DepartmentCommand::RenameDepartment(RenameDepartment {
                tenant_id,
                department_id,
                name: name.to_string(),
                occurred_at: Utc::now(),
            })
        };
        assert!(execute(&mut dept, &rename("Site Engineering")).unwrap().is_empty());
        execute(&mut dept, &rename("Projects")).unwrap();
        assert_eq!(dept.name(), "Projects");
        assert_eq!(dept.version(), 2);
    }
}
