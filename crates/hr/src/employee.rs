use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use estateerp_core::{Aggregate, AggregateRoot, DomainError, TenantId, define_aggregate_id};
use estateerp_events::Event;

use crate::department::DepartmentId;
use crate::payroll::SalaryStructure;

define_aggregate_id!(
    /// Employee identifier.
    EmployeeId
);

/// One salary revision; the latest one effective on a date applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalaryRevision {
    pub effective_from: NaiveDate,
    pub salary: SalaryStructure,
}

/// Aggregate root: Employee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Employee {
    id: EmployeeId,
    tenant_id: Option<TenantId>,
    code: String,
    name: String,
    email: Option<String>,
    department_id: Option<DepartmentId>,
    designation: String,
    joined_on: Option<NaiveDate>,
    terminated_on: Option<NaiveDate>,
    salary_history: Vec<SalaryRevision>,
    version: u64,
    created: bool,
}

impl Employee {
    pub fn empty(id: EmployeeId) -> Self {
        Self {
            id,
            tenant_id: None,
            code: String::new(),
            name: String::new(),
            email: None,
            department_id: None,
            designation: String::new(),
            joined_on: None,
            terminated_on: None,
            salary_history: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn is_created(&self) -> bool {
        self.created
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

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn department_id(&self) -> Option<DepartmentId> {
        self.department_id
    }

    pub fn designation(&self) -> &str {
        &self.designation
    }

    pub fn joined_on(&self) -> Option<NaiveDate> {
        self.joined_on
    }

    pub fn terminated_on(&self) -> Option<NaiveDate> {
        self.terminated_on
    }

    pub fn is_active(&self) -> bool {
        self.created && self.terminated_on.is_none()
    }

    pub fn salary_history(&self) -> &[SalaryRevision] {
        &self.salary_history
    }

    /// Salary structure in force on `date`.
    pub fn salary_on(&self, date: NaiveDate) -> Option<&SalaryStructure> {
        self.salary_history
            .iter()
            .filter(|r| r.effective_from <= date)
            .max_by_key(|r| r.effective_from)
            .map(|r| &r.salary)
    }
}

impl AggregateRoot for Employee {
    type Id = EmployeeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HireEmployee {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub code: String,
    pub name: String,
    pub email: Option<String>,
    pub department_id: DepartmentId,
    pub designation: String,
    pub joined_on: NaiveDate,
    pub salary: SalaryStructure,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviseSalary {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub effective_from: NaiveDate,
    pub salary: SalaryStructure,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEmployee {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub department_id: DepartmentId,
    pub designation: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminateEmployee {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub on: NaiveDate,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmployeeCommand {
    HireEmployee(HireEmployee),
    ReviseSalary(ReviseSalary),
    TransferEmployee(TransferEmployee),
    TerminateEmployee(TerminateEmployee),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeHired {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub code: String,
    pub name: String,
    pub email: Option<String>,
    pub department_id: DepartmentId,
    pub designation: String,
    pub joined_on: NaiveDate,
    pub salary: SalaryStructure,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalaryRevised {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub effective_from: NaiveDate,
    pub salary: SalaryStructure,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeTransferred {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub from_department: Option<DepartmentId>,
    pub to_department: DepartmentId,
    pub designation: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeTerminated {
    pub tenant_id: TenantId,
    pub employee_id: EmployeeId,
    pub on: NaiveDate,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmployeeEvent {
    EmployeeHired(EmployeeHired),
    SalaryRevised(SalaryRevised),
    EmployeeTransferred(EmployeeTransferred),
    EmployeeTerminated(EmployeeTerminated),
}

impl Event for EmployeeEvent {
    fn event_type(&self) -> &'static str {
        match self {
            EmployeeEvent::EmployeeHired(_) => "hr.employee.hired",
            EmployeeEvent::SalaryRevised(_) => "hr.employee.salary_revised",
            EmployeeEvent::EmployeeTransferred(_) => "hr.employee.transferred",
            EmployeeEvent::EmployeeTerminated(_) => "hr.employee.terminated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            EmployeeEvent::EmployeeHired(e) => e.occurred_at,
            EmployeeEvent::SalaryRevised(e) => e.occurred_at,
            EmployeeEvent::EmployeeTransferred(e) => e.occurred_at,
            EmployeeEvent::EmployeeTerminated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Employee {
    type Command = EmployeeCommand;
    type Event = EmployeeEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            EmployeeEvent::EmployeeHired(e) => {
                self.id = e.employee_id;
                self.tenant_id = Some(e.tenant_id);
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.email = e.email.clone();
                self.department_id = Some(e.department_id);
                self.designation = e.designation.clone();
                self.joined_on = Some(e.joined_on);
                self.salary_history = vec![SalaryRevision {
                    effective_from: e.joined_on,
                    salary: e.salary.clone(),
                }];
                self.created = true;
            }
            EmployeeEvent::SalaryRevised(e) => {
                self.salary_history.retain(|r| r.effective_from != e.effective_from);
                self.salary_history.push(SalaryRevision {
                    effective_from: e.effective_from,
                    salary: e.salary.clone(),
                });
                self.salary_history.sort_by_key(|r| r.effective_from);
            }
            EmployeeEvent::EmployeeTransferred(e) => {
                self.department_id = Some(e.to_department);
                self.designation = e.designation.clone();
            }
            EmployeeEvent::EmployeeTerminated(e) => {
                self.terminated_on = Some(e.on);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            EmployeeCommand::HireEmployee(cmd) => self.handle_hire(cmd),
            EmployeeCommand::ReviseSalary(cmd) => self.handle_revise(cmd),
            EmployeeCommand::TransferEmployee(cmd) => self.handle_transfer(cmd),
            EmployeeCommand::TerminateEmployee(cmd) => self.handle_terminate(cmd),
        }
    }
}

impl Employee {
    /// Existing, same tenant, not terminated.
    fn ensure_active(&self, tenant_id: TenantId, employee_id: EmployeeId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != employee_id {
            return Err(DomainError::invariant("employee_id mismatch"));
        }
        if self.terminated_on.is_some() {
            return Err(DomainError::invariant("employee has been terminated"));
        }
        Ok(())
    }

    fn handle_hire(&self, cmd: &HireEmployee) -> Result<Vec<EmployeeEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("employee already exists"));
        }
        let code = cmd.code.trim().to_ascii_uppercase();
        if code.is_empty() {
            return Err(DomainError::validation("employee code cannot be empty"));
        }
        let name = cmd.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("employee name cannot be empty"));
        }
        let email = cmd.email.as_deref().map(str::trim).filter(|e| !e.is_empty());
        if let Some(email) = email.filter(|e| !e.contains('@')) {
            return Err(DomainError::validation(format!("invalid email: {email}")));
        }
        cmd.salary.validate()?;

        Ok(vec![EmployeeEvent::EmployeeHired(EmployeeHired {
            tenant_id: cmd.tenant_id,
            employee_id: cmd.employee_id,
            code,
            name: name.to_string(),
            email: email.map(str::to_ascii_lowercase),
            department_id: cmd.department_id,
            designation: cmd.designation.trim().to_string(),
            joined_on: cmd.joined_on,
            salary: cmd.salary.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revise(&self, cmd: &ReviseSalary) -> Result<Vec<EmployeeEvent>, DomainError> {
        self.ensure_active(cmd.tenant_id, cmd.employee_id)?;
        cmd.salary.validate()?;
        if self.joined_on.is_some_and(|joined| cmd.effective_from < joined) {
            return Err(DomainError::validation("revision cannot predate the joining date"));
        }
        Ok(vec![EmployeeEvent::SalaryRevised(SalaryRevised {
            tenant_id: cmd.tenant_id,
            employee_id: cmd.employee_id,
            effective_from: cmd.effective_from,
            salary: cmd.salary.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_transfer(&self, cmd: &TransferEmployee) -> Result<Vec<EmployeeEvent>, DomainError> {
        self.ensure_active(cmd.tenant_id, cmd.employee_id)?;
        let designation = cmd
            .designation
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(&self.designation)
            .to_string();
        if self.department_id == Some(cmd.department_id) && designation == self.designation {
            return Ok(vec![]);
        }
        Ok(vec![EmployeeEvent::EmployeeTransferred(EmployeeTransferred {
            tenant_id: cmd.tenant_id,
            employee_id: cmd.employee_id,
            from_department: self.department_id,
            to_department: cmd.department_id,
            designation,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_terminate(&self, cmd: &TerminateEmployee) -> Result<Vec<EmployeeEvent>, DomainError> {
        self.ensure_active(cmd.tenant_id, cmd.employee_id)?;
        if self.joined_on.is_some_and(|joined| cmd.on < joined) {
            return Err(DomainError::validation("termination date precedes the joining date"));
        }
        Ok(vec![EmployeeEvent::EmployeeTerminated(EmployeeTerminated {
            tenant_id: cmd.tenant_id,
            employee_id: cmd.employee_id,
            on: cmd.on,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estateerp_events::execute;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn salary(basic: i64) -> SalaryStructure {
        SalaryStructure {
            basic,
            hra: basic / 2,
            pf_enrolled: true,
            ..SalaryStructure::default()
        }
    }

    fn hired() -> (Employee, TenantId, EmployeeId) {
        let tenant_id = TenantId::new();
        let employee_id = EmployeeId::generate();
        let mut employee = Employee::empty(employee_id);
        execute(
            &mut employee,
            &EmployeeCommand::HireEmployee(HireEmployee {
                tenant_id,
                employee_id,
                code: "emp-007".to_string(),
                name: "Priya Nair".to_string(),
                email: Some("Priya@Example.com".to_string()),
                department_id: DepartmentId::generate(),
                designation: "Site Engineer".to_string(),
                joined_on: date(2025, 6, 1),
                salary: salary(30_000_00),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        (employee, tenant_id, employee_id)
    }

    #[test]
    fn salary_on_picks_latest_effective_revision() {
        let (mut employee, tenant_id, employee_id) = hired();
        execute(
            &mut employee,
            &EmployeeCommand::ReviseSalary(ReviseSalary {
                tenant_id,
                employee_id,
                effective_from: date(2026, 4, 1),
                salary: salary(36_000_00),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();

        assert_eq!(employee.salary_on(date(2026, 3, 31)).map(|s| s.basic), Some(30_000_00));
        assert_eq!(employee.salary_on(date(2026, 4, 1)).map(|s| s.basic), Some(36_000_00));
        assert_eq!(employee.salary_on(date(2025, 5, 31)), None);
        assert_eq!(employee.email(), Some("priya@example.com"));
    }

    #[test]
    fn termination_is_terminal_and_dated_after_joining() {
        let (mut employee, tenant_id, employee_id) = hired();
        let terminate = |on| {
            EmployeeCommand::TerminateEmployee(TerminateEmployee {
                tenant_id,
                employee_id,
                on,
                reason: Some("resigned".to_string()),
                occurred_at: Utc::now(),
            })
        };

        assert!(employee.handle(&terminate(date(2025, 5, 1))).is_err());
        execute(&mut employee, &terminate(date(2026, 8, 31))).unwrap();
        assert!(!employee.is_active());
        assert!(employee.handle(&terminate(date(2026, 9, 30))).is_err());

        let transfer = EmployeeCommand::TransferEmployee(TransferEmployee {
            tenant_id,
            employee_id,
            department_id: DepartmentId::generate(),
            designation: None,
            occurred_at: Utc::now(),
        });
        assert!(employee.handle(&transfer).is_err());
    }
}
