use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use estateerp_core::{Paise, TenantId};
use estateerp_events::EventEnvelope;
use estateerp_hr::{
    DepartmentEvent, DepartmentId, EmployeeEvent, EmployeeId, PayPeriod, PayslipBreakdown,
    PayslipEvent, PayslipId, PayslipStatus, SalaryStructure,
};

use super::{Projection, ProjectionError, StreamCursors, decode, ensure_scope};
use crate::read_model::{InMemoryTenantStore, TenantStore};
use crate::streams;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepartmentReadModel {
    pub department_id: DepartmentId,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmployeeReadModel {
    pub employee_id: EmployeeId,
    pub code: String,
    pub name: String,
    pub email: Option<String>,
    pub department_id: DepartmentId,
    pub designation: String,
    pub joined_on: NaiveDate,
    /// Latest salary structure, whatever its effective date.
    pub salary: SalaryStructure,
    pub salary_effective_from: NaiveDate,
    pub active: bool,
    pub terminated_on: Option<NaiveDate>,
    pub termination_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayslipReadModel {
    pub payslip_id: PayslipId,
    pub employee_id: EmployeeId,
    pub employee_code: String,
    pub employee_name: String,
    pub period: PayPeriod,
    pub breakdown: PayslipBreakdown,
    pub status: PayslipStatus,
    pub paid_on: Option<NaiveDate>,
    pub reference: Option<String>,
    pub generated_at: DateTime<Utc>,
}

/// Totals of one month's payslips.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PayrollSummary {
    pub payslips: usize,
    pub gross: Paise,
    pub pf: Paise,
    pub esi: Paise,
    pub professional_tax: Paise,
    pub net: Paise,
    pub paid: usize,
}

/// Departments, employees and payslips.
#[derive(Debug, Default)]
pub struct HrProjection {
    departments: InMemoryTenantStore<DepartmentId, DepartmentReadModel>,
    employees: InMemoryTenantStore<EmployeeId, EmployeeReadModel>,
    payslips: InMemoryTenantStore<PayslipId, PayslipReadModel>,
    cursors: StreamCursors,
}

impl HrProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn department(&self, tenant_id: TenantId, id: &DepartmentId) -> Option<DepartmentReadModel> {
        self.departments.get(tenant_id, id)
    }

    pub fn departments(&self, tenant_id: TenantId) -> Vec<DepartmentReadModel> {
        let mut out = self.departments.list(tenant_id);
        out.sort_by(|a, b| a.code.cmp(&b.code));
        out
    }

    pub fn employee(&self, tenant_id: TenantId, id: &EmployeeId) -> Option<EmployeeReadModel> {
        self.employees.get(tenant_id, id)
    }

    /// Employees by code, optionally within one department and only active ones.
    pub fn employees(
        &self,
        tenant_id: TenantId,
        department_id: Option<DepartmentId>,
        active_only: bool,
    ) -> Vec<EmployeeReadModel> {
        let mut out: Vec<_> = self
            .employees
            .list(tenant_id)
            .into_iter()
            .filter(|e| department_id.is_none_or(|d| e.department_id == d))
            .filter(|e| e.active || !active_only)
            .collect();
        out.sort_by(|a, b| a.code.cmp(&b.code));
        out
    }

    pub fn payslip(&self, tenant_id: TenantId, id: &PayslipId) -> Option<PayslipReadModel> {
        self.payslips.get(tenant_id, id)
    }

    pub fn payslips(
        &self,
        tenant_id: TenantId,
        period: Option<PayPeriod>,
        employee_id: Option<EmployeeId>,
    ) -> Vec<PayslipReadModel> {
        let mut out: Vec<_> = self
            .payslips
            .list(tenant_id)
            .into_iter()
            .filter(|p| period.is_none_or(|x| p.period == x))
            .filter(|p| employee_id.is_none_or(|x| p.employee_id == x))
            .collect();
        out.sort_by(|a, b| (a.period, &a.employee_code).cmp(&(b.period, &b.employee_code)));
        out
    }

    pub fn payroll_summary(&self, tenant_id: TenantId, period: PayPeriod) -> PayrollSummary {
        let mut summary = PayrollSummary::default();
        for slip in self.payslips(tenant_id, Some(period), None) {
            summary.payslips += 1;
            summary.gross += slip.breakdown.gross;
            summary.pf += slip.breakdown.pf;
            summary.esi += slip.breakdown.esi;
            summary.professional_tax += slip.breakdown.professional_tax;
            summary.net += slip.breakdown.net;
            if slip.status == PayslipStatus::Paid {
                summary.paid += 1;
            }
        }
        summary
    }

    fn apply_department(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        match decode::<DepartmentEvent>(envelope)? {
            DepartmentEvent::DepartmentCreated(e) => {
                ensure_scope(envelope, e.tenant_id, e.department_id.0)?;
                self.departments.upsert(
                    tenant_id,
                    e.department_id,
                    DepartmentReadModel {
                        department_id: e.department_id,
                        code: e.code,
                        name: e.name,
                    },
                );
            }
            DepartmentEvent::DepartmentRenamed(e) => {
                ensure_scope(envelope, e.tenant_id, e.department_id.0)?;
                self.departments.update(tenant_id, e.department_id, |slot| {
                    if let Some(d) = slot {
                        d.name = e.name;
                    }
                });
            }
        }
        Ok(())
    }

    fn apply_employee(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        match decode::<EmployeeEvent>(envelope)? {
            EmployeeEvent::EmployeeHired(e) => {
                ensure_scope(envelope, e.tenant_id, e.employee_id.0)?;
                self.employees.upsert(
                    tenant_id,
                    e.employee_id,
                    EmployeeReadModel {
                        employee_id: e.employee_id,
                        code: e.code,
                        name: e.name,
                        email: e.email,
                        department_id: e.department_id,
                        designation: e.designation,
                        joined_on: e.joined_on,
                        salary: e.salary,
                        salary_effective_from: e.joined_on,
                        active: true,
                        terminated_on: None,
                        termination_reason: None,
                    },
                );
            }
            EmployeeEvent::SalaryRevised(e) => {
                ensure_scope(envelope, e.tenant_id, e.employee_id.0)?;
                self.employees.update(tenant_id, e.employee_id, |slot| {
                    if let Some(emp) = slot {
                        if e.effective_from >= emp.salary_effective_from {
                            emp.salary = e.salary;
                            emp.salary_effective_from = e.effective_from;
                        }
                    }
                });
            }
            EmployeeEvent::EmployeeTransferred(e) => {
                ensure_scope(envelope, e.tenant_id, e.employee_id.0)?;
                self.employees.update(tenant_id, e.employee_id, |slot| {
                    if let Some(emp) = slot {
                        emp.department_id = e.to_department;
                        emp.designation = e.designation;
                    }
                });
            }
            EmployeeEvent::EmployeeTerminated(e) => {
                ensure_scope(envelope, e.tenant_id, e.employee_id.0)?;
                self.employees.update(tenant_id, e.employee_id, |slot| {
                    if let Some(emp) = slot {
                        emp.active = false;
                        emp.terminated_on = Some(e.on);
                        emp.termination_reason = e.reason;
                    }
                });
            }
        }
        Ok(())
    }

    fn apply_payslip(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let tenant_id = envelope.tenant_id();
        match decode::<PayslipEvent>(envelope)? {
            PayslipEvent::PayslipGenerated(e) => {
                ensure_scope(envelope, e.tenant_id, e.payslip_id.0)?;
                self.payslips.upsert(
                    tenant_id,
                    e.payslip_id,
                    PayslipReadModel {
                        payslip_id: e.payslip_id,
                        employee_id: e.employee_id,
                        employee_code: e.employee_code,
                        employee_name: e.employee_name,
                        period: e.period,
                        breakdown: e.breakdown,
                        status: PayslipStatus::Draft,
                        paid_on: None,
                        reference: None,
                        generated_at: e.occurred_at,
                    },
                );
            }
            PayslipEvent::PayslipApproved(e) => {
                ensure_scope(envelope, e.tenant_id, e.payslip_id.0)?;
                self.payslips.update(tenant_id, e.payslip_id, |slot| {
                    if let Some(p) = slot {
                        p.status = PayslipStatus::Approved;
                    }
                });
            }
            PayslipEvent::PayslipPaid(e) => {
                ensure_scope(envelope, e.tenant_id, e.payslip_id.0)?;
                self.payslips.update(tenant_id, e.payslip_id, |slot| {
                    if let Some(p) = slot {
                        p.status = PayslipStatus::Paid;
                        p.paid_on = Some(e.paid_on);
                        p.reference = e.reference;
                    }
                });
            }
        }
        Ok(())
    }
}

impl Projection for HrProjection {
    fn name(&self) -> &'static str {
        "hr"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let kind = envelope.aggregate_type();
        if !matches!(kind, streams::DEPARTMENT | streams::EMPLOYEE | streams::PAYSLIP) {
            return Ok(());
        }
        if !self.cursors.admit(envelope)? {
            return Ok(());
        }
        match kind {
            streams::DEPARTMENT => self.apply_department(envelope)?,
            streams::EMPLOYEE => self.apply_employee(envelope)?,
            _ => self.apply_payslip(envelope)?,
        }
        self.cursors.advance(envelope);
        Ok(())
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        self.departments.clear_tenant(tenant_id);
        self.employees.clear_tenant(tenant_id);
        self.payslips.clear_tenant(tenant_id);
        self.cursors.clear_tenant(tenant_id);
    }
}
