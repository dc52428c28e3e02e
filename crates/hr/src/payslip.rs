use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use estateerp_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, Paise, TenantId, define_aggregate_id,
};
use estateerp_events::Event;

use crate::employee::EmployeeId;
use crate::payroll::{PayPeriod, PayslipBreakdown, SalaryStructure, compute_payslip};

define_aggregate_id!(
    /// Payslip identifier; one per employee and pay period.
    PayslipId
);

impl PayslipId {
    pub fn for_period(employee_id: EmployeeId, period: PayPeriod) -> Self {
        Self(AggregateId::derived("payslip", &format!("{employee_id}:{period}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayslipStatus {
    Draft,
    Approved,
    Paid,
}

/// Aggregate root: Payslip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payslip {
    id: PayslipId,
    tenant_id: Option<TenantId>,
    employee_id: Option<EmployeeId>,
    period: Option<PayPeriod>,
    breakdown: PayslipBreakdown,
    status: PayslipStatus,
    version: u64,
    created: bool,
}

impl Payslip {
    pub fn empty(id: PayslipId) -> Self {
        Self {
            id,
            tenant_id: None,
            employee_id: None,
            period: None,
            breakdown: PayslipBreakdown::default(),
            status: PayslipStatus::Draft,
            version: 0,
            created: false,
        }
    }

    pub fn employee_id(&self) -> Option<EmployeeId> {
        self.employee_id
    }

    pub fn period(&self) -> Option<PayPeriod> {
        self.period
    }

    pub fn breakdown(&self) -> &PayslipBreakdown {
        &self.breakdown
    }

    pub fn status(&self) -> PayslipStatus {
        self.status
    }
}

impl AggregateRoot for Payslip {
    type Id = PayslipId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Carries the employee snapshot the service read at generation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratePayslip {
    pub tenant_id: TenantId,
    pub payslip_id: PayslipId,
    pub employee_id: EmployeeId,
    pub employee_code: String,
    pub employee_name: String,
    pub joined_on: NaiveDate,
    pub terminated_on: Option<NaiveDate>,
    pub period: PayPeriod,
    pub structure: SalaryStructure,
    pub working_days: u32,
    pub paid_days: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovePayslip {
    pub tenant_id: TenantId,
    pub payslip_id: PayslipId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPayslipPaid {
    pub tenant_id: TenantId,
    pub payslip_id: PayslipId,
    pub paid_on: NaiveDate,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayslipCommand {
    GeneratePayslip(GeneratePayslip),
    ApprovePayslip(ApprovePayslip),
    MarkPayslipPaid(MarkPayslipPaid),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayslipGenerated {
    pub tenant_id: TenantId,
    pub payslip_id: PayslipId,
    pub employee_id: EmployeeId,
    pub employee_code: String,
    pub employee_name: String,
    pub period: PayPeriod,
    pub breakdown: PayslipBreakdown,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayslipApproved {
    pub tenant_id: TenantId,
    pub payslip_id: PayslipId,
    pub employee_id: EmployeeId,
    pub period: PayPeriod,
    pub breakdown: PayslipBreakdown,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayslipPaid {
    pub tenant_id: TenantId,
    pub payslip_id: PayslipId,
    pub employee_id: EmployeeId,
    pub period: PayPeriod,
    pub net: Paise,
    pub paid_on: NaiveDate,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayslipEvent {
    PayslipGenerated(PayslipGenerated),
    PayslipApproved(PayslipApproved),
    PayslipPaid(PayslipPaid),
}

impl Event for PayslipEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PayslipEvent::PayslipGenerated(_) => "hr.payslip.generated",
            PayslipEvent::PayslipApproved(_) => "hr.payslip.approved",
            PayslipEvent::PayslipPaid(_) => "hr.payslip.paid",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PayslipEvent::PayslipGenerated(e) => e.occurred_at,
            PayslipEvent::PayslipApproved(e) => e.occurred_at,
            PayslipEvent::PayslipPaid(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Payslip {
    type Command = PayslipCommand;
    type Event = PayslipEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PayslipEvent::PayslipGenerated(e) => {
                self.id = e.payslip_id;
                self.tenant_id = Some(e.tenant_id);
                self.employee_id = Some(e.employee_id);
                self.period = Some(e.period);
                self.breakdown = e.breakdown.clone();
                self.status = PayslipStatus::Draft;
                self.created = true;
            }
            PayslipEvent::PayslipApproved(_) => {
                self.status = PayslipStatus::Approved;
            }
            PayslipEvent::PayslipPaid(_) => {
                self.status = PayslipStatus::Paid;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PayslipCommand::GeneratePayslip(cmd) => self.handle_generate(cmd),
            PayslipCommand::ApprovePayslip(cmd) => self.handle_approve(cmd),
            PayslipCommand::MarkPayslipPaid(cmd) => self.handle_paid(cmd),
        }
    }
}

impl Payslip {
    fn ensure_existing(&self, tenant_id: TenantId, payslip_id: PayslipId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != payslip_id {
            return Err(DomainError::invariant("payslip_id mismatch"));
        }
        Ok(())
    }

    fn handle_generate(&self, cmd: &GeneratePayslip) -> Result<Vec<PayslipEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict(format!(
                "payslip for {} already generated for {}",
                cmd.employee_code, cmd.period
            )));
        }
        if cmd.payslip_id != PayslipId::for_period(cmd.employee_id, cmd.period) {
            return Err(DomainError::invariant("payslip id does not match employee and period"));
        }
        if cmd.terminated_on.is_some_and(|t| t < cmd.period.first_day()) {
            return Err(DomainError::invariant(format!(
                "employee {} was terminated before {}",
                cmd.employee_code, cmd.period
            )));
        }
        if cmd.joined_on > cmd.period.last_day() {
            return Err(DomainError::invariant(format!(
                "employee {} joined after {}",
                cmd.employee_code, cmd.period
            )));
        }

        Ok(vec![PayslipEvent::PayslipGenerated(PayslipGenerated {
            tenant_id: cmd.tenant_id,
            payslip_id: cmd.payslip_id,
            employee_id: cmd.employee_id,
            employee_code: cmd.employee_code.clone(),
            employee_name: cmd.employee_name.clone(),
            period: cmd.period,
            breakdown: compute_payslip(&cmd.structure, cmd.working_days, cmd.paid_days, cmd.period)?,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApprovePayslip) -> Result<Vec<PayslipEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.payslip_id)?;
        if self.status != PayslipStatus::Draft {
            return Err(DomainError::invariant("only draft payslips can be approved"));
        }
        let (employee_id, period) = self.employee_id.zip(self.period).ok_or_else(DomainError::not_found)?;
        Ok(vec![PayslipEvent::PayslipApproved(PayslipApproved {
            tenant_id: cmd.tenant_id,
            payslip_id: cmd.payslip_id,
            employee_id,
            period,
            breakdown: self.breakdown.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_paid(&self, cmd: &MarkPayslipPaid) -> Result<Vec<PayslipEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.payslip_id)?;
        match self.status {
            PayslipStatus::Approved => {}
            PayslipStatus::Draft => {
                return Err(DomainError::invariant("payslip must be approved before payment"));
            }
            PayslipStatus::Paid => return Err(DomainError::conflict("payslip is already paid")),
        }
        let (employee_id, period) = self.employee_id.zip(self.period).ok_or_else(DomainError::not_found)?;
        Ok(vec![PayslipEvent::PayslipPaid(PayslipPaid {
            tenant_id: cmd.tenant_id,
            payslip_id: cmd.payslip_id,
            employee_id,
            period,
            net: self.breakdown.net,
            paid_on: cmd.paid_on,
            reference: cmd.reference.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estateerp_events::execute;

    fn generate(
        tenant_id: TenantId,
        employee_id: EmployeeId,
        period: PayPeriod,
        terminated_on: Option<NaiveDate>,
    ) -> PayslipCommand {
        PayslipCommand::GeneratePayslip(GeneratePayslip {
            tenant_id,
            payslip_id: PayslipId::for_period(employee_id, period),
            employee_id,
            employee_code: "EMP-001".to_string(),
            employee_name: "Ravi Kumar".to_string(),
            joined_on: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            terminated_on,
            period,
            structure: SalaryStructure {
                basic: 25_000_00,
                hra: 10_000_00,
                special_allowance: 5_000_00,
                other_allowance: 0,
                pf_enrolled: true,
            },
            working_days: 30,
            paid_days: 30,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn payslip_ids_are_stable_per_employee_and_period() {
        let employee_id = EmployeeId::generate();
        let period: PayPeriod = "2026-04".parse().unwrap();
        assert_eq!(PayslipId::for_period(employee_id, period), PayslipId::for_period(employee_id, period));
        assert_ne!(
            PayslipId::for_period(employee_id, period),
            PayslipId::for_period(employee_id, "2026-05".parse().unwrap())
        );
    }

    #[test]
    fn generate_twice_conflicts() {
        let tenant_id = TenantId::new();
        let employee_id = EmployeeId::generate();
        let period: PayPeriod = "2026-04".parse().unwrap();
        let mut slip = Payslip::empty(PayslipId::for_period(employee_id, period));

        execute(&mut slip, &generate(tenant_id, employee_id, period, None)).unwrap();
        assert_eq!(slip.breakdown().gross, 40_000_00);
        let err = slip.handle(&generate(tenant_id, employee_id, period, None)).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn terminated_before_period_is_rejected() {
        let tenant_id = TenantId::new();
        let employee_id = EmployeeId::generate();
        let period: PayPeriod = "2026-04".parse().unwrap();
        let slip = Payslip::empty(PayslipId::for_period(employee_id, period));

        let left_in_march = NaiveDate::from_ymd_opt(2026, 3, 31);
        assert!(slip.handle(&generate(tenant_id, employee_id, period, left_in_march)).is_err());
        let left_mid_april = NaiveDate::from_ymd_opt(2026, 4, 15);
        assert!(slip.handle(&generate(tenant_id, employee_id, period, left_mid_april)).is_ok());
    }

    #[test]
    fn must_be_approved_before_paid() {
        let tenant_id = TenantId::new();
        let employee_id = EmployeeId::generate();
        let period: PayPeriod = "2026-04".parse().unwrap();
        let payslip_id = PayslipId::for_period(employee_id, period);
        let mut slip = Payslip::empty(payslip_id);
        execute(&mut slip, &generate(tenant_id, employee_id, period, None)).unwrap();

        let pay = PayslipCommand::MarkPayslipPaid(MarkPayslipPaid {
            tenant_id,
            payslip_id,
            paid_on: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            reference: Some("NEFT-4411".to_string()),
            occurred_at: Utc::now(),
        });
        assert!(slip.handle(&pay).is_err());

        execute(
            &mut slip,
            &PayslipCommand::ApprovePayslip(ApprovePayslip {
                tenant_id,
                payslip_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        let events = execute(&mut slip, &pay).unwrap();
        assert!(matches!(&events[0], PayslipEvent::PayslipPaid(p) if p.net == slip.breakdown().net));
        assert_eq!(slip.status(), PayslipStatus::Paid);
    }
}
