use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;

use estateerp_core::DomainError;
use estateerp_hr::{
    ApprovePayslip, CreateDepartment, Department, DepartmentCommand, DepartmentId, Employee,
    EmployeeCommand, EmployeeId, GeneratePayslip, HireEmployee, MarkPayslipPaid, PayPeriod,
    Payslip, PayslipCommand, PayslipId, RenameDepartment, ReviseSalary, TerminateEmployee,
    TransferEmployee,
};
use estateerp_infra::event_store::StoredEvent;
use estateerp_infra::streams;
use estateerp_infra::workflows::post_payslip_events;

use super::common::{accepted, authorized, created, items, json, parse_id, require, today};
use crate::app::dto::{self, Body};
use crate::app::errors::{
    ApiResult, dispatch_error_to_response, json_error, not_found, validation,
    workflow_error_to_response,
};
use crate::context::RequestCtx;

pub fn router() -> Router {
    Router::new()
        .route("/departments", post(create_department).get(list_departments))
        .route("/departments/:id", get(get_department).put(rename_department))
        .route("/employees", post(hire_employee).get(list_employees))
        .route("/employees/:id", get(get_employee))
        .route("/employees/:id/salary", post(revise_salary))
        .route("/employees/:id/transfer", post(transfer_employee))
        .route("/employees/:id/terminate", post(terminate_employee))
        .route("/payslips", post(generate_payslip).get(list_payslips))
        .route("/payslips/:id", get(get_payslip))
        .route("/payslips/:id/approve", post(approve_payslip))
        .route("/payslips/:id/pay", post(pay_payslip))
        .route("/payroll-summary", get(payroll_summary))
}

fn parse_period(raw: &str) -> Result<PayPeriod, axum::response::Response> {
    raw.parse().map_err(|e: DomainError| validation(e.to_string()))
}

fn ensure_department(ctx: &RequestCtx, department_id: DepartmentId) -> Result<(), axum::response::Response> {
    let department: Department = ctx
        .services
        .load(ctx.tenant_id(), department_id.0, |_, id| Department::empty(DepartmentId::new(id)))
        .map_err(dispatch_error_to_response)?;
    if !department.is_created() {
        return Err(validation(format!("unknown department {department_id}")));
    }
    Ok(())
}

fn dispatch_department(
    ctx: &RequestCtx,
    department_id: DepartmentId,
    cmd: DepartmentCommand,
    permission: &'static str,
) -> Result<Vec<StoredEvent>, axum::response::Response> {
    let cmd = authorized(ctx, cmd, permission)?;
    ctx.services
        .dispatch::<Department>(ctx.tenant_id(), department_id.0, streams::DEPARTMENT, cmd, |_, id| {
            Department::empty(DepartmentId::new(id))
        })
        .map_err(dispatch_error_to_response)
}

fn dispatch_employee(
    ctx: &RequestCtx,
    employee_id: EmployeeId,
    cmd: EmployeeCommand,
    permission: &'static str,
) -> Result<Vec<StoredEvent>, axum::response::Response> {
    let cmd = authorized(ctx, cmd, permission)?;
    ctx.services
        .dispatch::<Employee>(ctx.tenant_id(), employee_id.0, streams::EMPLOYEE, cmd, |_, id| {
            Employee::empty(EmployeeId::new(id))
        })
        .map_err(dispatch_error_to_response)
}

fn dispatch_payslip(
    ctx: &RequestCtx,
    payslip_id: PayslipId,
    cmd: PayslipCommand,
    permission: &'static str,
) -> Result<Vec<StoredEvent>, axum::response::Response> {
    let cmd = authorized(ctx, cmd, permission)?;
    ctx.services
        .dispatch::<Payslip>(ctx.tenant_id(), payslip_id.0, streams::PAYSLIP, cmd, |_, id| {
            Payslip::empty(PayslipId::new(id))
        })
        .map_err(dispatch_error_to_response)
}

async fn create_department(ctx: RequestCtx, Body(body): Body<dto::CreateDepartmentRequest>) -> ApiResult {
    let department_id = DepartmentId::generate();
    let cmd = DepartmentCommand::CreateDepartment(CreateDepartment {
        tenant_id: ctx.tenant_id(),
        department_id,
        code: body.code,
        name: body.name,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_department(&ctx, department_id, cmd, "hr.departments.manage")?;
    Ok(created(department_id, &committed))
}

async fn list_departments(ctx: RequestCtx) -> ApiResult {
    require(&ctx, "hr.read")?;
    Ok(items(ctx.services.read_models.hr.departments(ctx.tenant_id())))
}

async fn get_department(ctx: RequestCtx, Path(id): Path<String>) -> ApiResult {
    require(&ctx, "hr.read")?;
    let department_id: DepartmentId = parse_id(&id, "department id")?;
    let hr = &ctx.services.read_models.hr;
    let department = hr
        .department(ctx.tenant_id(), &department_id)
        .ok_or_else(|| not_found(format!("department {department_id}")))?;
    let employees = hr.employees(ctx.tenant_id(), Some(department_id), false);
    Ok(json(serde_json::json!({ "department": department, "employees": employees })))
}

async fn rename_department(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Body(body): Body<dto::RenameRequest>,
) -> ApiResult {
    let department_id: DepartmentId = parse_id(&id, "department id")?;
    let cmd = DepartmentCommand::RenameDepartment(RenameDepartment {
        tenant_id: ctx.tenant_id(),
        department_id,
        name: body.name,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_department(&ctx, department_id, cmd, "hr.departments.manage")?;
    Ok(accepted(department_id, &committed))
}

async fn hire_employee(ctx: RequestCtx, Body(body): Body<dto::HireEmployeeRequest>) -> ApiResult {
    require(&ctx, "hr.employees.manage")?;
    let department_id: DepartmentId = parse_id(&body.department_id, "department id")?;
    ensure_department(&ctx, department_id)?;

    let employee_id = EmployeeId::generate();
    let cmd = EmployeeCommand::HireEmployee(HireEmployee {
        tenant_id: ctx.tenant_id(),
        employee_id,
        code: body.code,
        name: body.name,
        email: body.email,
        department_id,
        designation: body.designation,
        joined_on: body.joined_on,
        salary: body.salary,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_employee(&ctx, employee_id, cmd, "hr.employees.manage")?;
    Ok(created(employee_id, &committed))
}

async fn list_employees(ctx: RequestCtx, Query(q): Query<dto::EmployeeListQuery>) -> ApiResult {
    require(&ctx, "hr.read")?;
    let department_id = q
        .department_id
        .as_deref()
        .map(|raw| parse_id::<DepartmentId>(raw, "department id"))
        .transpose()?;
    Ok(items(ctx.services.read_models.hr.employees(ctx.tenant_id(), department_id, q.active_only)))
}

async fn get_employee(ctx: RequestCtx, Path(id): Path<String>) -> ApiResult {
    require(&ctx, "hr.read")?;
    let employee_id: EmployeeId = parse_id(&id, "employee id")?;
    ctx.services
        .read_models
        .hr
        .employee(ctx.tenant_id(), &employee_id)
        .map(json)
        .ok_or_else(|| not_found(format!("employee {employee_id}")))
}

async fn revise_salary(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Body(body): Body<dto::ReviseSalaryRequest>,
) -> ApiResult {
    let employee_id: EmployeeId = parse_id(&id, "employee id")?;
    let cmd = EmployeeCommand::ReviseSalary(ReviseSalary {
        tenant_id: ctx.tenant_id(),
        employee_id,
        effective_from: body.effective_from,
        salary: body.salary,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_employee(&ctx, employee_id, cmd, "hr.employees.manage")?;
    Ok(accepted(employee_id, &committed))
}

async fn transfer_employee(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Body(body): Body<dto::TransferEmployeeRequest>,
) -> ApiResult {
    require(&ctx, "hr.employees.manage")?;
    let employee_id: EmployeeId = parse_id(&id, "employee id")?;
    let department_id: DepartmentId = parse_id(&body.department_id, "department id")?;
    ensure_department(&ctx, department_id)?;
    let cmd = EmployeeCommand::TransferEmployee(TransferEmployee {
        tenant_id: ctx.tenant_id(),
        employee_id,
        department_id,
        designation: body.designation,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_employee(&ctx, employee_id, cmd, "hr.employees.manage")?;
    Ok(accepted(employee_id, &committed))
}

async fn terminate_employee(
    ctx: RequestCtx,
    Path(id): Path<String>,
    Body(body): Body<dto::TerminateEmployeeRequest>,
) -> ApiResult {
    let employee_id: EmployeeId = parse_id(&id, "employee id")?;
    let cmd = EmployeeCommand::TerminateEmployee(TerminateEmployee {
        tenant_id: ctx.tenant_id(),
        employee_id,
        on: body.on,
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_employee(&ctx, employee_id, cmd, "hr.employees.manage")?;
    Ok(accepted(employee_id, &committed))
}

/// Snapshot the employee and the salary in force on the last day of the
/// period. Days default to the whole month.
async fn generate_payslip(ctx: RequestCtx, Body(body): Body<dto::GeneratePayslipRequest>) -> ApiResult {
    require(&ctx, "hr.payroll.run")?;
    let tenant_id = ctx.tenant_id();
    let employee_id: EmployeeId = parse_id(&body.employee_id, "employee id")?;
    let period = parse_period(&body.period)?;

    let employee: Employee = ctx
        .services
        .load(tenant_id, employee_id.0, |_, id| Employee::empty(EmployeeId::new(id)))
        .map_err(dispatch_error_to_response)?;
    let joined_on = match (employee.is_created(), employee.joined_on()) {
        (true, Some(d)) => d,
        _ => return Err(not_found(format!("employee {employee_id}"))),
    };
    let structure = employee.salary_on(period.last_day()).cloned().ok_or_else(|| {
        json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invariant_violation",
            format!("employee {} has no salary in force for {period}", employee.code()),
        )
    })?;
    let working_days = body.working_days.unwrap_or_else(|| period.days());
    let paid_days = body.paid_days.unwrap_or(working_days);

    let payslip_id = PayslipId::for_period(employee_id, period);
    let cmd = PayslipCommand::GeneratePayslip(GeneratePayslip {
        tenant_id,
        payslip_id,
        employee_id,
        employee_code: employee.code().to_string(),
        employee_name: employee.name().to_string(),
        joined_on,
        terminated_on: employee.terminated_on(),
        period,
        structure,
        working_days,
        paid_days,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_payslip(&ctx, payslip_id, cmd, "hr.payroll.run")?;
    Ok(created(payslip_id, &committed))
}

async fn list_payslips(ctx: RequestCtx, Query(q): Query<dto::PayslipListQuery>) -> ApiResult {
    require(&ctx, "hr.read")?;
    let period = q.period.as_deref().map(parse_period).transpose()?;
    let employee_id = q
        .employee_id
        .as_deref()
        .map(|raw| parse_id::<EmployeeId>(raw, "employee id"))
        .transpose()?;
    Ok(items(ctx.services.read_models.hr.payslips(ctx.tenant_id(), period, employee_id)))
}

async fn get_payslip(ctx: RequestCtx, Path(id): Path<String>) -> ApiResult {
    require(&ctx, "hr.read")?;
    let payslip_id: PayslipId = parse_id(&id, "payslip id")?;
    ctx.services
        .read_models
        .hr
        .payslip(ctx.tenant_id(), &payslip_id)
        .map(json)
        .ok_or_else(|| not_found(format!("payslip {payslip_id}")))
}

/// Approval and payment both post their journal/payment vouchers.
fn posted(ctx: &RequestCtx, payslip_id: PayslipId, committed: &[StoredEvent]) -> ApiResult {
    let services = &ctx.services;
    let vouchers = post_payslip_events(
        &services.dispatcher,
        &services.numbers,
        &services.config.posting,
        ctx.tenant_id(),
        committed,
    )
    .map_err(workflow_error_to_response)?;
    let body = serde_json::json!({
        "id": payslip_id.to_string(),
        "events_committed": committed.len(),
        "vouchers": vouchers.iter().map(ToString::to_string).collect::<Vec<_>>(),
    });
    Ok((StatusCode::OK, axum::Json(body)).into_response())
}

async fn approve_payslip(ctx: RequestCtx, Path(id): Path<String>) -> ApiResult {
    let payslip_id: PayslipId = parse_id(&id, "payslip id")?;
    let cmd = PayslipCommand::ApprovePayslip(ApprovePayslip {
        tenant_id: ctx.tenant_id(),
        payslip_id,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_payslip(&ctx, payslip_id, cmd, "hr.payroll.approve")?;
    posted(&ctx, payslip_id, &committed)
}

async fn pay_payslip(
    ctx: RequestCtx,
    Path(id): Path<String>,
    body: Option<Body<dto::PayPayslipRequest>>,
) -> ApiResult {
    let payslip_id: PayslipId = parse_id(&id, "payslip id")?;
    let (paid_on, reference) = match body {
        Some(Body(b)) => (b.paid_on, b.reference),
        None => (None, None),
    };
    let cmd = PayslipCommand::MarkPayslipPaid(MarkPayslipPaid {
        tenant_id: ctx.tenant_id(),
        payslip_id,
        paid_on: paid_on.unwrap_or_else(today),
        reference,
        occurred_at: Utc::now(),
    });
    let committed = dispatch_payslip(&ctx, payslip_id, cmd, "hr.payroll.approve")?;
    posted(&ctx, payslip_id, &committed)
}

async fn payroll_summary(ctx: RequestCtx, Query(q): Query<dto::PayrollSummaryQuery>) -> ApiResult {
    require(&ctx, "hr.read")?;
    let period = parse_period(&q.period)?;
    Ok(json(ctx.services.read_models.hr.payroll_summary(ctx.tenant_id(), period)))
}
