//! Request bodies and query strings, plus the JSON body extractor.
//!
//! Amounts are integer paise, rates basis points, dates `YYYY-MM-DD`. Ids are
//! taken as strings and parsed in the handlers so a bad id is a 400 with a
//! JSON body rather than a plain-text rejection.

use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::Response;
use chrono::NaiveDate;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use estateerp_accounting::{AccountNature, EntrySide, VoucherEntry, VoucherKind, VoucherStatus};
use estateerp_core::{Paise, RateBps};
use estateerp_crm::{CustomerDetails, LeadStatus};
use estateerp_hr::SalaryStructure;
use estateerp_inventory::{MovementDirection, ProductionStatus};
use estateerp_invoicing::{InvoiceItem, InvoiceStatus, PaymentMode};
use estateerp_property::{PropertyKind, PropertyStatus, ProjectPhase};

use crate::app::errors::json_error;

/// `Json<T>` whose rejections are JSON errors.
pub struct Body<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for Body<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Body(value)),
            Err(rejection) => Err(json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text())),
        }
    }
}

// crm

#[derive(Debug, Deserialize)]
pub struct CustomerRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub gstin: Option<String>,
    pub address: Option<String>,
    pub state: Option<String>,
}

impl From<CustomerRequest> for CustomerDetails {
    fn from(r: CustomerRequest) -> Self {
        CustomerDetails {
            name: r.name,
            email: r.email,
            phone: r.phone,
            gstin: r.gstin,
            address: r.address,
            state: r.state,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CaptureLeadRequest {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub source: Option<String>,
    pub interest: Option<String>,
    pub budget: Option<Paise>,
}

#[derive(Debug, Deserialize)]
pub struct LeadListQuery {
    pub status: Option<LeadStatus>,
}

#[derive(Debug, Deserialize)]
pub struct FollowUpQuery {
    pub on: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeLeadStatusRequest {
    pub status: LeadStatus,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignLeadRequest {
    pub agent: String,
}

#[derive(Debug, Deserialize)]
pub struct AddFollowUpRequest {
    pub note: String,
    pub next_follow_up: Option<NaiveDate>,
}

/// Convert into an existing customer, or register one from the lead.
#[derive(Debug, Default, Deserialize)]
pub struct ConvertLeadRequest {
    pub customer_id: Option<String>,
    pub gstin: Option<String>,
    pub address: Option<String>,
    pub state: Option<String>,
}

// property

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub code: String,
    pub name: String,
    pub location: String,
    pub state: String,
    pub launch_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePhaseRequest {
    pub phase: ProjectPhase,
}

#[derive(Debug, Deserialize)]
pub struct ListUnitRequest {
    pub project_id: String,
    pub unit_no: String,
    pub kind: PropertyKind,
    pub floor: Option<i32>,
    pub area_sqft: u32,
    pub rate_per_sqft: Paise,
}

#[derive(Debug, Deserialize)]
pub struct UnitListQuery {
    pub project_id: Option<String>,
    pub status: Option<PropertyStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BookUnitRequest {
    pub customer_id: String,
    /// Defaults to the list price.
    pub agreed_price: Option<Paise>,
    pub booking_amount: Paise,
    pub booked_on: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterSaleRequest {
    pub registered_on: Option<NaiveDate>,
    pub registration_no: Option<String>,
}

// invoicing

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub customer_id: String,
    /// Defaults to the customer's state.
    pub place_of_supply: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    /// Defaults to 30 days after the invoice date.
    pub due_date: Option<NaiveDate>,
    pub property_id: Option<String>,
    pub items: Vec<InvoiceItem>,
    /// Issue straight away instead of leaving a draft.
    #[serde(default)]
    pub issue: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReviseInvoiceRequest {
    pub due_date: Option<NaiveDate>,
    pub items: Vec<InvoiceItem>,
}

#[derive(Debug, Deserialize)]
pub struct InvoiceListQuery {
    pub status: Option<InvoiceStatus>,
    pub customer_id: Option<String>,
    #[serde(default)]
    pub overdue: bool,
}

#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    pub amount: Paise,
    pub mode: PaymentMode,
    #[serde(default)]
    pub reference: String,
    pub paid_on: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AsOfQuery {
    pub today: Option<NaiveDate>,
}

// accounting

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub code: String,
    pub name: String,
    pub nature: AccountNature,
    pub parent: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateHeadRequest {
    pub code: String,
    pub name: String,
    pub group: String,
    #[serde(default)]
    pub opening_balance: Paise,
    pub opening_side: Option<EntrySide>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateVoucherRequest {
    pub kind: VoucherKind,
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub narration: String,
    pub entries: Vec<VoucherEntry>,
    pub reference: Option<String>,
    #[serde(default)]
    pub post: bool,
}

#[derive(Debug, Deserialize)]
pub struct VoucherListQuery {
    pub kind: Option<VoucherKind>,
    pub status: Option<VoucherStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CancelVoucherRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct LedgerQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

// inventory and manufacturing

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub sku: String,
    pub name: String,
    pub unit: String,
    pub hsn: Option<String>,
    #[serde(default)]
    pub gst_rate: RateBps,
    #[serde(default)]
    pub reorder_level: i64,
}

#[derive(Debug, Deserialize)]
pub struct MovementRequest {
    pub direction: MovementDirection,
    pub warehouse: String,
    pub batch: Option<String>,
    pub quantity: i64,
    pub reference: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub from_warehouse: String,
    pub to_warehouse: String,
    pub batch: Option<String>,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct StockQuery {
    pub item_id: Option<String>,
    pub warehouse: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ComponentRequest {
    pub item_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateBomRequest {
    pub name: String,
    pub finished_item: String,
    pub output_quantity: i64,
    pub components: Vec<ComponentRequest>,
}

#[derive(Debug, Deserialize)]
pub struct ReviseBomRequest {
    pub output_quantity: Option<i64>,
    pub components: Vec<ComponentRequest>,
}

#[derive(Debug, Deserialize)]
pub struct BomListQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct PlanProductionRequest {
    pub bom_id: String,
    pub quantity: i64,
    pub warehouse: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<ProductionStatus>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteProductionRequest {
    pub produced_quantity: i64,
    pub batch: Option<String>,
}

// banking

#[derive(Debug, Deserialize)]
pub struct OpenBankAccountRequest {
    pub bank_name: String,
    pub account_number: String,
    pub ifsc: String,
    pub ledger_head: String,
    #[serde(default)]
    pub opening_balance: Paise,
}

#[derive(Debug, Deserialize)]
pub struct ChequeBookRequest {
    pub first_leaf: u64,
    pub leaf_count: u32,
}

#[derive(Debug, Deserialize)]
pub struct IssueChequeRequest {
    pub leaf: u64,
    pub payee: String,
    pub amount: Paise,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearChequeRequest {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct StatementLineRequest {
    pub date: NaiveDate,
    #[serde(default)]
    pub description: String,
    pub reference: Option<String>,
    #[serde(default)]
    pub withdrawal: Paise,
    #[serde(default)]
    pub deposit: Paise,
}

#[derive(Debug, Deserialize)]
pub struct ImportStatementRequest {
    pub lines: Vec<StatementLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub line_id: u64,
    pub voucher_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UnreconcileRequest {
    pub line_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct SuggestionQuery {
    pub window_days: Option<u32>,
}

// hr

#[derive(Debug, Deserialize)]
pub struct CreateDepartmentRequest {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct HireEmployeeRequest {
    pub code: String,
    pub name: String,
    pub email: Option<String>,
    pub department_id: String,
    pub designation: String,
    pub joined_on: NaiveDate,
    pub salary: SalaryStructure,
}

#[derive(Debug, Deserialize)]
pub struct EmployeeListQuery {
    pub department_id: Option<String>,
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReviseSalaryRequest {
    pub effective_from: NaiveDate,
    pub salary: SalaryStructure,
}

#[derive(Debug, Deserialize)]
pub struct TransferEmployeeRequest {
    pub department_id: String,
    pub designation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TerminateEmployeeRequest {
    pub on: NaiveDate,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GeneratePayslipRequest {
    pub employee_id: String,
    /// `YYYY-MM`.
    pub period: String,
    /// Defaults to the number of days in the period.
    pub working_days: Option<u32>,
    /// Defaults to `working_days`.
    pub paid_days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct PayslipListQuery {
    pub period: Option<String>,
    pub employee_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PayrollSummaryQuery {
    pub period: String,
}

#[derive(Debug, Deserialize)]
pub struct PayPayslipRequest {
    pub paid_on: Option<NaiveDate>,
    pub reference: Option<String>,
}

// data

#[derive(Debug, Default, Deserialize)]
pub struct EventLogQuery {
    pub aggregate_type: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

// mail

#[derive(Debug, Default, Deserialize)]
pub struct RemindersRequest {
    pub today: Option<NaiveDate>,
    /// Overrides the configured grace period.
    pub grace_days: Option<u32>,
}
