//! Aggregate type names: the routing key of every stream and envelope.

pub const CUSTOMER: &str = "crm.customer";
pub const LEAD: &str = "crm.lead";
pub const PROJECT: &str = "property.project";
pub const PROPERTY: &str = "property.unit";
pub const INVOICE: &str = "invoicing.invoice";
pub const CHART: &str = "accounting.chart";
pub const VOUCHER: &str = "accounting.voucher";
pub const INVENTORY_ITEM: &str = "inventory.item";
pub const BOM: &str = "manufacturing.bom";
pub const PRODUCTION_ORDER: &str = "manufacturing.order";
pub const BANK_ACCOUNT: &str = "banking.account";
pub const DEPARTMENT: &str = "hr.department";
pub const EMPLOYEE: &str = "hr.employee";
pub const PAYSLIP: &str = "hr.payslip";
