//! Invoicing domain module (event-sourced).
//!
//! GST computation and the invoice lifecycle: Draft, Pending, Paid, Cancelled.

pub mod gst;
pub mod invoice;

pub use gst::{
    GST_SLABS, IndianState, SupplyKind, TaxBreakup, split_tax, validate_gst_rate, validate_gstin,
};
pub use invoice::{
    CancelInvoice, CreateInvoice, DraftRevised, Invoice, InvoiceCancelled, InvoiceCommand,
    InvoiceCreated, InvoiceEvent, InvoiceId, InvoiceIssued, InvoiceItem, InvoiceLine, InvoicePaid,
    InvoiceStatus, InvoiceTotals, IssueInvoice, Payment, PaymentMode, PaymentRecorded,
    RecordPayment, ReviseDraft, compute_lines,
};
