//! Accounting domain module (event-sourced).
//!
//! The chart of accounts (groups and heads) and double-entry vouchers. Balances
//! are not held by any aggregate; they are derived from posted voucher events
//! by projections.

pub mod chart;
pub mod voucher;

pub use chart::{
    AccountGroup, AccountHead, AccountNature, ChartCommand, ChartEvent, ChartId, ChartOfAccounts,
    CreateGroup, CreateHead, DeactivateHead, EntrySide, GroupCreated, HeadCreated,
    HeadDeactivated, HeadRenamed, RenameHead, SeedDefaultChart, default_chart,
};
pub use voucher::{
    CancelVoucher, CreateVoucher, PostVoucher, Voucher, VoucherCancelled, VoucherCommand,
    VoucherCreated, VoucherEntry, VoucherEvent, VoucherId, VoucherKind, VoucherPosted,
    VoucherStatus, check_balance,
};
