//! Data management: tenant backup and restore, CSV import and export.

pub mod backup;
pub mod event_log;
pub mod leads;
pub mod statement;

use serde::Serialize;
use thiserror::Error;

use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStoreError;

pub use backup::{BACKUP_FORMAT, BackupDocument, RestoreReport, export_tenant, restore_tenant};
pub use event_log::{EVENT_LOG_CSV_HEADER, EventLogFilter, export_event_log};
pub use leads::{LEAD_CSV_HEADER, export_leads, import_leads};
pub use statement::{ParsedStatement, STATEMENT_CSV_HEADER, parse_statement};

#[derive(Debug, Error)]
pub enum DataError {
    #[error("csv error: {0}")]
    Csv(String),
    #[error("json error: {0}")]
    Json(String),
    #[error("invalid data: {0}")]
    Invalid(String),
    #[error("tenant already has {0} event(s); restore needs an empty tenant")]
    TenantNotEmpty(usize),
    #[error(transparent)]
    Store(#[from] EventStoreError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl From<csv::Error> for DataError {
    fn from(value: csv::Error) -> Self {
        DataError::Csv(value.to_string())
    }
}

/// A CSV row that was not imported. Lines count from 1 at the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowRejection {
    pub line: u64,
    pub reason: String,
}

/// Outcome of a CSV import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub rows_read: u64,
    pub imported: u64,
    pub duplicates: u64,
    pub rejected: Vec<RowRejection>,
}

/// Line number of the record in the source text, header included.
pub(crate) fn line_of(record: &csv::StringRecord, fallback: u64) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(fallback)
}

/// Rupees with two decimals and no grouping, e.g. `7500000.00`.
pub(crate) fn plain_rupees(paise: estateerp_core::Paise) -> String {
    let sign = if paise < 0 { "-" } else { "" };
    let abs = paise.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_rupees_keeps_paise() {
        assert_eq!(plain_rupees(75_00_000_00), "7500000.00");
        assert_eq!(plain_rupees(-1_05), "-1.05");
        assert_eq!(plain_rupees(0), "0.00");
    }
}
