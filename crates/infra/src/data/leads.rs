//! Lead CSV export and import.

use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

use estateerp_core::TenantId;
use estateerp_core::money::parse_inr;
use estateerp_crm::{CaptureLead, Lead, LeadCommand, LeadId, LeadStatus, normalize_email, normalize_phone};
use estateerp_events::{EventBus, EventEnvelope};

use super::{DataError, ImportReport, RowRejection, line_of, plain_rupees};
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::projections::LeadReadModel;
use crate::streams;

pub const LEAD_CSV_HEADER: [&str; 7] = ["name", "phone", "email", "source", "interest", "budget", "status"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LeadRow {
    name: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    interest: String,
    #[serde(default)]
    budget: String,
    #[serde(default)]
    status: String,
}

fn blank_to_none(value: &str) -> Option<String> {
    Some(value.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}

pub fn export_leads(leads: &[LeadReadModel]) -> Result<String, DataError> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    wtr.write_record(LEAD_CSV_HEADER)?;
    for lead in leads {
        wtr.serialize(LeadRow {
            name: lead.name.clone(),
            phone: lead.phone.clone().unwrap_or_default(),
            email: lead.email.clone().unwrap_or_default(),
            source: lead.source.clone().unwrap_or_default(),
            interest: lead.interest.clone().unwrap_or_default(),
            budget: lead.budget.map(plain_rupees).unwrap_or_default(),
            status: lead.status.as_str().to_string(),
        })?;
    }
    let bytes = wtr.into_inner().map_err(|e| DataError::Csv(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| DataError::Csv(e.to_string()))
}

/// Contact keys of a lead: normalised phone and email.
fn contact_keys(phone: Option<&str>, email: Option<&str>) -> Vec<String> {
    let mut keys = Vec::new();
    if let Ok(Some(p)) = normalize_phone(phone) {
        keys.push(format!("phone:{p}"));
    }
    if let Ok(Some(e)) = normalize_email(email) {
        keys.push(format!("email:{e}"));
    }
    keys
}

/// Capture one lead per CSV row.
///
/// Rows whose phone or email matches an existing lead (or an earlier row) are
/// counted as duplicates. Rows failing validation are rejected with their line
/// number; storage failures abort the import.
pub fn import_leads<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    existing: &[LeadReadModel],
    text: &str,
) -> Result<ImportReport, DataError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = rdr.headers()?.clone();
    if !headers.iter().any(|h| h.eq_ignore_ascii_case("name")) {
        return Err(DataError::Invalid("missing 'name' column".to_string()));
    }
    let lowered: csv::StringRecord = headers.iter().map(str::to_ascii_lowercase).collect();

    let mut seen: HashSet<String> = existing
        .iter()
        .flat_map(|l| contact_keys(l.phone.as_deref(), l.email.as_deref()))
        .collect();

    let mut report = ImportReport::default();
    for (idx, record) in rdr.records().enumerate() {
        report.rows_read += 1;
        let fallback_line = idx as u64 + 2;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                report.rejected.push(RowRejection {
                    line: fallback_line,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        let line = line_of(&record, fallback_line);
        let row: LeadRow = match record.deserialize(Some(&lowered)) {
            Ok(r) => r,
            Err(e) => {
                report.rejected.push(RowRejection { line, reason: e.to_string() });
                continue;
            }
        };

        let budget = match blank_to_none(&row.budget).map(|b| parse_inr(&b)).transpose() {
            Ok(b) => b,
            Err(e) => {
                report.rejected.push(RowRejection { line, reason: e.to_string() });
                continue;
            }
        };
        let status = match blank_to_none(&row.status) {
            None => None,
            Some(s) => match LeadStatus::parse(&s) {
                Some(status) => Some(status),
                None => {
                    report.rejected.push(RowRejection {
                        line,
                        reason: format!("unknown status '{s}'"),
                    });
                    continue;
                }
            },
        };

        let keys = contact_keys(Some(&row.phone), Some(&row.email));
        if keys.iter().any(|k| seen.contains(k)) {
            report.duplicates += 1;
            continue;
        }

        let lead_id = LeadId::generate();
        let outcome = dispatcher.dispatch::<Lead>(
            tenant_id,
            lead_id.0,
            streams::LEAD,
            LeadCommand::CaptureLead(CaptureLead {
                tenant_id,
                lead_id,
                name: row.name.clone(),
                phone: blank_to_none(&row.phone),
                email: blank_to_none(&row.email),
                source: blank_to_none(&row.source),
                interest: blank_to_none(&row.interest),
                budget,
                status,
                occurred_at: Utc::now(),
            }),
            |_, id| Lead::empty(LeadId::new(id)),
        );
        match outcome {
            Ok(_) => {
                report.imported += 1;
                seen.extend(keys);
            }
            Err(DispatchError::Validation(reason) | DispatchError::InvariantViolation(reason)) => {
                report.rejected.push(RowRejection { line, reason });
            }
            Err(err) => return Err(err.into()),
        }
    }

    info!(
        tenant_id = %tenant_id,
        rows_read = report.rows_read,
        imported = report.imported,
        duplicates = report.duplicates,
        rejected = report.rejected.len(),
        "lead import finished"
    );
    Ok(report)
}
