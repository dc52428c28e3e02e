//! Bank statement CSV parsing.
//!
//! Columns are `date,description,reference,withdrawal,deposit`. Dates may be
//! `YYYY-MM-DD`, `DD/MM/YYYY` or `DD-MM-YYYY`; a blank amount is zero.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use estateerp_banking::StatementLineInput;
use estateerp_core::money::parse_inr;

use super::{DataError, RowRejection, line_of};

pub const STATEMENT_CSV_HEADER: [&str; 5] = ["date", "description", "reference", "withdrawal", "deposit"];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedStatement {
    pub lines: Vec<StatementLineInput>,
    pub rejected: Vec<RowRejection>,
}

#[derive(Debug, Deserialize)]
struct StatementRow {
    date: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    reference: String,
    #[serde(default)]
    withdrawal: String,
    #[serde(default)]
    deposit: String,
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

fn to_line(row: StatementRow) -> Result<StatementLineInput, String> {
    let date = parse_date(&row.date).ok_or_else(|| format!("unrecognised date '{}'", row.date))?;
    let withdrawal = parse_inr(&row.withdrawal).map_err(|e| e.to_string())?;
    let deposit = parse_inr(&row.deposit).map_err(|e| e.to_string())?;
    if withdrawal < 0 || deposit < 0 {
        return Err("amounts cannot be negative".to_string());
    }
    if (withdrawal == 0) == (deposit == 0) {
        return Err("exactly one of withdrawal or deposit must be set".to_string());
    }
    Ok(StatementLineInput {
        date,
        description: row.description,
        reference: Some(row.reference).filter(|r| !r.is_empty()),
        withdrawal,
        deposit,
    })
}

/// Parse statement text into lines ready for import.
///
/// Unreadable rows are rejected individually; only a missing header aborts.
pub fn parse_statement(text: &str) -> Result<ParsedStatement, DataError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = rdr.headers()?.clone();
    let lowered: csv::StringRecord = headers.iter().map(str::to_ascii_lowercase).collect();
    for required in ["date", "withdrawal", "deposit"] {
        if !lowered.iter().any(|h| h == required) {
            return Err(DataError::Invalid(format!("missing '{required}' column")));
        }
    }

    let mut parsed = ParsedStatement::default();
    for (idx, record) in rdr.records().enumerate() {
        let fallback_line = idx as u64 + 2;
        let outcome = record
            .map_err(|e| (fallback_line, e.to_string()))
            .and_then(|r| {
                let line = line_of(&r, fallback_line);
                r.deserialize::<StatementRow>(Some(&lowered))
                    .map_err(|e| e.to_string())
                    .and_then(to_line)
                    .map_err(|reason| (line, reason))
            });
        match outcome {
            Ok(l) => parsed.lines.push(l),
            Err((line, reason)) => parsed.rejected.push(RowRejection { line, reason }),
        }
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_the_common_bank_date_formats() {
        let text = "\
Date,Description,Reference,Withdrawal,Deposit
2026-04-02,NEFT from Meera Joshi,UTR123,,\"1,50,000.00\"
03/04/2026,Cheque 004512,004512,\"25,000\",
04-04-2026,Bank charges,,118.00,
";
        let parsed = parse_statement(text).unwrap();
        assert!(parsed.rejected.is_empty());
        assert_eq!(parsed.lines.len(), 3);

        assert_eq!(parsed.lines[0].date, NaiveDate::from_ymd_opt(2026, 4, 2).unwrap());
        assert_eq!(parsed.lines[0].deposit, 1_50_000_00);
        assert_eq!(parsed.lines[0].reference.as_deref(), Some("UTR123"));

        assert_eq!(parsed.lines[1].date, NaiveDate::from_ymd_opt(2026, 4, 3).unwrap());
        assert_eq!(parsed.lines[1].withdrawal, 25_000_00);

        assert_eq!(parsed.lines[2].date, NaiveDate::from_ymd_opt(2026, 4, 4).unwrap());
        assert_eq!(parsed.lines[2].reference, None);
        assert_eq!(parsed.lines[2].withdrawal, 118_00);
    }

    #[test]
    fn bad_rows_are_rejected_with_their_line() {
        let text = "\
date,description,reference,withdrawal,deposit
2026-13-01,bad month,,10,
2026-04-01,both sides,,10,10
2026-04-01,neither side,,,
2026-04-01,bad amount,,ten,
2026-04-01,fine,,,500
";
        let parsed = parse_statement(text).unwrap();
        assert_eq!(parsed.lines.len(), 1);
        let lines: Vec<u64> = parsed.rejected.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![2, 3, 4, 5]);
    }

    #[test]
    fn missing_amount_columns_abort() {
        let err = parse_statement("date,description\n2026-04-01,x\n").unwrap_err();
        assert!(matches!(err, DataError::Invalid(_)));
    }
}
