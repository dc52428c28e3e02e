//! Statement-to-voucher matching and reconciliation totals.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use estateerp_core::{AggregateId, Paise};

use crate::account::StatementLine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxnDirection {
    Deposit,
    Withdrawal,
}

impl TxnDirection {
    /// Read a voucher's net effect on the bank's ledger head: a net debit is
    /// money coming in. `None` when the voucher leaves the head unchanged.
    pub fn from_bank_net(net: Paise) -> Option<(Self, Paise)> {
        match net {
            0 => None,
            n if n > 0 => Some((Self::Deposit, n)),
            n => Some((Self::Withdrawal, -n)),
        }
    }
}

/// A posted voucher that touched the bank's ledger head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub voucher_id: AggregateId,
    pub number: String,
    pub date: NaiveDate,
    pub amount: Paise,
    pub direction: TxnDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSuggestion {
    pub line_id: u64,
    pub voucher_id: AggregateId,
    pub number: String,
    pub day_gap: i64,
}

/// Pair unreconciled lines with same-amount, same-direction vouchers dated
/// within `window_days`. Closest date first per line; vouchers already matched
/// to some line are never offered.
pub fn suggest_matches<'a>(
    lines: impl IntoIterator<Item = &'a StatementLine>,
    candidates: &[MatchCandidate],
    window_days: i64,
) -> Vec<MatchSuggestion> {
    let lines: Vec<&StatementLine> = lines.into_iter().collect();
    let taken: HashSet<AggregateId> = lines.iter().filter_map(|l| l.reconciled_with).collect();

    let mut out = Vec::new();
    for line in lines.iter().filter(|l| l.reconciled_with.is_none()) {
        let mut matches: Vec<MatchSuggestion> = candidates
            .iter()
            .filter(|c| !taken.contains(&c.voucher_id))
            .filter(|c| c.amount == line.amount() && c.direction == line.direction())
            .filter_map(|c| {
                let gap = (c.date - line.date).num_days().abs();
                (gap <= window_days).then(|| MatchSuggestion {
                    line_id: line.line_id,
                    voucher_id: c.voucher_id,
                    number: c.number.clone(),
                    day_gap: gap,
                })
            })
            .collect();
        matches.sort_by(|a, b| a.day_gap.cmp(&b.day_gap).then_with(|| a.number.cmp(&b.number)));
        out.extend(matches);
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub opening_balance: Paise,
    pub statement_balance: Paise,
    pub reconciled_lines: usize,
    pub unreconciled_lines: usize,
    pub unreconciled_deposits: Paise,
    pub unreconciled_withdrawals: Paise,
}

pub fn summarize<'a>(
    opening_balance: Paise,
    lines: impl IntoIterator<Item = &'a StatementLine>,
) -> ReconciliationSummary {
    let mut summary = ReconciliationSummary {
        opening_balance,
        statement_balance: opening_balance,
        ..ReconciliationSummary::default()
    };
    for line in lines {
        summary.statement_balance += line.net();
        if line.reconciled_with.is_some() {
            summary.reconciled_lines += 1;
        } else {
            summary.unreconciled_lines += 1;
            summary.unreconciled_deposits += line.deposit;
            summary.unreconciled_withdrawals += line.withdrawal;
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(line_id: u64, day: u32, deposit: Paise, withdrawal: Paise) -> StatementLine {
        StatementLine {
            line_id,
            date: NaiveDate::from_ymd_opt(2026, 4, day).unwrap(),
            description: String::new(),
            reference: None,
            withdrawal,
            deposit,
            reconciled_with: None,
        }
    }

    fn candidate(number: &str, day: u32, amount: Paise, direction: TxnDirection) -> MatchCandidate {
        MatchCandidate {
            voucher_id: AggregateId::new(),
            number: number.to_string(),
            date: NaiveDate::from_ymd_opt(2026, 4, day).unwrap(),
            amount,
            direction,
        }
    }

    #[test]
    fn suggestions_respect_amount_direction_and_window() {
        let lines = vec![line(1, 10, 50_000_00, 0)];
        let candidates = vec![
            candidate("RV/00003", 14, 50_000_00, TxnDirection::Deposit),
            candidate("RV/00002", 9, 50_000_00, TxnDirection::Deposit),
            candidate("PV/00001", 10, 50_000_00, TxnDirection::Withdrawal),
            candidate("RV/00004", 10, 49_999_00, TxnDirection::Deposit),
            candidate("RV/00001", 30, 50_000_00, TxnDirection::Deposit),
        ];

        let got = suggest_matches(&lines, &candidates, 5);
        let numbers: Vec<_> = got.iter().map(|s| s.number.as_str()).collect();
        assert_eq!(numbers, vec!["RV/00002", "RV/00003"]);
        assert_eq!(got[0].day_gap, 1);
    }

    #[test]
    fn matched_vouchers_are_not_offered_again() {
        let taken = candidate("RV/00001", 10, 1_000_00, TxnDirection::Deposit);
        let mut reconciled = line(1, 10, 1_000_00, 0);
        reconciled.reconciled_with = Some(taken.voucher_id);
        let lines = vec![reconciled, line(2, 10, 1_000_00, 0)];

        assert!(suggest_matches(&lines, &[taken], 3).is_empty());
    }

    #[test]
    fn summary_tracks_unreconciled_totals() {
        let mut paid = line(2, 3, 0, 2_000_00);
        paid.reconciled_with = Some(AggregateId::new());
        let lines = vec![line(1, 2, 10_000_00, 0), paid, line(3, 4, 0, 500_00)];

        let summary = summarize(1_000_00, &lines);
        assert_eq!(summary.statement_balance, 1_000_00 + 10_000_00 - 2_000_00 - 500_00);
        assert_eq!(summary.unreconciled_deposits, 10_000_00);
        assert_eq!(summary.unreconciled_withdrawals, 500_00);
        assert_eq!(summary.reconciled_lines, 1);
        assert_eq!(summary.unreconciled_lines, 2);
    }

    #[test]
    fn net_debit_to_the_bank_head_is_a_deposit() {
        assert_eq!(TxnDirection::from_bank_net(1_500), Some((TxnDirection::Deposit, 1_500)));
        assert_eq!(TxnDirection::from_bank_net(-700), Some((TxnDirection::Withdrawal, 700)));
        assert_eq!(TxnDirection::from_bank_net(0), None);
    }
}
