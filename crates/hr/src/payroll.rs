//! Monthly payroll arithmetic: pro-rating and statutory deductions.

use core::fmt;
use core::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use estateerp_core::money::{apply_rate, pro_rate};
use estateerp_core::{DomainError, Paise};

/// Employee PF contribution rate (12%).
pub const PF_RATE_BPS: u32 = 1_200;
/// Basic wage ceiling for PF.
pub const PF_WAGE_CEILING: Paise = 15_000_00;
/// Employee ESI contribution rate (0.75%).
pub const ESI_RATE_BPS: u32 = 75;
/// Gross wage ceiling for ESI coverage.
pub const ESI_WAGE_CEILING: Paise = 21_000_00;

/// Monthly salary components, in paise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalaryStructure {
    pub basic: Paise,
    pub hra: Paise,
    pub special_allowance: Paise,
    pub other_allowance: Paise,
    pub pf_enrolled: bool,
}

impl SalaryStructure {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.basic <= 0 {
            return Err(DomainError::validation("basic salary must be positive"));
        }
        if self.hra < 0 || self.special_allowance < 0 || self.other_allowance < 0 {
            return Err(DomainError::validation("allowances cannot be negative"));
        }
        Ok(())
    }
}

/// A payroll month, rendered `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PayPeriod {
    year: i32,
    month: u32,
}

impl PayPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self, DomainError> {
        if !(1..=12).contains(&month) || !(2000..=2100).contains(&year) {
            return Err(DomainError::validation(format!("invalid pay period {year}-{month}")));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        let (y, m) = if self.month == 12 { (self.year + 1, 1) } else { (self.year, self.month + 1) };
        NaiveDate::from_ymd_opt(y, m, 1)
            .and_then(|d| d.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn days(&self) -> u32 {
        self.last_day().day()
    }
}

impl fmt::Display for PayPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for PayPeriod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (y, m) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| DomainError::validation(format!("pay period must be YYYY-MM: {s}")))?;
        let year = y
            .parse()
            .map_err(|_| DomainError::validation(format!("invalid year in pay period: {s}")))?;
        let month = m
            .parse()
            .map_err(|_| DomainError::validation(format!("invalid month in pay period: {s}")))?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for PayPeriod {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PayPeriod> for String {
    fn from(value: PayPeriod) -> Self {
        value.to_string()
    }
}

/// Earnings, deductions and net pay of one payslip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayslipBreakdown {
    pub working_days: u32,
    pub paid_days: u32,
    pub basic: Paise,
    pub hra: Paise,
    pub special_allowance: Paise,
    pub other_allowance: Paise,
    pub gross: Paise,
    pub pf: Paise,
    pub esi: Paise,
    pub professional_tax: Paise,
    pub total_deductions: Paise,
    pub net: Paise,
}

/// Monthly professional tax slab on gross earnings.
pub fn professional_tax(gross: Paise, period: PayPeriod) -> Paise {
    if gross <= 7_500_00 {
        0
    } else if gross <= 10_000_00 {
        175_00
    } else if period.month() == 2 {
        300_00
    } else {
        200_00
    }
}

pub fn compute_payslip(
    structure: &SalaryStructure,
    working_days: u32,
    paid_days: u32,
    period: PayPeriod,
) -> Result<PayslipBreakdown, DomainError> {
    structure.validate()?;
    if working_days == 0 || working_days > 31 {
        return Err(DomainError::validation("working days must be between 1 and 31"));
    }
    if paid_days > working_days {
        return Err(DomainError::validation("paid days cannot exceed working days"));
    }

    let basic = pro_rate(structure.basic, paid_days, working_days);
    let hra = pro_rate(structure.hra, paid_days, working_days);
    let special_allowance = pro_rate(structure.special_allowance, paid_days, working_days);
    let other_allowance = pro_rate(structure.other_allowance, paid_days, working_days);
    let gross = basic + hra + special_allowance + other_allowance;

    let pf = if structure.pf_enrolled {
        apply_rate(basic.min(PF_WAGE_CEILING), PF_RATE_BPS)
    } else {
        0
    };
    let esi = if gross > 0 && gross <= ESI_WAGE_CEILING {
        apply_rate(gross, ESI_RATE_BPS)
    } else {
        0
    };
    let professional_tax = professional_tax(gross, period);
    let total_deductions = pf + esi + professional_tax;

    Ok(PayslipBreakdown {
        working_days,
        paid_days,
        basic,
        hra,
        special_allowance,
        other_allowance,
        gross,
        pf,
        esi,
        professional_tax,
        total_deductions,
        net: (gross - total_deductions).max(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn structure(basic: Paise, hra: Paise) -> SalaryStructure {
        SalaryStructure {
            basic,
            hra,
            special_allowance: 0,
            other_allowance: 0,
            pf_enrolled: true,
        }
    }

    fn april() -> PayPeriod {
        "2026-04".parse().unwrap()
    }

    #[test]
    fn period_parses_and_knows_its_days() {
        let feb: PayPeriod = "2028-02".parse().unwrap();
        assert_eq!(feb.days(), 29);
        assert_eq!(feb.to_string(), "2028-02");
        assert!("2026-13".parse::<PayPeriod>().is_err());
        assert!("April".parse::<PayPeriod>().is_err());
    }

    #[test]
    fn pf_is_capped_at_the_wage_ceiling() {
        let slip = compute_payslip(&structure(40_000_00, 16_000_00), 30, 30, april()).unwrap();
        assert_eq!(slip.gross, 56_000_00);
        assert_eq!(slip.pf, 1_800_00);
        assert_eq!(slip.esi, 0);
        assert_eq!(slip.professional_tax, 200_00);
        assert_eq!(slip.net, 56_000_00 - 1_800_00 - 200_00);
    }

    #[test]
    fn low_wage_employee_pays_esi() {
        let slip = compute_payslip(&structure(9_000_00, 3_000_00), 30, 30, april()).unwrap();
        assert_eq!(slip.gross, 12_000_00);
        assert_eq!(slip.pf, 1_080_00);
        assert_eq!(slip.esi, 90_00);
        assert_eq!(slip.professional_tax, 200_00);
    }

    #[test]
    fn earnings_are_pro_rated_by_paid_days() {
        let slip = compute_payslip(&structure(30_000_00, 0), 30, 15, april()).unwrap();
        assert_eq!(slip.basic, 15_000_00);
        assert_eq!(slip.pf, 1_800_00);
    }

    #[test]
    fn february_professional_tax_is_higher() {
        let feb: PayPeriod = "2027-02".parse().unwrap();
        assert_eq!(professional_tax(25_000_00, feb), 300_00);
        assert_eq!(professional_tax(9_000_00, feb), 175_00);
        assert_eq!(professional_tax(7_500_00, feb), 0);
    }

    #[test]
    fn zero_paid_days_gives_zero_net() {
        let slip = compute_payslip(&structure(30_000_00, 0), 26, 0, april()).unwrap();
        assert_eq!(slip.gross, 0);
        assert_eq!(slip.net, 0);
    }

    #[test]
    fn paid_days_cannot_exceed_working_days() {
        assert!(compute_payslip(&structure(30_000_00, 0), 26, 27, april()).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn net_plus_deductions_never_exceeds_gross(
            basic in 1i64..5_00_000_00,
            hra in 0i64..2_00_000_00,
            working in 1u32..=31,
            paid_frac in 0u32..=100,
        ) {
            let paid = working * paid_frac / 100;
            let slip = compute_payslip(&structure(basic, hra), working, paid, april()).unwrap();
            prop_assert!(slip.net >= 0);
            prop_assert!(slip.net <= slip.gross);
            prop_assert!(slip.pf <= 1_800_00);
        }
    }
}
