//! Integer money arithmetic.
//!
//! Amounts are whole paise (1/100 rupee) and rates are basis points, so every
//! computation is exact integer math with one explicit rounding step.

use crate::error::{DomainError, DomainResult};

/// Amount in paise. Signed so balances and reversals share one type.
pub type Paise = i64;

/// Rate in basis points (1800 = 18%).
pub type RateBps = u32;

const BPS_DENOMINATOR: i128 = 10_000;

/// `value * numerator / denominator`, rounded half away from zero.
///
/// Panics never; a zero denominator yields zero.
pub fn mul_div_round(value: i128, numerator: i128, denominator: i128) -> i128 {
    if denominator == 0 {
        return 0;
    }
    let product = value * numerator;
    let negative = (product < 0) != (denominator < 0);
    let (p, d) = (product.abs(), denominator.abs());
    let q = (2 * p + d) / (2 * d);
    if negative { -q } else { q }
}

/// Apply a basis-point rate to an amount (half-up).
pub fn apply_rate(amount: Paise, rate: RateBps) -> Paise {
    mul_div_round(amount as i128, rate as i128, BPS_DENOMINATOR) as Paise
}

/// Apply half of a basis-point rate (the CGST/SGST share of a GST rate).
pub fn apply_half_rate(amount: Paise, rate: RateBps) -> Paise {
    mul_div_round(amount as i128, rate as i128, 2 * BPS_DENOMINATOR) as Paise
}

/// Valid GST slabs in basis points.
pub const GST_SLABS: [RateBps; 5] = [0, 500, 1200, 1800, 2800];

pub fn validate_gst_rate(rate: RateBps) -> DomainResult<()> {
    if GST_SLABS.contains(&rate) {
        Ok(())
    } else {
        Err(DomainError::validation(format!(
            "invalid GST rate {rate} bps (allowed: 0, 500, 1200, 1800, 2800)"
        )))
    }
}

/// Scale an amount by `part / whole` (pro-rating by days, batches...).
pub fn pro_rate(amount: Paise, part: u32, whole: u32) -> Paise {
    mul_div_round(amount as i128, part as i128, whole as i128) as Paise
}

/// Render paise as rupees with Indian digit grouping: `₹12,34,567.89`.
pub fn format_inr(amount: Paise) -> String {
    let negative = amount < 0;
    let abs = amount.unsigned_abs();
    let rupees = (abs / 100).to_string();
    let paise = abs % 100;

    let grouped = if rupees.len() <= 3 {
        rupees
    } else {
        let (head, last3) = rupees.split_at(rupees.len() - 3);
        let mut parts: Vec<&str> = Vec::new();
        let mut rest = head;
        while rest.len() > 2 {
            let (h, t) = rest.split_at(rest.len() - 2);
            parts.push(t);
            rest = h;
        }
        if !rest.is_empty() {
            parts.push(rest);
        }
        parts.reverse();
        format!("{},{}", parts.join(","), last3)
    };

    format!("{}₹{}.{:02}", if negative { "-" } else { "" }, grouped, paise)
}

/// Parse a rupee amount such as `"1,250.5"` or `"-30"` into paise.
pub fn parse_inr(text: &str) -> DomainResult<Paise> {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != ',' && *c != '₹' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return Ok(0);
    }

    let (negative, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };

    let invalid = || DomainError::validation(format!("invalid amount: '{text}'"));
    let (whole, frac) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };
    if frac.len() > 2
        || !whole.chars().all(|c| c.is_ascii_digit())
        || !frac.chars().all(|c| c.is_ascii_digit())
        || (whole.is_empty() && frac.is_empty())
    {
        return Err(invalid());
    }

    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
        _ => frac.parse().map_err(|_| invalid())?,
    };
    let value = whole
        .checked_mul(100)
        .and_then(|v| v.checked_add(frac))
        .ok_or_else(invalid)?;
    Ok(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_away_from_zero() {
        // 18% of 0.25 = 0.045 -> 0.05 (in paise: 25 * 1800 / 10000 = 4.5 -> 5)
        assert_eq!(apply_rate(25, 1800), 5);
        assert_eq!(apply_rate(-25, 1800), -5);
        assert_eq!(apply_half_rate(25, 1800), 2);
        assert_eq!(pro_rate(3_000_000, 15, 30), 1_500_000);
    }

    #[test]
    fn only_gst_slabs_are_valid() {
        for r in GST_SLABS {
            assert!(validate_gst_rate(r).is_ok());
        }
        assert!(validate_gst_rate(1500).is_err());
    }

    #[test]
    fn formats_with_indian_grouping() {
        assert_eq!(format_inr(0), "₹0.00");
        assert_eq!(format_inr(99_999), "₹999.99");
        assert_eq!(format_inr(123_456_789), "₹12,34,567.89");
        assert_eq!(format_inr(-1_000_000_00), "-₹10,00,000.00");
    }

    #[test]
    fn parses_rupee_strings() {
        assert_eq!(parse_inr("1,250.5").unwrap(), 125_050);
        assert_eq!(parse_inr("₹ 30").unwrap(), 3_000);
        assert_eq!(parse_inr("-0.07").unwrap(), -7);
        assert_eq!(parse_inr("").unwrap(), 0);
        assert!(parse_inr("12.345").is_err());
        assert!(parse_inr("abc").is_err());
    }
}
