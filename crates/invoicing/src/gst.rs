//! Indian GST: state normalisation, GSTIN validation and the CGST/SGST/IGST split.

use serde::{Deserialize, Serialize};

use estateerp_core::money::{apply_half_rate, apply_rate};
pub use estateerp_core::money::{GST_SLABS, validate_gst_rate};
use estateerp_core::{DomainError, DomainResult, Paise, RateBps};

/// GST state codes and canonical state/UT names.
const STATES: &[(&str, &str)] = &[
    ("01", "Jammu and Kashmir"),
    ("02", "Himachal Pradesh"),
    ("03", "Punjab"),
    ("04", "Chandigarh"),
    ("05", "Uttarakhand"),
    ("06", "Haryana"),
    ("07", "Delhi"),
    ("08", "Rajasthan"),
    ("09", "Uttar Pradesh"),
    ("10", "Bihar"),
    ("11", "Sikkim"),
    ("12", "Arunachal Pradesh"),
    ("13", "Nagaland"),
    ("14", "Manipur"),
    ("15", "Mizoram"),
    ("16", "Tripura"),
    ("17", "Meghalaya"),
    ("18", "Assam"),
    ("19", "West Bengal"),
    ("20", "Jharkhand"),
    ("21", "Odisha"),
    ("22", "Chhattisgarh"),
    ("23", "Madhya Pradesh"),
    ("24", "Gujarat"),
    ("26", "Dadra and Nagar Haveli and Daman and Diu"),
    ("27", "Maharashtra"),
    ("29", "Karnataka"),
    ("30", "Goa"),
    ("31", "Lakshadweep"),
    ("32", "Kerala"),
    ("33", "Tamil Nadu"),
    ("34", "Puducherry"),
    ("35", "Andaman and Nicobar Islands"),
    ("36", "Telangana"),
    ("37", "Andhra Pradesh"),
    ("38", "Ladakh"),
];

const ALIASES: &[(&str, &str)] = &[
    ("orissa", "Odisha"),
    ("pondicherry", "Puducherry"),
    ("new delhi", "Delhi"),
    ("nct of delhi", "Delhi"),
    ("uttaranchal", "Uttarakhand"),
    ("j&k", "Jammu and Kashmir"),
];

/// A normalised Indian state or union territory.
///
/// Known states are stored under their canonical name; unknown text is kept
/// with collapsed whitespace and title case so comparisons stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndianState(String);

impl IndianState {
    /// Parse a state name, a two-digit GST state code or a GSTIN.
    ///
    /// Returns `None` for blank input.
    pub fn parse(input: &str) -> Option<Self> {
        let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            return None;
        }

        let code = if collapsed.len() == 2 && collapsed.bytes().all(|b| b.is_ascii_digit()) {
            Some(collapsed.as_str())
        } else if collapsed.len() == 15 && collapsed.as_bytes()[..2].iter().all(u8::is_ascii_digit) {
            Some(&collapsed[..2])
        } else {
            None
        };
        if let Some(code) = code {
            if let Some((_, name)) = STATES.iter().find(|(c, _)| *c == code) {
                return Some(Self((*name).to_string()));
            }
        }

        let lower = collapsed.to_lowercase();
        if let Some((_, name)) = STATES.iter().find(|(_, n)| n.to_lowercase() == lower) {
            return Some(Self((*name).to_string()));
        }
        if let Some((_, name)) = ALIASES.iter().find(|(a, _)| *a == lower) {
            return Some(Self((*name).to_string()));
        }

        Some(Self(title_case(&lower)))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Two-digit GST state code, when the state is a known one.
    pub fn code(&self) -> Option<&'static str> {
        STATES.iter().find(|(_, n)| *n == self.0).map(|(c, _)| *c)
    }
}

impl core::fmt::Display for IndianState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

fn title_case(lower: &str) -> String {
    lower
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a supply stays inside the supplier's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyKind {
    IntraState,
    InterState,
}

impl SupplyKind {
    /// A missing place of supply is treated as the company's own state.
    pub fn between(company_state: &IndianState, place_of_supply: Option<&IndianState>) -> Self {
        match place_of_supply {
            Some(pos) if pos != company_state => SupplyKind::InterState,
            _ => SupplyKind::IntraState,
        }
    }
}

/// Tax amounts for one taxable value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBreakup {
    pub cgst: Paise,
    pub sgst: Paise,
    pub igst: Paise,
}

impl TaxBreakup {
    pub fn total(&self) -> Paise {
        self.cgst + self.sgst + self.igst
    }

    pub fn add(&mut self, other: &TaxBreakup) {
        self.cgst += other.cgst;
        self.sgst += other.sgst;
        self.igst += other.igst;
    }
}

/// Split GST on a taxable value.
///
/// Intra-state: CGST and SGST each get half the rate, rounded half-up on their
/// own. Inter-state: the full rate goes to IGST.
pub fn split_tax(taxable: Paise, rate: RateBps, kind: SupplyKind) -> TaxBreakup {
    match kind {
        SupplyKind::IntraState => {
            let half = apply_half_rate(taxable, rate);
            TaxBreakup {
                cgst: half,
                sgst: half,
                igst: 0,
            }
        }
        SupplyKind::InterState => TaxBreakup {
            cgst: 0,
            sgst: 0,
            igst: apply_rate(taxable, rate),
        },
    }
}

const GSTIN_ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

fn gstin_value(c: u8) -> Option<u32> {
    GSTIN_ALPHABET.iter().position(|&a| a == c).map(|p| p as u32)
}

/// Validate a GSTIN (format and mod-36 check character) and return it upper-cased.
pub fn validate_gstin(input: &str) -> DomainResult<String> {
    let gstin = input.trim().to_ascii_uppercase();
    let b = gstin.as_bytes();
    let invalid = |why: &str| DomainError::validation(format!("invalid GSTIN '{gstin}': {why}"));

    if b.len() != 15 {
        return Err(invalid("must be 15 characters"));
    }
    if !b[..2].iter().all(u8::is_ascii_digit) || !STATES.iter().any(|(c, _)| c.as_bytes() == &b[..2]) {
        return Err(invalid("unknown state code"));
    }
    let pan = &b[2..12];
    let pan_ok = pan[..5].iter().all(u8::is_ascii_uppercase)
        && pan[5..9].iter().all(u8::is_ascii_digit)
        && pan[9].is_ascii_uppercase();
    if !pan_ok {
        return Err(invalid("malformed PAN"));
    }
    if !(b[12].is_ascii_uppercase() || (b'1'..=b'9').contains(&b[12])) {
        return Err(invalid("malformed entity code"));
    }
    if b[13] != b'Z' {
        return Err(invalid("14th character must be Z"));
    }

    let mut sum = 0u32;
    for (i, &c) in b[..14].iter().enumerate() {
        let value = gstin_value(c).ok_or_else(|| invalid("illegal character"))?;
        let product = value * if i % 2 == 0 { 1 } else { 2 };
        sum += product / 36 + product % 36;
    }
    let expected = GSTIN_ALPHABET[((36 - sum % 36) % 36) as usize];
    if b[14] != expected {
        return Err(invalid("checksum mismatch"));
    }

    Ok(gstin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn state(s: &str) -> IndianState {
        IndianState::parse(s).unwrap()
    }

    #[test]
    fn state_parsing_accepts_names_codes_and_gstins() {
        assert_eq!(state("tamil  nadu").name(), "Tamil Nadu");
        assert_eq!(state("33"), state("Tamil Nadu"));
        assert_eq!(state("27AAPFU0939F1ZV").name(), "Maharashtra");
        assert_eq!(state("Orissa").name(), "Odisha");
        assert_eq!(state("  atlantis  north ").name(), "Atlantis North");
        assert_eq!(state("Karnataka").code(), Some("29"));
        assert!(IndianState::parse("   ").is_none());
    }

    #[test]
    fn missing_place_of_supply_is_intra_state() {
        let mh = state("Maharashtra");
        assert_eq!(SupplyKind::between(&mh, None), SupplyKind::IntraState);
        assert_eq!(SupplyKind::between(&mh, Some(&state("27"))), SupplyKind::IntraState);
        assert_eq!(SupplyKind::between(&mh, Some(&state("Goa"))), SupplyKind::InterState);
    }

    #[test]
    fn halves_are_rounded_independently() {
        // 18% of 1001 paise: 9% each = 90.09 -> 90 paise per half.
        let t = split_tax(1001, 1800, SupplyKind::IntraState);
        assert_eq!((t.cgst, t.sgst, t.igst), (90, 90, 0));
        let t = split_tax(1001, 1800, SupplyKind::InterState);
        assert_eq!((t.cgst, t.sgst, t.igst), (0, 0, 180));
    }

    #[test]
    fn gstin_checksum_is_verified() {
        assert_eq!(validate_gstin(" 27aapfu0939f1zv ").unwrap(), "27AAPFU0939F1ZV");
        assert!(validate_gstin("33AABCT1332L1ZL").is_ok());
        assert!(validate_gstin("07AAACR5055K1Z9").is_ok());
        assert!(validate_gstin("27AAPFU0939F1ZA").is_err());
        assert!(validate_gstin("99AAPFU0939F1ZV").is_err());
        assert!(validate_gstin("27AAPFU0939F1Z").is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn split_never_mixes_intra_and_inter_components(
            taxable in 0i64..10_000_000_000,
            slab in 0usize..GST_SLABS.len(),
            same_state in any::<bool>(),
        ) {
            let company = state("Maharashtra");
            let pos = if same_state { state("Maharashtra") } else { state("Karnataka") };
            let kind = SupplyKind::between(&company, Some(&pos));
            let t = split_tax(taxable, GST_SLABS[slab], kind);

            if same_state {
                prop_assert_eq!(t.igst, 0);
                prop_assert_eq!(t.cgst, t.sgst);
            } else {
                prop_assert_eq!(t.cgst, 0);
                prop_assert_eq!(t.sgst, 0);
            }
            prop_assert!(t.total() >= 0);
        }
    }
}
