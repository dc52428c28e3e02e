//! Contact field normalisation shared by customers and leads.

use estateerp_core::DomainError;

/// Lower-case and trim an e-mail address; `None` for blank input.
pub fn normalize_email(input: Option<&str>) -> Result<Option<String>, DomainError> {
    let Some(email) = input.map(str::trim).filter(|e| !e.is_empty()) else {
        return Ok(None);
    };
    let email = email.to_ascii_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
        }
        None => false,
    };
    if !valid || email.contains(char::is_whitespace) {
        return Err(DomainError::validation(format!("invalid email '{email}'")));
    }
    Ok(Some(email))
}

/// Strip spaces, dashes and brackets from a phone number; keep a leading `+`.
pub fn normalize_phone(input: Option<&str>) -> Result<Option<String>, DomainError> {
    let Some(raw) = input.map(str::trim).filter(|p| !p.is_empty()) else {
        return Ok(None);
    };
    let plus = raw.starts_with('+');
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '+'))
        .collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) || !(10..=13).contains(&digits.len()) {
        return Err(DomainError::validation(format!("invalid phone number '{raw}'")));
    }
    Ok(Some(if plus { format!("+{digits}") } else { digits }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contacts_are_normalised() {
        assert_eq!(
            normalize_email(Some("  Asha@Example.IN ")).unwrap(),
            Some("asha@example.in".to_string())
        );
        assert!(normalize_email(Some("asha@example")).is_err());
        assert_eq!(normalize_email(Some("   ")).unwrap(), None);

        assert_eq!(
            normalize_phone(Some("+91 98200-12345")).unwrap(),
            Some("+919820012345".to_string())
        );
        assert!(normalize_phone(Some("12345")).is_err());
        assert!(normalize_phone(Some("98200x2345")).is_err());
    }
}
