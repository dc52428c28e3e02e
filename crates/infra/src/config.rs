//! Process configuration read from environment variables.
//!
//! A `.env` file in the working directory is loaded first when present;
//! variables already set in the environment win.

use std::net::SocketAddr;

use thiserror::Error;
use tracing::warn;

use estateerp_invoicing::IndianState;

use crate::workflows::PostingAccounts;

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    /// State the billing company is registered in.
    pub company_state: IndianState,
    pub mail_from: String,
    /// Days past the due date before a reminder goes out.
    pub reminder_grace_days: u32,
    /// `json` or `pretty`.
    pub log_format: String,
    pub posting: PostingAccounts,
}

impl AppConfig {
    /// Load `.env` (if any) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = match var("BIND_ADDR") {
            Some(raw) => raw.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                name: "BIND_ADDR",
                reason: e.to_string(),
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        let jwt_secret = var("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET not set; using the development secret");
            DEV_JWT_SECRET.to_string()
        });

        let use_persistent_stores = match var("USE_PERSISTENT_STORES") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::Invalid {
                name: "USE_PERSISTENT_STORES",
                reason: format!("expected true or false, got '{raw}'"),
            })?,
            None => false,
        };
        let database_url = var("DATABASE_URL");
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let company_state = var("COMPANY_STATE")
            .and_then(|s| IndianState::parse(&s))
            .or_else(|| IndianState::parse("Maharashtra"))
            .ok_or(ConfigError::Missing("COMPANY_STATE"))?;
        if company_state.code().is_none() {
            warn!(company_state = %company_state, "COMPANY_STATE is not a known GST state");
        }

        let mail_from = var("MAIL_FROM").unwrap_or_else(|| "accounts@estateerp.local".to_string());
        if !crate::mail::is_plausible_address(&mail_from) {
            return Err(ConfigError::Invalid {
                name: "MAIL_FROM",
                reason: format!("'{mail_from}' is not an email address"),
            });
        }

        let reminder_grace_days = match var("REMINDER_GRACE_DAYS") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "REMINDER_GRACE_DAYS",
                reason: format!("expected a number of days, got '{raw}'"),
            })?,
            None => 0,
        };

        let log_format = var("LOG_FORMAT").unwrap_or_else(|| "json".to_string());

        let mut posting = PostingAccounts::default();
        for (name, slot) in posting_slots(&mut posting) {
            if let Some(code) = var(name) {
                *slot = code;
            }
        }

        Ok(Self {
            bind_addr,
            jwt_secret,
            use_persistent_stores,
            database_url,
            company_state,
            mail_from,
            reminder_grace_days,
            log_format,
            posting,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn posting_slots(p: &mut PostingAccounts) -> [(&'static str, &mut String); 12] {
    [
        ("POSTING_CASH", &mut p.cash),
        ("POSTING_BANK", &mut p.bank),
        ("POSTING_DEBTORS", &mut p.debtors),
        ("POSTING_SALES", &mut p.sales),
        ("POSTING_OUTPUT_CGST", &mut p.output_cgst),
        ("POSTING_OUTPUT_SGST", &mut p.output_sgst),
        ("POSTING_OUTPUT_IGST", &mut p.output_igst),
        ("POSTING_SALARIES", &mut p.salaries),
        ("POSTING_SALARY_PAYABLE", &mut p.salary_payable),
        ("POSTING_PF_PAYABLE", &mut p.pf_payable),
        ("POSTING_ESI_PAYABLE", &mut p.esi_payable),
        ("POSTING_PT_PAYABLE", &mut p.pt_payable),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert_eq!(cfg.jwt_secret, DEV_JWT_SECRET);
        assert!(!cfg.use_persistent_stores);
        assert_eq!(cfg.company_state.name(), "Maharashtra");
        assert_eq!(cfg.reminder_grace_days, 0);
        assert_eq!(cfg.posting, PostingAccounts::default());
    }

    #[test]
    fn values_and_posting_overrides_are_read() {
        let cfg = load(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("COMPANY_STATE", "33"),
            ("REMINDER_GRACE_DAYS", "7"),
            ("POSTING_BANK", "1102"),
            ("MAIL_FROM", "billing@sunrise.example"),
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(cfg.company_state.name(), "Tamil Nadu");
        assert_eq!(cfg.reminder_grace_days, 7);
        assert_eq!(cfg.posting.bank, "1102");
        assert_eq!(cfg.posting.cash, "1001");
        assert_eq!(cfg.mail_from, "billing@sunrise.example");
    }

    #[test]
    fn persistent_stores_need_a_database_url() {
        assert_eq!(
            load(&[("USE_PERSISTENT_STORES", "true")]).unwrap_err(),
            ConfigError::Missing("DATABASE_URL")
        );
        assert!(matches!(
            load(&[("USE_PERSISTENT_STORES", "maybe")]),
            Err(ConfigError::Invalid { name: "USE_PERSISTENT_STORES", .. })
        ));
        assert!(matches!(
            load(&[("REMINDER_GRACE_DAYS", "-1")]),
            Err(ConfigError::Invalid { name: "REMINDER_GRACE_DAYS", .. })
        ));
    }
}
