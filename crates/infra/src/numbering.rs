//! Per-tenant document number series (`JV/00012`, `INV/00003`).
//!
//! Counters are in memory and seeded by the projections as they see numbered
//! documents, so a replay at startup restores them.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use estateerp_core::TenantId;

pub const INVOICE_PREFIX: &str = "INV";

#[derive(Debug, Default)]
pub struct NumberSeries {
    last: Mutex<HashMap<(TenantId, String), u64>>,
}

impl NumberSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each update is a single assignment, so a poisoned map is still consistent.
    fn counters(&self) -> MutexGuard<'_, HashMap<(TenantId, String), u64>> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve the next number of the series.
    pub fn next(&self, tenant_id: TenantId, prefix: &str) -> String {
        let mut map = self.counters();
        let slot = map.entry((tenant_id, prefix.to_string())).or_insert(0);
        *slot += 1;
        format_number(prefix, *slot)
    }

    /// Record a number issued elsewhere (replay, restore, manual entry).
    pub fn observe(&self, tenant_id: TenantId, number: &str) {
        let Some((prefix, n)) = parse_number(number) else {
            return;
        };
        let mut map = self.counters();
        let slot = map.entry((tenant_id, prefix.to_string())).or_insert(0);
        *slot = (*slot).max(n);
    }
}

pub fn format_number(prefix: &str, n: u64) -> String {
    format!("{prefix}/{n:05}")
}

fn parse_number(number: &str) -> Option<(&str, u64)> {
    let (prefix, n) = number.rsplit_once('/')?;
    Some((prefix, n.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_continue_after_observed_numbers() {
        let numbers = NumberSeries::new();
        let t = TenantId::new();

        assert_eq!(numbers.next(t, "JV"), "JV/00001");
        numbers.observe(t, "JV/00007");
        numbers.observe(t, "free text");
        assert_eq!(numbers.next(t, "JV"), "JV/00008");
        assert_eq!(numbers.next(t, "RV"), "RV/00001");
        assert_eq!(numbers.next(TenantId::new(), "JV"), "JV/00001");
    }

    #[test]
    fn poisoned_lock_keeps_counting() {
        let numbers = std::sync::Arc::new(NumberSeries::new());
        let t = TenantId::new();
        numbers.next(t, "INV");
        numbers.next(t, "INV");

        let held = numbers.clone();
        let _ = std::thread::spawn(move || {
            let _guard = held.last.lock().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(numbers.last.is_poisoned());

        assert_eq!(numbers.next(t, "INV"), "INV/00003");
        numbers.observe(t, "INV/00010");
        assert_eq!(numbers.next(t, "INV"), "INV/00011");
    }
}
