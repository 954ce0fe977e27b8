//! Canonical read projection of one CRM deal, as consumed by the pipeline.

use rust_decimal::Decimal;

/// One sellable position extracted from a deal's linked purchases.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseLine {
    pub name: String,
    pub quantity: Decimal,
    pub price: Decimal,
}

/// Immutable snapshot of the remote deal state, built once per webhook event.
#[derive(Debug, Clone, Default)]
pub struct DealSnapshot {
    pub id: i64,
    pub status_value: Option<String>,
    pub discount: Decimal,
    /// Current value of the processing-flag field; `None` when the field is
    /// not configured or empty.
    pub processing_status: Option<String>,
    pub ttn: Option<String>,
    pub email: Option<String>,
    pub lines: Vec<PurchaseLine>,
}

impl DealSnapshot {
    /// Exact, case-sensitive match of the trimmed status value against the
    /// configured target.
    pub fn is_target_status(&self, target: &str) -> bool {
        match self.status_value.as_deref() {
            Some(value) => value.trim() == target,
            None => false,
        }
    }

    /// A deal counts as processed once the flag field carries a terminal
    /// `OK:`/`ERROR:` marker, in any case.
    pub fn is_already_processed(&self) -> bool {
        let value = self.processing_status.as_deref().unwrap_or("");
        let lower = value.to_lowercase();
        lower.starts_with("ok:") || lower.starts_with("error:")
    }

    pub fn ttn(&self) -> Option<&str> {
        self.ttn.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: &str = "Контроль оплаты";

    fn snapshot_with_status(status: Option<&str>) -> DealSnapshot {
        DealSnapshot {
            id: 1,
            status_value: status.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn target_status_is_exact_after_trim() {
        assert!(snapshot_with_status(Some("Контроль оплаты")).is_target_status(TARGET));
        assert!(snapshot_with_status(Some("  Контроль оплаты  ")).is_target_status(TARGET));
        assert!(!snapshot_with_status(Some("контроль оплаты")).is_target_status(TARGET));
        assert!(!snapshot_with_status(Some("Новая")).is_target_status(TARGET));
        assert!(!snapshot_with_status(None).is_target_status(TARGET));
    }

    fn snapshot_with_flag(flag: Option<&str>) -> DealSnapshot {
        DealSnapshot {
            id: 1,
            processing_status: flag.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn processed_marker_matches_any_case_prefix() {
        assert!(snapshot_with_flag(Some("OK: 123 (id: 456)")).is_already_processed());
        assert!(snapshot_with_flag(Some("ok: done")).is_already_processed());
        assert!(snapshot_with_flag(Some("ERROR: no TTN in deal")).is_already_processed());
        assert!(snapshot_with_flag(Some("Error: boom")).is_already_processed());
        assert!(!snapshot_with_flag(Some("pending")).is_already_processed());
        assert!(!snapshot_with_flag(Some("")).is_already_processed());
        assert!(!snapshot_with_flag(None).is_already_processed());
    }

    #[test]
    fn ttn_is_trimmed_and_empty_is_none() {
        let mut snapshot = snapshot_with_status(None);
        snapshot.ttn = Some("  204501 ".to_string());
        assert_eq!(snapshot.ttn(), Some("204501"));
        snapshot.ttn = Some("   ".to_string());
        assert_eq!(snapshot.ttn(), None);
        snapshot.ttn = None;
        assert_eq!(snapshot.ttn(), None);
    }
}
