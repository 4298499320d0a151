// ===============================
// src/domain.rs
// ===============================
use serde::{Deserialize, Serialize};

/// A selectable investment target. Supplied by the options provider;
/// never created or destroyed here, only chosen from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fund { pub id: String, pub name: String }

/// Current user entry. Selection is always a sequence of fund ids, even in
/// the single-select UI (capped by `max_selectable` in config).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormInput { pub selection: Vec<String>, pub amount_text: String }

/// Inclusive contribution limits in pounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds { pub min: f64, pub max: f64 }

impl Default for Bounds {
    fn default() -> Self { Bounds { min: 25.0, max: 20_000.0 } }
}

/// Per-field error messages (empty string = no error) plus the aggregate flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult { pub fund: String, pub amount: String, pub is_valid: bool }

impl Default for ValidationResult {
    fn default() -> Self {
        ValidationResult { fund: String::new(), amount: String::new(), is_valid: true }
    }
}

/// One completed submission, as persisted. Amount is a 2-decimal string,
/// timestamp is RFC 3339 UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Investment { pub amount: String, pub funds: Vec<Fund>, pub timestamp: String }

/// What the options endpoint returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsPayload {
    pub available_funds: Vec<Fund>,
    pub min_investment: f64,
    pub max_investment: f64,
}

/// Form lifecycle. `Submitted` auto-reverts to `Editing` after the
/// configured delay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Editing,
    Submitted,
}

/// UI input events fed to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
    SelectFund(String),
    AmountInput(String),
    Submit,
}

/// Read-only view of controller state, published after every transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormSnapshot {
    pub phase: Phase,
    pub input: FormInput,
    pub errors: ValidationResult,
    pub bounds: Bounds,
    pub funds: Vec<Fund>,
    pub options_loaded: bool,
    pub can_submit: bool,
    pub notice: Option<String>,
    pub history: Vec<Investment>,
}

/// Lines written by the JSONL audit recorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuditEvent {
    OptionsLoaded { funds: usize, min: f64, max: f64 },
    Input { field: String, value: String },
    InputRejected { field: String, value: String },
    Invalid { fund: String, amount: String },
    Submitted(Investment),
    StoreFailed(String),
    Reverted,
}

/// Display form for amounts: "£" prefix, exactly 2 decimal places.
pub fn gbp(amount: f64) -> String {
    format!("£{:.2}", amount)
}

/// Display form for bounds in error messages: no trailing ".00" on whole
/// pounds ("£25", "£20000").
pub fn gbp_bound(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("£{}", amount as i64)
    } else {
        format!("£{}", amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gbp_renders_two_decimals() {
        assert_eq!(gbp(100.0), "£100.00");
        assert_eq!(gbp(24.5), "£24.50");
    }

    #[test]
    fn gbp_bound_drops_whole_pound_decimals() {
        assert_eq!(gbp_bound(25.0), "£25");
        assert_eq!(gbp_bound(20_000.0), "£20000");
        assert_eq!(gbp_bound(25.5), "£25.5");
    }

    #[test]
    fn investment_serializes_camel_case() {
        let rec = Investment {
            amount: "100.00".into(),
            funds: vec![Fund { id: "equities".into(), name: "Cushon Equities Fund".into() }],
            timestamp: "2025-01-01T00:00:00.000Z".into(),
        };
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"funds\""));
        assert!(json.contains("\"timestamp\""));
        let back: Investment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn options_payload_parses_endpoint_shape() {
        let json = r#"{
            "availableFunds": [
                { "id": "equities", "name": "Cushon Equities Fund" },
                { "id": "bonds", "name": "Cushon Bonds Fund" },
                { "id": "mixed", "name": "Cushon Mixed Fund" }
            ],
            "minInvestment": 25,
            "maxInvestment": 20000
        }"#;
        let p: OptionsPayload = serde_json::from_str(json).unwrap();
        assert_eq!(p.available_funds.len(), 3);
        assert_eq!(p.min_investment, 25.0);
        assert_eq!(p.max_investment, 20_000.0);
    }
}
