// ===============================
// src/validate.rs
// ===============================
//
// The validation contract for the contribution form:
// - fund rule: the selection must contain at least one non-empty id.
// - amount rules, applied in order with the later failure owning the
//   message while validity ANDs across all of them:
//     presence (parses, finite, > 0) -> precision (<= 2dp) -> range (min/max).
//
// The precision check runs against the parsed value's canonical decimal
// string, not the raw text, so "100.990" re-renders as 100.99 and passes.
//
use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{gbp_bound, Bounds, FormInput, ValidationResult};

pub const MSG_FUND_REQUIRED: &str = "Please select a fund";
pub const MSG_AMOUNT_INVALID: &str = "Please enter a valid amount";
pub const MSG_AMOUNT_PRECISION: &str =
    "Please enter a valid amount with up to 2 decimal places";

static TWO_DECIMALS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(\.\d{1,2})?$").expect("two-decimal pattern"));

// What the amount field tolerates mid-edit: digits, one optional dot,
// at most two digits after it. Empty is fine (field being cleared).
static AMOUNT_IN_PROGRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d*\.?\d{0,2}$").expect("in-progress pattern"));

/// Keystroke filter for the amount field. Text that fails this keeps the
/// field at its previous value.
pub fn amount_text_acceptable(text: &str) -> bool {
    AMOUNT_IN_PROGRESS.is_match(text)
}

pub fn parse_amount(text: &str) -> Option<f64> {
    let v = text.trim().parse::<f64>().ok()?;
    v.is_finite().then_some(v)
}

pub fn min_message(bounds: Bounds) -> String {
    format!("Minimum investment is {}", gbp_bound(bounds.min))
}

pub fn max_message(bounds: Bounds) -> String {
    format!("Maximum investment is {}", gbp_bound(bounds.max))
}

/// Pure and deterministic: identical input and bounds always produce an
/// identical result, and nothing else is touched.
pub fn validate(input: &FormInput, bounds: Bounds) -> ValidationResult {
    let mut result = ValidationResult::default();

    if !input.selection.iter().any(|id| !id.is_empty()) {
        result.fund = MSG_FUND_REQUIRED.to_string();
        result.is_valid = false;
    }

    match parse_amount(&input.amount_text) {
        Some(amount) if amount > 0.0 => {
            if !TWO_DECIMALS.is_match(&amount.to_string()) {
                result.amount = MSG_AMOUNT_PRECISION.to_string();
                result.is_valid = false;
            }
            // Range failures overwrite a precision message on the same field.
            if amount < bounds.min {
                result.amount = min_message(bounds);
                result.is_valid = false;
            } else if amount > bounds.max {
                result.amount = max_message(bounds);
                result.is_valid = false;
            }
        }
        _ => {
            result.amount = MSG_AMOUNT_INVALID.to_string();
            result.is_valid = false;
        }
    }

    result
}
