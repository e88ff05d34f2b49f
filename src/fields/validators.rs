//! Pure field validators and normalizers.
//!
//! Each validator checks a raw string against the expected shape for its
//! field kind and, on success, returns the canonical stored value. Failure
//! carries a user-facing message that the engine prepends to the re-prompt.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

static NATIONAL_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}-\d{6}-[A-Za-z]-\d{2}$").expect("valid pattern"));

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
        .expect("valid pattern")
});

/// Zimbabwean mobile prefixes recognized after the +263/0 country part.
const MOBILE_PREFIXES: &[&str] = &["71", "73", "77", "78"];

/// A failed field validation. Recoverable — the engine re-prompts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct FieldError {
    pub message: String,
}

impl FieldError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The validator assigned to an `Input` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValidator {
    /// National ID in the shape `NN-NNNNNN-A-NN`.
    NationalId,
    /// `local@domain.tld`, canonicalized to lowercase.
    Email,
    /// Local mobile number, normalized to `+263…`.
    Phone,
    /// Non-negative monetary amount.
    Currency,
    /// Monetary amount with a minimum of 1 (share capital).
    ShareCapital,
    /// Free text, whitespace-normalized.
    Text,
    /// Multi-line address, collapsed to one comma-joined line.
    Address,
}

impl FieldValidator {
    /// Validate a raw string, returning the canonical stored value.
    pub fn validate(&self, raw: &str) -> Result<String, FieldError> {
        match self {
            Self::NationalId => validate_national_id(raw),
            Self::Email => validate_email(raw),
            Self::Phone => validate_phone(raw),
            Self::Currency => validate_amount(raw, Decimal::ZERO),
            Self::ShareCapital => validate_amount(raw, Decimal::ONE),
            Self::Text => validate_text(raw),
            Self::Address => validate_address(raw),
        }
    }
}

fn validate_national_id(raw: &str) -> Result<String, FieldError> {
    let trimmed = raw.trim();
    if NATIONAL_ID_RE.is_match(trimmed) {
        Ok(trimmed.to_uppercase())
    } else {
        Err(FieldError::new(
            "That ID doesn't look right. Please use the format 63-123456-A-42.",
        ))
    }
}

fn validate_email(raw: &str) -> Result<String, FieldError> {
    let trimmed = raw.trim();
    if EMAIL_RE.is_match(trimmed) {
        Ok(trimmed.to_lowercase())
    } else {
        Err(FieldError::new(
            "That doesn't look like an email address. Please try again (e.g. name@example.com).",
        ))
    }
}

fn validate_phone(raw: &str) -> Result<String, FieldError> {
    let digits: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();

    let local = if let Some(rest) = digits.strip_prefix("+263") {
        rest.to_string()
    } else if let Some(rest) = digits.strip_prefix("263") {
        rest.to_string()
    } else if let Some(rest) = digits.strip_prefix('0') {
        rest.to_string()
    } else {
        return Err(phone_error());
    };

    // Expect network prefix + 7 digits, all numeric.
    if local.len() != 9 || !local.chars().all(|c| c.is_ascii_digit()) {
        return Err(phone_error());
    }
    if !MOBILE_PREFIXES.iter().any(|p| local.starts_with(p)) {
        return Err(phone_error());
    }

    Ok(format!("+263{local}"))
}

fn phone_error() -> FieldError {
    FieldError::new(
        "That doesn't look like a valid mobile number. Please use 0771234567 or +263771234567.",
    )
}

fn validate_amount(raw: &str, min: Decimal) -> Result<String, FieldError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    if cleaned.is_empty() {
        return Err(amount_error(min));
    }

    let amount = Decimal::from_str(&cleaned).map_err(|_| amount_error(min))?;
    if amount.is_sign_negative() || amount < min {
        return Err(amount_error(min));
    }

    Ok(amount.normalize().to_string())
}

fn amount_error(min: Decimal) -> FieldError {
    if min > Decimal::ZERO {
        FieldError::new(format!(
            "Please enter an amount of at least {min} (e.g. 1000 or USD 1,000)."
        ))
    } else {
        FieldError::new("Please enter a valid amount (e.g. 1000 or USD 1,000).")
    }
}

fn validate_text(raw: &str) -> Result<String, FieldError> {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        Err(FieldError::new("Please enter a value."))
    } else {
        Ok(normalized)
    }
}

fn validate_address(raw: &str) -> Result<String, FieldError> {
    let lines: Vec<String> = raw
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect();

    if lines.is_empty() {
        Err(FieldError::new("Please enter an address."))
    } else {
        Ok(lines.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── National ID ─────────────────────────────────────────────────

    #[test]
    fn national_id_valid() {
        assert_eq!(
            FieldValidator::NationalId.validate("63-123456-A-42").unwrap(),
            "63-123456-A-42"
        );
    }

    #[test]
    fn national_id_uppercases_letter() {
        assert_eq!(
            FieldValidator::NationalId.validate(" 63-123456-k-42 ").unwrap(),
            "63-123456-K-42"
        );
    }

    #[test]
    fn national_id_rejects_wrong_shape() {
        let v = FieldValidator::NationalId;
        assert!(v.validate("63123456A42").is_err());
        assert!(v.validate("6-123456-A-42").is_err());
        assert!(v.validate("63-12345-A-42").is_err());
        assert!(v.validate("63-123456-AB-42").is_err());
        assert!(v.validate("63-123456-A-4").is_err());
        assert!(v.validate("").is_err());
    }

    // ── Email ───────────────────────────────────────────────────────

    #[test]
    fn email_valid_and_lowercased() {
        assert_eq!(
            FieldValidator::Email.validate("Tendai.Moyo@Example.COM").unwrap(),
            "tendai.moyo@example.com"
        );
    }

    #[test]
    fn email_rejects_bad_shapes() {
        let v = FieldValidator::Email;
        assert!(v.validate("not-an-email").is_err());
        assert!(v.validate("a@b").is_err());
        assert!(v.validate("@example.com").is_err());
        assert!(v.validate("a b@example.com").is_err());
    }

    // ── Phone ───────────────────────────────────────────────────────

    #[test]
    fn phone_accepts_local_and_international() {
        let v = FieldValidator::Phone;
        assert_eq!(v.validate("0771234567").unwrap(), "+263771234567");
        assert_eq!(v.validate("+263 77 123 4567").unwrap(), "+263771234567");
        assert_eq!(v.validate("263712345678").unwrap(), "+263712345678");
        assert_eq!(v.validate("078-123-4567").unwrap(), "+263781234567");
    }

    #[test]
    fn phone_rejects_unknown_prefixes_and_lengths() {
        let v = FieldValidator::Phone;
        assert!(v.validate("0751234567").is_err()); // unrecognized network
        assert!(v.validate("077123456").is_err()); // too short
        assert!(v.validate("07712345678").is_err()); // too long
        assert!(v.validate("12345").is_err());
        assert!(v.validate("").is_err());
    }

    // ── Amounts ─────────────────────────────────────────────────────

    #[test]
    fn currency_strips_noise() {
        let v = FieldValidator::Currency;
        assert_eq!(v.validate("USD 1,000").unwrap(), "1000");
        assert_eq!(v.validate("$250.50").unwrap(), "250.5");
        assert_eq!(v.validate("0").unwrap(), "0");
    }

    #[test]
    fn currency_never_coerces_garbage_to_zero() {
        assert!(FieldValidator::Currency.validate("free").is_err());
        assert!(FieldValidator::Currency.validate("").is_err());
        assert!(FieldValidator::Currency.validate("..").is_err());
    }

    #[test]
    fn share_capital_enforces_minimum() {
        let v = FieldValidator::ShareCapital;
        assert_eq!(v.validate("1").unwrap(), "1");
        assert_eq!(v.validate("USD 5,000").unwrap(), "5000");
        assert!(v.validate("0").is_err());
        assert!(v.validate("0.5").is_err());
    }

    // ── Text and address ────────────────────────────────────────────

    #[test]
    fn text_collapses_whitespace() {
        assert_eq!(
            FieldValidator::Text.validate("  Acme   Holdings \t Ltd ").unwrap(),
            "Acme Holdings Ltd"
        );
    }

    #[test]
    fn text_rejects_empty() {
        assert!(FieldValidator::Text.validate("   ").is_err());
    }

    #[test]
    fn address_joins_lines_with_commas() {
        assert_eq!(
            FieldValidator::Address
                .validate("12 Samora Machel Ave\n\n  Harare  \nZimbabwe")
                .unwrap(),
            "12 Samora Machel Ave, Harare, Zimbabwe"
        );
    }

    #[test]
    fn address_rejects_empty() {
        assert!(FieldValidator::Address.validate("\n  \n").is_err());
    }
}
