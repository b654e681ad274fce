use bigdecimal::BigDecimal;
use std::fmt;

pub const ORDER_REFERENCE_MAX_LEN: usize = 64;
pub const DESCRIPTION_MAX_LEN: usize = 100;
pub const NAME_MAX_LEN: usize = 64;
pub const EMAIL_MAX_LEN: usize = 254;
pub const PHONE_MIN_DIGITS: usize = 9;
pub const PHONE_MAX_DIGITS: usize = 15;
pub const MAX_AMOUNT: i64 = 10_000_000;
pub const AMOUNT_MAX_DECIMALS: i64 = 2;
pub const ALLOWED_CURRENCIES: &[&str] = &["KES", "UGX", "TZS", "RWF", "USD"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.chars().count() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_enum(field: &'static str, value: &str, allowed: &[&str]) -> ValidationResult {
    if allowed.iter().all(|candidate| value != *candidate) {
        return Err(ValidationError::new(
            field,
            format!("must be one of: {}", allowed.join(", ")),
        ));
    }

    Ok(())
}

pub fn validate_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    if amount > &BigDecimal::from(MAX_AMOUNT) {
        return Err(ValidationError::new(
            "amount",
            format!("must not exceed {}", MAX_AMOUNT),
        ));
    }

    // Stored as NUMERIC(20, 2); anything finer would be rounded on insert.
    if &amount.with_scale(AMOUNT_MAX_DECIMALS) != amount {
        return Err(ValidationError::new(
            "amount",
            format!("must have at most {} decimal places", AMOUNT_MAX_DECIMALS),
        ));
    }

    Ok(())
}

/// Returns the normalised (trimmed, uppercase) currency code.
pub fn validate_currency(currency: &str) -> Result<String, ValidationError> {
    let currency = sanitize_string(currency).to_ascii_uppercase();
    validate_required("currency", &currency)?;
    validate_enum("currency", &currency, ALLOWED_CURRENCIES)?;
    Ok(currency)
}

/// Returns the phone number with separators removed, keeping a leading `+`.
pub fn validate_phone(phone: &str) -> Result<String, ValidationError> {
    let compact: String = phone
        .chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '-')
        .collect();
    validate_required("phone", &compact)?;

    let digits = compact.strip_prefix('+').unwrap_or(&compact);
    if !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ValidationError::new("phone", "must contain only digits"));
    }

    if !(PHONE_MIN_DIGITS..=PHONE_MAX_DIGITS).contains(&digits.len()) {
        return Err(ValidationError::new(
            "phone",
            format!(
                "must have between {} and {} digits",
                PHONE_MIN_DIGITS, PHONE_MAX_DIGITS
            ),
        ));
    }

    Ok(compact)
}

pub fn validate_order_reference(order_reference: &str) -> Result<String, ValidationError> {
    let order_reference = sanitize_string(order_reference);
    validate_required("orderRef", &order_reference)?;
    validate_max_len("orderRef", &order_reference, ORDER_REFERENCE_MAX_LEN)?;

    if !order_reference
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(ValidationError::new(
            "orderRef",
            "must contain only letters, digits, '-' or '_'",
        ));
    }

    Ok(order_reference)
}

pub fn validate_email(email: &str) -> ValidationResult {
    validate_max_len("email", email, EMAIL_MAX_LEN)?;

    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ValidationError::new("email", "must be a valid email address")),
    }
}
