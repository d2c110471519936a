use regex::Regex;
use std::sync::OnceLock;

// ValidationError describes which field rejected a value, and why.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field} {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

// A stateless rule for a single field value.
// Validators hold no state beyond their configuration and may be shared freely.
pub trait Validator {
    fn validate(&self, value: &str) -> Result<(), ValidationError>;
}

// Length bounds a trimmed text value to [min, max] characters.
// A min of 0 makes the field optional.
#[derive(Debug, Clone, Copy)]
pub struct Length {
    pub field: &'static str,
    pub min: usize,
    pub max: usize,
}

impl Validator for Length {
    fn validate(&self, value: &str) -> Result<(), ValidationError> {
        let len = value.trim().chars().count();
        if len == 0 && self.min > 0 {
            return Err(ValidationError::new(self.field, "is required"));
        }
        if len < self.min {
            return Err(ValidationError::new(
                self.field,
                format!("must be at least {} characters", self.min),
            ));
        }
        if len > self.max {
            return Err(ValidationError::new(
                self.field,
                format!("is too long ({len} characters, max {})", self.max),
            ));
        }
        Ok(())
    }
}

fn email_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("email pattern compiles")
    })
}

// Email accepts local-part@domain.tld.
#[derive(Debug, Clone, Copy)]
pub struct Email {
    pub field: &'static str,
    pub required: bool,
}

impl Validator for Email {
    fn validate(&self, value: &str) -> Result<(), ValidationError> {
        let value = value.trim();
        if value.is_empty() {
            return match self.required {
                true => Err(ValidationError::new(self.field, "is required")),
                false => Ok(()),
            };
        }
        if !email_pattern().is_match(value) {
            return Err(ValidationError::new(
                self.field,
                format!("is not a valid address: {value:?}"),
            ));
        }
        Ok(())
    }
}

// Remove the separators people commonly type into phone numbers.
pub fn strip_phone(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '.' | '(' | ')'))
        .collect()
}

// Phone accepts an optional leading '+' followed by 7-15 digits,
// once separators (spaces, dashes, dots, parentheses) are removed.
#[derive(Debug, Clone, Copy)]
pub struct Phone {
    pub field: &'static str,
    pub required: bool,
}

impl Validator for Phone {
    fn validate(&self, value: &str) -> Result<(), ValidationError> {
        let value = value.trim();
        if value.is_empty() {
            return match self.required {
                true => Err(ValidationError::new(self.field, "is required")),
                false => Ok(()),
            };
        }
        let stripped = strip_phone(value);
        let digits = stripped.strip_prefix('+').unwrap_or(&stripped);
        if !(7..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::new(
                self.field,
                format!("is not a valid phone number: {value:?}"),
            ));
        }
        Ok(())
    }
}
