use crate::{Id, ValidationError};
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

// Failures surfaced to callers of the Manager.
// Load-time corruption is not represented here: storage downgrades it to a
// warning (see CorruptError) so a damaged file never blocks startup.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{kind} already exists: {key}")]
    Duplicate { kind: &'static str, key: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: Id },

    #[error("No identifiers left for new {kind} records")]
    IdsExhausted { kind: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound {
            kind: "Contact",
            id: 7,
        };
        assert_eq!(err.to_string(), "Contact not found: 7");

        let err = Error::Duplicate {
            kind: "Student",
            key: "S001".into(),
        };
        assert_eq!(err.to_string(), "Student already exists: S001");

        let err: Error = ValidationError::new("email", "is required").into();
        assert_eq!(err.to_string(), "Validation failed: email is required");
    }
}
