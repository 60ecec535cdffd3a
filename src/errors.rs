//! # Error Types Module
//!
//! Error types shared by the dialogue engine, the callback dispatcher and the
//! collaborator adapters. Input and callback errors are always recovered
//! locally; store and notify errors come from I/O behind the collaborator traits.

use thiserror::Error;

/// Validation failure for the input of the current dialogue step
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("input is empty")]
    Empty,
    #[error("input is too long")]
    TooLong,
    #[error("phone number is not valid")]
    InvalidPhone,
    #[error("date could not be parsed")]
    InvalidDate,
    #[error("date is in the past")]
    PastDate,
    #[error("time could not be parsed")]
    InvalidTime,
    #[error("unknown subcategory")]
    UnknownSubcategory,
    #[error("photo limit of {0} reached")]
    PhotoLimit(usize),
    #[error("rating must be between 1 and 5")]
    RatingOutOfRange,
    #[error("unknown role")]
    UnknownRole,
    #[error("nickname may only contain latin letters, digits and underscores")]
    InvalidNickname,
    #[error("nickname already taken")]
    NicknameTaken,
    #[error("unexpected input for this step")]
    Unexpected,
}

impl InputError {
    /// Localization key of the message shown before the step is re-prompted
    pub fn message_key(&self) -> &'static str {
        match self {
            InputError::Empty => "error-empty-input",
            InputError::TooLong => "error-too-long",
            InputError::InvalidPhone => "error-invalid-phone",
            InputError::InvalidDate => "error-invalid-date",
            InputError::PastDate => "error-past-date",
            InputError::InvalidTime => "error-invalid-time",
            InputError::UnknownSubcategory => "error-unknown-subcategory",
            InputError::PhotoLimit(_) => "error-photo-limit",
            InputError::RatingOutOfRange => "error-rating-range",
            InputError::UnknownRole => "error-unknown-role",
            InputError::InvalidNickname => "error-invalid-nickname",
            InputError::NicknameTaken => "error-nickname-taken",
            InputError::Unexpected => "error-unexpected-input",
        }
    }
}

/// Malformed or unroutable callback payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    #[error("empty callback payload")]
    Empty,
    #[error("unknown callback prefix: {0}")]
    UnknownPrefix(String),
    #[error("malformed callback payload: {0}")]
    Malformed(String),
}

/// Startup validation failure of the callback prefix table
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("callback prefix registered twice: {0}")]
    DuplicatePrefix(String),
    #[error("callback prefix is empty or contains the delimiter: {0:?}")]
    InvalidPrefix(String),
    #[error("callback target has no registered prefix: {0}")]
    UnroutedTarget(String),
}

/// Failure of a persistence collaborator
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid stored value: {0}")]
    InvalidData(String),
}

/// Failure to deliver an outbound message
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error(transparent)]
    Telegram(#[from] teloxide::RequestError),
    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_formatting() {
        assert_eq!(InputError::PhotoLimit(20).to_string(), "photo limit of 20 reached");
        assert_eq!(
            CallbackError::UnknownPrefix("foo".to_string()).to_string(),
            "unknown callback prefix: foo"
        );
        assert_eq!(
            StoreError::Unavailable("db down".to_string()).to_string(),
            "store unavailable: db down"
        );
    }

    #[test]
    fn test_input_errors_have_distinct_message_keys() {
        let errors = [
            InputError::Empty,
            InputError::TooLong,
            InputError::InvalidPhone,
            InputError::InvalidDate,
            InputError::PastDate,
            InputError::InvalidTime,
            InputError::UnknownSubcategory,
            InputError::PhotoLimit(20),
            InputError::RatingOutOfRange,
            InputError::UnknownRole,
            InputError::InvalidNickname,
            InputError::NicknameTaken,
            InputError::Unexpected,
        ];
        let mut keys: Vec<&str> = errors.iter().map(|e| e.message_key()).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), errors.len());
    }
}
