// Visit identifier handling
use thiserror::Error;

/// Longest visit id accepted from stage-transition actions.
pub const MAX_VISIT_ID_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("Visit ID is empty")]
    Empty,

    #[error("Visit ID exceeds {MAX_VISIT_ID_LEN} characters")]
    TooLong,

    #[error("Visit ID contains invalid character '{0}'")]
    InvalidChar(char),
}

pub fn generate_visit_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Validate a visit id: non-empty, bounded, `[A-Za-z0-9._-]` only.
pub fn validate_visit_id(id: &str) -> Result<(), IdError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(IdError::Empty);
    }
    if id.len() > MAX_VISIT_ID_LEN {
        return Err(IdError::TooLong);
    }
    match id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        Some(c) => Err(IdError::InvalidChar(c)),
        None => Ok(()),
    }
}
