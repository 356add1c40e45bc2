//! Shared primitives for all attemptguard crates.

#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across attemptguard crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated, normalized throttle key.
///
/// Identifies the actor an attempt is attributed to, typically an email
/// address or phone number. Construction trims surrounding whitespace and
/// lower-cases the value, so two spellings of the same identity always map
/// to the same stored history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThrottleKey(String);

impl ThrottleKey {
    /// Creates a normalized throttle key.
    ///
    /// Rejects values that are empty or whitespace-only after trimming.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let normalized = value.into().trim().to_lowercase();
        if normalized.is_empty() {
            return Err(AppError::Validation(
                "throttle key must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(normalized))
    }

    /// Returns the normalized key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<ThrottleKey> for String {
    fn from(value: ThrottleKey) -> Self {
        value.0
    }
}

impl Display for ThrottleKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Too many attempts within the active window.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}
