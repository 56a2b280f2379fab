//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A day index outside Monday..=Sunday.
    #[error("day index must be between 0 and 6, got {value}")]
    DayOutOfRange { value: u8 },

    /// A day code that is not one of M, T, W, R, F, S, U.
    #[error("unknown day letter: {value}")]
    UnknownDay { value: String },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A saved course's identity.
    ///
    /// Keys are the course name lower-cased and trimmed; see [`CourseKey::from_name`].
    CourseKey, "course key"
);

define_string_id!(
    /// A session type code within a course (e.g. "L", "Lab", "R").
    TypeCode, "type code"
);

/// Type code given to sessions whose type is blank.
pub const UNKNOWN_TYPE: &str = "?";

impl TypeCode {
    /// Groups a raw session type string; blank types become [`UNKNOWN_TYPE`].
    pub fn from_session_type(raw: &str) -> Self {
        let trimmed = raw.trim();
        Self(if trimmed.is_empty() {
            UNKNOWN_TYPE.to_string()
        } else {
            trimmed.to_string()
        })
    }
}

impl CourseKey {
    /// Derives the key for a course name.
    pub fn from_name(name: &str) -> Result<Self, ValidationError> {
        Self::new(normalize_name(name))
    }
}

/// Normalizes a course name for case-insensitive matching.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
