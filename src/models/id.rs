use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid portal id {value:?}: ids must be a non-empty run of ASCII digits")]
pub struct IdError {
    value: String,
}

/// Parse a portal-assigned identifier, rejecting anything that is not purely digits.
///
/// The portal exposes ids as strings in attributes and query parameters, so
/// `"00123"` is accepted but `"12a"`, `"-5"` and `""` are not.
fn parse_digits(value: &str) -> Result<i64, IdError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(IdError {
            value: value.to_string(),
        });
    }
    trimmed.parse().map_err(|_| IdError {
        value: value.to_string(),
    })
}

macro_rules! portal_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub fn new(value: i64) -> Self {
                Self(value)
            }

            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_digits(s).map(Self)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

portal_id!(
    /// Portal-assigned invoice identifier. Stable across runs.
    InvoiceId
);

portal_id!(
    /// Portal-assigned statement identifier. Unique across the whole dataset,
    /// so it doubles as the property key.
    StatementId
);

/// Row id of a scrape run in the persistence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(i64);

impl RunId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
