//! Newtype IDs for type-safe entity references.
//!
//! Identifiers handed out by the identity provider and the product catalog are
//! opaque. They are stored as strings; numeric JSON values are accepted on
//! input so carts written by older clients still load.

use serde::Deserialize;
use thiserror::Error;

/// Errors produced when parsing an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// The identifier is empty or only whitespace.
    #[error("identifier must not be empty")]
    Empty,
}

/// Raw identifier as it may appear in JSON.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

fn normalize(value: String) -> Result<String, IdError> {
    if value.trim().is_empty() {
        return Err(IdError::Empty);
    }
    Ok(value)
}

fn deserialize_raw_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    };
    normalize(value).map_err(serde::de::Error::custom)
}

/// Define a type-safe string ID wrapper.
///
/// Creates a newtype around `String` with:
/// - `Serialize` as a plain string, `Deserialize` from a string or number
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - `new()`, `parse()`, `as_str()`, `Display`, `AsRef<str>`
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(#[serde(deserialize_with = "deserialize_raw_id")] String);

        impl $name {
            /// Create an ID without validation.
            ///
            /// Prefer [`Self::parse`] for values coming from outside the process.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Parse an ID, rejecting blank values.
            ///
            /// # Errors
            ///
            /// Returns `IdError::Empty` if the value is empty or whitespace.
            pub fn parse(id: impl Into<String>) -> Result<Self, IdError> {
                normalize(id.into()).map(Self)
            }

            /// Borrow the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(UserId);
define_id!(ProductId);
