//! Opaque identifiers.
//!
//! `EditId` and `ConversationId` are both plain strings on the wire, but are
//! wrapped in distinct new-types in memory so a `ConversationId` can never be
//! passed where an `EditId` is expected, or vice versa.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether `self` could have been produced by truncating `prefix`
            /// to a shorter string, i.e. `prefix` identifies `self` unambiguously
            /// among entities that share it.
            pub fn starts_with(&self, prefix: &str) -> bool {
                self.0.starts_with(prefix)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

opaque_id!(EditId);
opaque_id!(ConversationId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_distinct_ids() {
        let a = EditId::generate();
        let b = EditId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn prefix_matching() {
        let id = ConversationId::new("abcdef12");
        assert!(id.starts_with("abcd"));
        assert!(!id.starts_with("xyz"));
    }
}
