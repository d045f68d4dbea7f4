//! Strongly-typed identifiers for ledger entities.
//!
//! All identifiers are opaque strings assigned outside the ledger. The only
//! validation applied is that they are not blank.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_key {
    ($name:ident, $what:expr) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self> {
                let value = value.into();
                if value.trim().is_empty() {
                    return Err(Error::InvalidRequest(concat!($what, " is required").to_string()));
                }
                Ok(Self(value))
            }

            /// Build from a compile-time literal known to be non-blank.
            pub fn from_static(value: &'static str) -> Self {
                debug_assert!(!value.trim().is_empty());
                Self(value.to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_key!(UserId, "user id");
define_key!(EventId, "event id");
define_key!(PlanId, "plan id");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_ids_rejected() {
        assert!(matches!(UserId::new(""), Err(Error::InvalidRequest(_))));
        assert!(matches!(EventId::new("   "), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn test_ids_are_opaque() {
        let user: UserId = "firebase:Xy9/abc".parse().unwrap();
        assert_eq!(user.as_str(), "firebase:Xy9/abc");
        assert_eq!(user.to_string(), "firebase:Xy9/abc");
    }

    #[test]
    fn test_serde_transparent() {
        let plan = PlanId::new("pro").unwrap();
        assert_eq!(serde_json::to_string(&plan).unwrap(), "\"pro\"");
    }
}
