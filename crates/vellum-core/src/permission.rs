//! The permission lattice.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Access level on a document, ordered `Read < Write < Owner`.
///
/// A higher level satisfies every requirement of a lower one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// View content, propose changes through suggestion branches.
    Read,
    /// Create, edit and submit one's own branches.
    Write,
    /// Full control: merge, reject, share, revoke, rotate, delete.
    Owner,
}

impl Permission {
    /// Check whether this level meets `required`.
    pub fn satisfies(self, required: Permission) -> bool {
        self >= required
    }

    /// Lowercase name, as used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Owner => "owner",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Permission::Read),
            "write" => Ok(Permission::Write),
            "owner" => Ok(Permission::Owner),
            other => Err(CoreError::Validation(format!(
                "Unknown permission: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lattice_order() {
        assert!(Permission::Owner > Permission::Write);
        assert!(Permission::Write > Permission::Read);
    }

    #[test]
    fn test_satisfies() {
        assert!(Permission::Owner.satisfies(Permission::Read));
        assert!(Permission::Write.satisfies(Permission::Write));
        assert!(!Permission::Read.satisfies(Permission::Write));
        assert!(!Permission::Write.satisfies(Permission::Owner));
    }

    #[test]
    fn test_parse() {
        assert_eq!("write".parse::<Permission>().unwrap(), Permission::Write);
        assert!("admin".parse::<Permission>().is_err());
    }
}
