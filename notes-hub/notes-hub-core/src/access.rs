//! Page access bitmask.
//!
//! The low bits are independent capabilities. The two high bits are folding
//! directives carried on stored records and never appear in a resolved mask.
//! The layout is shared with the stored schema and must stay bit-compatible.

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessBitmask: u64 {
        /// View the page and the titles of the pages above it.
        const READ = 1;
        /// Edit or move the page.
        const WRITE = 1 << 1;
        const DELETE = 1 << 2;
        /// View the page's change history.
        const AUDIT = 1 << 3;
        /// Edit the permissions on the page.
        const MODERATE = 1 << 4;

        /// The record also applies to every descendant page.
        const INHERIT = 1 << 62;
        /// The record removes its capabilities instead of granting them.
        const DENY = 1 << 63;

        const FULL = Self::READ.bits()
            | Self::WRITE.bits()
            | Self::DELETE.bits()
            | Self::AUDIT.bits()
            | Self::MODERATE.bits();

        const CONTROL = Self::INHERIT.bits() | Self::DENY.bits();
    }
}

const CAPABILITY_NAMES: [(AccessBitmask, &str); 5] = [
    (AccessBitmask::READ, "Read"),
    (AccessBitmask::WRITE, "Write"),
    (AccessBitmask::DELETE, "Delete"),
    (AccessBitmask::AUDIT, "Audit"),
    (AccessBitmask::MODERATE, "Moderate"),
];

impl AccessBitmask {
    /// True when every bit of `required` is set here.
    ///
    /// A query that itself carries `DENY` is always false: deny is not a
    /// capability and cannot be asked for. Use [`AccessBitmask::is_deny`] to
    /// inspect a stored record.
    pub fn has_access(self, required: AccessBitmask) -> bool {
        self.contains(required) && !required.contains(Self::DENY)
    }

    pub fn is_deny(self) -> bool {
        self.contains(Self::DENY)
    }

    pub fn is_inherited(self) -> bool {
        self.contains(Self::INHERIT)
    }

    /// The mask with the inherit and deny bits cleared.
    pub fn without_control(self) -> Self {
        self.difference(Self::CONTROL)
    }

    /// Comma separated capability names, `nothing` when none are set.
    pub fn capability_names(self) -> String {
        let names: Vec<&str> = CAPABILITY_NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            "nothing".to_string()
        } else {
            names.join(", ")
        }
    }

    /// Human readable rendering for diagnostics and the permissions UI.
    pub fn describe(self) -> String {
        let verdict = if self.is_deny() {
            "Explicitly Denied"
        } else {
            "Allowed"
        };
        let scope = if self.is_inherited() {
            " and all subnotes"
        } else {
            ""
        };
        format!(
            "{} {} to this note{}",
            verdict,
            self.capability_names(),
            scope
        )
    }
}

impl fmt::Display for AccessBitmask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl Serialize for AccessBitmask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.bits())
    }
}

impl<'de> Deserialize<'de> for AccessBitmask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u64::deserialize(deserializer).map(Self::from_bits_retain)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown access flag `{0}`")]
pub struct ParseAccessError(String);

/// Parses either a raw integer (`4611686018427387907`) or a comma separated
/// list of flag names (`read,write,inherit`).
impl FromStr for AccessBitmask {
    type Err = ParseAccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(bits) = s.parse::<u64>() {
            return Ok(Self::from_bits_retain(bits));
        }
        let mut access = Self::empty();
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            access |= match token.to_ascii_lowercase().as_str() {
                "read" => Self::READ,
                "write" => Self::WRITE,
                "delete" => Self::DELETE,
                "audit" => Self::AUDIT,
                "moderate" => Self::MODERATE,
                "full" => Self::FULL,
                "inherit" | "inherits" => Self::INHERIT,
                "deny" => Self::DENY,
                _ => return Err(ParseAccessError(token.to_string())),
            };
        }
        Ok(access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_layout_matches_schema() {
        assert_eq!(AccessBitmask::READ.bits(), 1);
        assert_eq!(AccessBitmask::WRITE.bits(), 2);
        assert_eq!(AccessBitmask::DELETE.bits(), 4);
        assert_eq!(AccessBitmask::AUDIT.bits(), 8);
        assert_eq!(AccessBitmask::MODERATE.bits(), 16);
        assert_eq!(AccessBitmask::INHERIT.bits(), 1 << 62);
        assert_eq!(AccessBitmask::DENY.bits(), 1 << 63);
        assert_eq!(AccessBitmask::FULL.bits(), 31);
    }

    #[test]
    fn has_access_requires_every_bit() {
        let access = AccessBitmask::READ | AccessBitmask::WRITE;
        assert!(access.has_access(AccessBitmask::READ));
        assert!(access.has_access(AccessBitmask::READ | AccessBitmask::WRITE));
        assert!(!access.has_access(AccessBitmask::READ | AccessBitmask::DELETE));
        assert!(access.has_access(AccessBitmask::empty()));
    }

    #[test]
    fn deny_is_never_a_capability() {
        let denied = AccessBitmask::DENY | AccessBitmask::READ;
        assert!(!denied.has_access(AccessBitmask::DENY));
        assert!(!denied.has_access(AccessBitmask::DENY | AccessBitmask::READ));
        assert!(denied.is_deny());
        assert!(!AccessBitmask::DENY.has_access(AccessBitmask::READ));
    }

    #[test]
    fn control_bits_strip() {
        let record = AccessBitmask::READ | AccessBitmask::INHERIT | AccessBitmask::DENY;
        assert_eq!(record.without_control(), AccessBitmask::READ);
        assert!(record.is_inherited());
    }

    #[test]
    fn describe_renders_verdict_and_scope() {
        assert_eq!(
            (AccessBitmask::READ | AccessBitmask::WRITE | AccessBitmask::INHERIT).describe(),
            "Allowed Read, Write to this note and all subnotes"
        );
        assert_eq!(
            (AccessBitmask::DENY | AccessBitmask::DELETE).describe(),
            "Explicitly Denied Delete to this note"
        );
        assert_eq!(
            AccessBitmask::empty().to_string(),
            "Allowed nothing to this note"
        );
    }

    #[test]
    fn serializes_as_raw_bits() {
        let access = AccessBitmask::DENY | AccessBitmask::WRITE;
        let json = serde_json::to_string(&access).unwrap();
        assert_eq!(json, (1u64 << 63 | 2).to_string());
        let back: AccessBitmask = serde_json::from_str(&json).unwrap();
        assert_eq!(back, access);
    }

    #[test]
    fn parses_names_and_numbers() {
        let parsed: AccessBitmask = "read, Write,inherit".parse().unwrap();
        assert_eq!(
            parsed,
            AccessBitmask::READ | AccessBitmask::WRITE | AccessBitmask::INHERIT
        );
        assert_eq!("31".parse::<AccessBitmask>().unwrap(), AccessBitmask::FULL);
        assert_eq!(
            "full".parse::<AccessBitmask>().unwrap(),
            AccessBitmask::FULL
        );
        assert!("execute".parse::<AccessBitmask>().is_err());
    }
}
