//! Role hierarchy.
//!
//! Every role name maps to a level in one table. Comparisons anywhere in the
//! service go through [`Role::level`], so there is a single place where the
//! ordering is defined.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A principal's role.
///
/// Roles travel as lowercase strings (in documents and in access tokens).
/// Names that are not in the table decode to [`Role::Unknown`], which has
/// level 0 and therefore fails every privilege comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Patient,
    Staff,
    Doctor,
    Admin,
    SuperAdmin,
    Unknown,
}

/// The ordered role table: (role, wire name, level).
const ROLE_TABLE: &[(Role, &str, u8)] = &[
    (Role::Patient, "patient", 1),
    (Role::Staff, "staff", 2),
    (Role::Doctor, "doctor", 3),
    (Role::Admin, "admin", 4),
    (Role::SuperAdmin, "superadmin", 5),
];

impl Role {
    /// All known roles, lowest privilege first.
    pub fn known() -> impl Iterator<Item = Role> {
        ROLE_TABLE.iter().map(|(role, _, _)| *role)
    }

    /// Resolve a wire name. Matching is case-insensitive.
    pub fn from_name(name: &str) -> Option<Role> {
        let name = name.trim();
        ROLE_TABLE
            .iter()
            .find(|(_, wire, _)| wire.eq_ignore_ascii_case(name))
            .map(|(role, _, _)| *role)
    }

    pub fn as_str(&self) -> &'static str {
        ROLE_TABLE
            .iter()
            .find(|(role, _, _)| role == self)
            .map(|(_, wire, _)| *wire)
            .unwrap_or("unknown")
    }

    pub fn level(&self) -> u8 {
        ROLE_TABLE
            .iter()
            .find(|(role, _, _)| role == self)
            .map(|(_, _, level)| *level)
            .unwrap_or(0)
    }
}

/// Level for an arbitrary role name; unknown names are level 0.
pub fn level_of(name: &str) -> u8 {
    Role::from_name(name).map(|r| r.level()).unwrap_or(0)
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Role::from_name(&value).unwrap_or(Role::Unknown)
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::from_name(s).ok_or_else(|| format!("Invalid role: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_strictly_increasing() {
        let levels: Vec<u8> = Role::known().map(|r| r.level()).collect();
        assert_eq!(levels, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_unknown_names_map_to_level_zero() {
        assert_eq!(level_of("janitor"), 0);
        assert_eq!(level_of(""), 0);
        assert_eq!(Role::Unknown.level(), 0);
        assert_eq!(Role::from("root".to_string()), Role::Unknown);
    }

    #[test]
    fn test_name_round_trip_through_serde() {
        let json = serde_json::to_string(&Role::SuperAdmin).unwrap();
        assert_eq!(json, "\"superadmin\"");

        let role: Role = serde_json::from_str("\"Doctor\"").unwrap();
        assert_eq!(role, Role::Doctor);

        let role: Role = serde_json::from_str("\"nurse\"").unwrap();
        assert_eq!(role, Role::Unknown);
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        assert!("admin".parse::<Role>().is_ok());
        assert!("owner".parse::<Role>().is_err());
    }
}
