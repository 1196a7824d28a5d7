//! Role hierarchy and ownership checks.
//!
//! Everything here is a pure function of already-loaded data. Checks that
//! need the target resource first return
//! [`AccessDecision::OwnershipCheckRequired`] and leave the fetch to the
//! caller.

use thiserror::Error;

use crate::models::{Principal, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleMode {
    /// The role must be one of the listed roles.
    Exact,
    /// The role must rank at or above the lowest listed role.
    AtLeast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    PatientRecord,
    Appointment,
    Billing,
    StaffDirectory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Granted,
    OwnershipCheckRequired,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthzError {
    #[error("Requires one of the roles: {}", role_list(.0))]
    RoleNotAllowed(Vec<Role>),

    #[error("Insufficient privilege")]
    InsufficientPrivilege,

    #[error("Access to this resource is not permitted")]
    NotOwner,
}

fn role_list(roles: &[Role]) -> String {
    roles
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// `role` ranks at or above `min`. Level-0 roles never pass.
pub fn at_least(role: Role, min: Role) -> bool {
    role.level() > 0 && min.level() > 0 && role.level() >= min.level()
}

pub fn exactly_one_of(role: Role, allowed: &[Role]) -> bool {
    role.level() > 0 && allowed.contains(&role)
}

#[derive(Debug, Clone, Copy)]
pub struct Authorizer {
    self_service_tier: Role,
}

impl Authorizer {
    pub fn new(self_service_tier: Role) -> Self {
        Self { self_service_tier }
    }

    pub fn self_service_tier(&self) -> Role {
        self.self_service_tier
    }

    /// An empty `allowed` set denies in both modes.
    pub fn require_role(&self, role: Role, allowed: &[Role], mode: RoleMode) -> Result<(), AuthzError> {
        match mode {
            RoleMode::Exact => {
                if exactly_one_of(role, allowed) {
                    Ok(())
                } else {
                    Err(AuthzError::RoleNotAllowed(allowed.to_vec()))
                }
            }
            RoleMode::AtLeast => {
                let min = allowed
                    .iter()
                    .copied()
                    .filter(|r| r.level() > 0)
                    .min_by_key(|r| r.level());
                match min {
                    Some(min) if at_least(role, min) => Ok(()),
                    _ => Err(AuthzError::InsufficientPrivilege),
                }
            }
        }
    }

    /// Roles above the self-service tier skip ownership entirely.
    pub fn bypasses_ownership(&self, role: Role) -> bool {
        role.level() > self.self_service_tier.level()
    }

    pub fn check_ownership(&self, principal: &Principal, owner_id: &str) -> Result<(), AuthzError> {
        if principal.role.level() == 0 {
            return Err(AuthzError::InsufficientPrivilege);
        }
        if self.bypasses_ownership(principal.role) {
            return Ok(());
        }
        match principal.profile_id.as_deref() {
            Some(profile_id) if profile_id == owner_id => Ok(()),
            _ => Err(AuthzError::NotOwner),
        }
    }

    pub fn check_collection_access(
        &self,
        principal: &Principal,
        kind: ResourceKind,
    ) -> Result<AccessDecision, AuthzError> {
        if principal.role.level() == 0 {
            return Err(AuthzError::InsufficientPrivilege);
        }
        Ok(match kind {
            ResourceKind::StaffDirectory => AccessDecision::Granted,
            _ if self.bypasses_ownership(principal.role) => AccessDecision::Granted,
            ResourceKind::PatientRecord | ResourceKind::Appointment | ResourceKind::Billing => {
                AccessDecision::OwnershipCheckRequired
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role, profile: Option<&str>) -> Principal {
        Principal {
            user_id: "u".into(),
            email: "u@example.com".into(),
            role,
            profile_id: profile.map(str::to_string),
        }
    }

    #[test]
    fn test_at_least_staff() {
        let authz = Authorizer::new(Role::Patient);
        for role in [Role::Staff, Role::Doctor, Role::Admin, Role::SuperAdmin] {
            assert!(authz.require_role(role, &[Role::Staff], RoleMode::AtLeast).is_ok());
        }
        assert_eq!(
            authz.require_role(Role::Patient, &[Role::Staff], RoleMode::AtLeast),
            Err(AuthzError::InsufficientPrivilege)
        );
        assert!(authz
            .require_role(Role::Unknown, &[Role::Patient], RoleMode::AtLeast)
            .is_err());
    }

    #[test]
    fn test_at_least_uses_lowest_allowed() {
        let authz = Authorizer::new(Role::Patient);
        assert!(authz
            .require_role(Role::Doctor, &[Role::Admin, Role::Doctor], RoleMode::AtLeast)
            .is_ok());
        assert!(authz
            .require_role(Role::Staff, &[Role::Admin, Role::Doctor], RoleMode::AtLeast)
            .is_err());
    }

    #[test]
    fn test_exact_mode_lists_allowed_roles() {
        let authz = Authorizer::new(Role::Patient);
        assert!(authz
            .require_role(Role::Doctor, &[Role::Doctor, Role::Staff], RoleMode::Exact)
            .is_ok());

        let err = authz
            .require_role(Role::Admin, &[Role::Doctor, Role::Staff], RoleMode::Exact)
            .unwrap_err();
        assert_eq!(err.to_string(), "Requires one of the roles: doctor, staff");
    }

    #[test]
    fn test_empty_allowed_set_denies() {
        let authz = Authorizer::new(Role::Patient);
        assert!(authz.require_role(Role::SuperAdmin, &[], RoleMode::Exact).is_err());
        assert!(authz.require_role(Role::SuperAdmin, &[], RoleMode::AtLeast).is_err());
    }

    #[test]
    fn test_ownership() {
        let authz = Authorizer::new(Role::Patient);

        let own = principal(Role::Patient, Some("p-1"));
        assert!(authz.check_ownership(&own, "p-1").is_ok());
        assert_eq!(authz.check_ownership(&own, "p-2"), Err(AuthzError::NotOwner));

        let unlinked = principal(Role::Patient, None);
        assert_eq!(authz.check_ownership(&unlinked, "p-1"), Err(AuthzError::NotOwner));

        for role in [Role::Staff, Role::Doctor, Role::Admin, Role::SuperAdmin] {
            assert!(authz.check_ownership(&principal(role, None), "p-2").is_ok());
        }
    }

    #[test]
    fn test_collection_access() {
        let authz = Authorizer::new(Role::Patient);
        assert_eq!(
            authz.check_collection_access(&principal(Role::Patient, Some("p")), ResourceKind::Appointment),
            Ok(AccessDecision::OwnershipCheckRequired)
        );
        assert_eq!(
            authz.check_collection_access(&principal(Role::Doctor, None), ResourceKind::Appointment),
            Ok(AccessDecision::Granted)
        );
        assert_eq!(
            authz.check_collection_access(&principal(Role::Patient, None), ResourceKind::StaffDirectory),
            Ok(AccessDecision::Granted)
        );
        assert!(authz
            .check_collection_access(&principal(Role::Unknown, None), ResourceKind::StaffDirectory)
            .is_err());
    }

    #[test]
    fn test_higher_self_service_tier() {
        let authz = Authorizer::new(Role::Staff);
        assert!(authz
            .check_ownership(&principal(Role::Staff, Some("x")), "y")
            .is_err());
        assert!(authz.check_ownership(&principal(Role::Doctor, None), "y").is_ok());
    }
}
