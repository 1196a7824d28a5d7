//! Request guards composed as an ordered chain.
//!
//! Each guard either lets the request continue or ends it with an
//! [`AuthzError`]. A chain stops at the first failure.

use crate::models::{Principal, Role};
use crate::services::{Authorizer, AuthzError, RoleMode};

pub trait Guard: Send + Sync {
    fn check(&self, authorizer: &Authorizer, principal: &Principal) -> Result<(), AuthzError>;
}

pub struct RequireRole {
    allowed: Vec<Role>,
    mode: RoleMode,
}

impl RequireRole {
    pub fn at_least(role: Role) -> Self {
        Self {
            allowed: vec![role],
            mode: RoleMode::AtLeast,
        }
    }

    pub fn one_of(roles: &[Role]) -> Self {
        Self {
            allowed: roles.to_vec(),
            mode: RoleMode::Exact,
        }
    }
}

impl Guard for RequireRole {
    fn check(&self, authorizer: &Authorizer, principal: &Principal) -> Result<(), AuthzError> {
        authorizer.require_role(principal.role, &self.allowed, self.mode)
    }
}

/// The target resource belongs to `owner_id` (a patient profile id).
pub struct RequireOwnership {
    owner_id: String,
}

impl RequireOwnership {
    pub fn of(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
        }
    }
}

impl Guard for RequireOwnership {
    fn check(&self, authorizer: &Authorizer, principal: &Principal) -> Result<(), AuthzError> {
        authorizer.check_ownership(principal, &self.owner_id)
    }
}

#[derive(Default)]
pub struct GuardChain {
    guards: Vec<Box<dyn Guard>>,
}

impl GuardChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, guard: impl Guard + 'static) -> Self {
        self.guards.push(Box::new(guard));
        self
    }

    pub fn run(&self, authorizer: &Authorizer, principal: &Principal) -> Result<(), AuthzError> {
        self.guards
            .iter()
            .try_for_each(|guard| guard.check(authorizer, principal))
    }
}
