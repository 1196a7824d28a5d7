//! Business logic for the portal: tokens, lockout, RBAC, aggregation and
//! the account flows built on top of them.

pub mod account_guard;
pub mod aggregation;
pub mod auth;
pub mod authorizer;
pub mod delivery;
pub mod error;
pub mod jwt;
pub mod metrics;
pub mod token;

pub use account_guard::AccountGuard;
pub use aggregation::AggregationService;
pub use auth::{AuthOutcome, AuthService, NewAccount};
pub use authorizer::{AccessDecision, Authorizer, AuthzError, ResourceKind, RoleMode};
pub use delivery::{DeliveryKind, LogDelivery, RecordingDelivery, TokenDelivery};
pub use error::ServiceError;
pub use jwt::{AccessTokenClaims, JwtService, RefreshTokenClaims, TokenError, TokenKind};
pub use token::{TokenPair, TokenService};
