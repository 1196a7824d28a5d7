pub mod auth;
pub mod context;
pub mod guards;

pub use auth::{auth_middleware, AuthUser, ACCESS_TOKEN_COOKIE};
pub use guards::{Guard, GuardChain, RequireOwnership, RequireRole};
