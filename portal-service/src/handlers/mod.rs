//! HTTP handlers for the portal API.

pub mod appointments;
pub mod auth;
pub mod dashboard;
pub mod health;
pub mod metrics;

pub use appointments::*;
pub use auth::*;
pub use dashboard::*;
pub use health::*;
