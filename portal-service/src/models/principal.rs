use super::role::Role;
use super::user::User;

/// The authenticated caller, attached to the request by the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub email: String,
    pub role: Role,
    pub profile_id: Option<String>,
}

impl From<&User> for Principal {
    fn from(u: &User) -> Self {
        Self {
            user_id: u.id.clone(),
            email: u.email.clone(),
            role: u.role,
            profile_id: u.profile_id.clone(),
        }
    }
}
