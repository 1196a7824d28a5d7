pub mod password;
pub mod validation;

pub use password::{
    hash_password, hash_password_blocking, verify_password, verify_password_blocking, Password,
    PasswordHashString,
};
pub use validation::ValidatedJson;

use rand::RngCore;

/// 32 random bytes, hex encoded. Used for reset and verification tokens.
pub fn generate_random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
