//! Password hashing. Hashes are argon2 PHC strings, salted per password.

use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHasher};

use crate::error::{AppError, Result};

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::PasswordHash(format!("Failed to hash password: {}", e)))?;
    Ok(password_hash.to_string())
}
