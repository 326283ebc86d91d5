use anyhow::anyhow;
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand_core::OsRng;

/// Hashes `plain` with a fresh random salt into a PHC string.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Pbkdf2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|err| anyhow!("could not hash password: {}", err))?;
    Ok(hash.to_string())
}

/// A stored hash that does not parse never verifies.
pub fn verify_password(plain: &str, stored: &str) -> bool {
    let hash = match PasswordHash::new(stored) {
        Ok(hash) => hash,
        Err(err) => {
            log::error!("Stored password hash is not a PHC string: {}", err);
            return false;
        }
    };
    Pbkdf2.verify_password(plain.as_bytes(), &hash).is_ok()
}
