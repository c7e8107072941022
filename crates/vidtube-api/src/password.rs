use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand_core::OsRng;

/// Hash a plaintext password with Argon2id and a fresh random salt.
pub fn hash_password(plaintext: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

/// False for a wrong password. A malformed stored hash is an error.
pub fn verify_password(plaintext: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| anyhow::anyhow!("stored hash unreadable: {}", e))?;
    Ok(Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_salted_and_not_plaintext() {
        let a = hash_password("hunter22").unwrap();
        let b = hash_password("hunter22").unwrap();
        assert_ne!(a, "hunter22");
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2id$"));
    }

    #[test]
    fn single_character_mutations_fail() {
        let password = "correct horse";
        let hash = hash_password(password).unwrap();
        assert!(verify_password(password, &hash).unwrap());

        for i in 0..password.len() {
            let mut mutated = password.as_bytes().to_vec();
            mutated[i] = if mutated[i] == b'x' { b'y' } else { b'x' };
            let mutated = String::from_utf8(mutated).unwrap();
            assert!(!verify_password(&mutated, &hash).unwrap(), "accepted {mutated:?}");
        }
        assert!(!verify_password("correct hors", &hash).unwrap());
        assert!(!verify_password("correct horse!", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("whatever", "plaintext-not-a-hash").is_err());
    }
}
