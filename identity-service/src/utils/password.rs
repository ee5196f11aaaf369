use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

pub const MIN_PASSWORD_LENGTH: usize = 7;

pub const PASSWORD_POLICY_MESSAGE: &str = "Password must be at least 7 characters long and contain an uppercase letter, a lowercase letter, a number and a symbol";

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for password hash
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Sign-up strength rule: upper, lower, digit and symbol, at least
/// [`MIN_PASSWORD_LENGTH`] characters.
pub fn check_password_policy(password: &Password) -> Result<(), &'static str> {
    let p = password.as_str();
    let long_enough = p.chars().count() >= MIN_PASSWORD_LENGTH;
    let has_upper = p.chars().any(|c| c.is_uppercase());
    let has_lower = p.chars().any(|c| c.is_lowercase());
    let has_digit = p.chars().any(|c| c.is_ascii_digit());
    let has_symbol = p
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    if long_enough && has_upper && has_lower && has_digit && has_symbol {
        Ok(())
    } else {
        Err(PASSWORD_POLICY_MESSAGE)
    }
}

/// Hash a password using Argon2
///
/// Uses Argon2id variant with secure default parameters.
/// Salt is automatically generated and included in the hash.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, anyhow::Error> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}

/// Verify a password against a stored hash with argon2's constant-time
/// comparator. Returns Ok(()) on a match.
pub fn verify_password(
    password: &Password,
    password_hash: &PasswordHashString,
) -> Result<(), anyhow::Error> {
    let parsed_hash = PasswordHash::new(password_hash.as_str())
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

    Argon2::default()
        .verify_password(password.as_str().as_bytes(), &parsed_hash)
        .map_err(|_| anyhow::anyhow!("Password verification failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_password_round_trip() {
        let password = Password::new("Abcdef1!");
        let hash = hash_password(&password).expect("Failed to hash password");

        assert!(hash.as_str().starts_with("$argon2"));
        assert!(verify_password(&password, &hash).is_ok());
        assert!(verify_password(&Password::new("Abcdef1?"), &hash).is_err());
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let password = Password::new("Abcdef1!");
        let hash1 = hash_password(&password).expect("Failed to hash password");
        let hash2 = hash_password(&password).expect("Failed to hash password");

        assert_ne!(hash1.as_str(), hash2.as_str());
    }

    #[test]
    fn test_policy_requires_every_character_class() {
        assert!(check_password_policy(&Password::new("Abcde1!")).is_ok());
        assert!(check_password_policy(&Password::new("Abcd1!")).is_err());
        assert!(check_password_policy(&Password::new("abcdef1!")).is_err());
        assert!(check_password_policy(&Password::new("ABCDEF1!")).is_err());
        assert!(check_password_policy(&Password::new("Abcdefg!")).is_err());
        assert!(check_password_policy(&Password::new("Abcdefg1")).is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let rendered = format!("{:?}", Password::new("Abcdef1!"));
        assert!(!rendered.contains("Abcdef1!"));
    }
}
