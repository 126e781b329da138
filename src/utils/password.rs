use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::Hmac;
use pbkdf2::pbkdf2;
use rand::{RngCore, rngs::OsRng};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const ITERATIONS: u32 = 260000;
const KEY_LENGTH: usize = 32;
const SALT_LENGTH: usize = 16;
const PREFIX: &str = "pbkdf2:sha256";

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Invalid hash format")]
    InvalidFormat,

    #[error("Password hashing failed")]
    HashFailed,
}

/// Hash un mot de passe : pbkdf2:sha256:iterations$salt$hash
/// (salt et hash en base64 URL-safe sans padding)
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let mut salt = [0u8; SALT_LENGTH];
    OsRng.fill_bytes(&mut salt);

    let key = derive_key(password, &salt, ITERATIONS, KEY_LENGTH)?;

    Ok(format!(
        "{}:{}${}${}",
        PREFIX,
        ITERATIONS,
        URL_SAFE_NO_PAD.encode(salt),
        URL_SAFE_NO_PAD.encode(key)
    ))
}

/// Vérifie un mot de passe contre un hash stocké
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, PasswordError> {
    let mut parts = stored_hash.split('$');
    let (Some(header), Some(salt_str), Some(hash_str), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(PasswordError::InvalidFormat);
    };

    let iterations = header
        .strip_prefix(PREFIX)
        .and_then(|rest| rest.strip_prefix(':'))
        .and_then(|n| n.parse::<u32>().ok())
        .ok_or(PasswordError::InvalidFormat)?;

    let salt = URL_SAFE_NO_PAD
        .decode(salt_str)
        .map_err(|_| PasswordError::InvalidFormat)?;
    let expected = URL_SAFE_NO_PAD
        .decode(hash_str)
        .map_err(|_| PasswordError::InvalidFormat)?;

    let computed = derive_key(password, &salt, iterations, expected.len())?;

    Ok(constant_time_eq(&computed, &expected))
}

fn derive_key(
    password: &str,
    salt: &[u8],
    iterations: u32,
    length: usize,
) -> Result<Vec<u8>, PasswordError> {
    let mut key = vec![0u8; length];
    pbkdf2::<HmacSha256>(password.as_bytes(), salt, iterations, &mut key)
        .map_err(|_| PasswordError::HashFailed)?;
    Ok(key)
}

/// Comparaison en temps constant (évite les timing attacks)
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
