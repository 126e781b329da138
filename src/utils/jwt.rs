use jsonwebtoken::{encode, decode, Header, Validation, EncodingKey, DecodingKey, Algorithm};
use serde::{Deserialize, Serialize};
use chrono::{Utc, Duration};

use crate::models::users::Role;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i32,        // user_id
    pub email: String,
    pub role: Role,
    pub exp: i64,        // expiration timestamp
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to calculate expiration")]
    Expiration,

    #[error("Failed to generate token: {0}")]
    Encode(jsonwebtoken::errors::Error),

    #[error("Invalid token: {0}")]
    Invalid(jsonwebtoken::errors::Error),
}

/// Génère un JWT token pour un utilisateur
pub fn generate_token(
    secret: &str,
    ttl_hours: i64,
    user_id: i32,
    email: &str,
    role: Role,
) -> Result<String, JwtError> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(ttl_hours))
        .ok_or(JwtError::Expiration)?
        .timestamp();

    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        role,
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
        .map_err(JwtError::Encode)
}

/// Vérifie et décode un JWT token
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, JwtError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::new(Algorithm::HS256),
    )
        .map(|data| data.claims)
        .map_err(JwtError::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn test_generate_and_verify_token() {
        let token = generate_token(SECRET, 1, 123, "coach@example.com", Role::Coach).unwrap();
        let claims = verify_token(SECRET, &token).unwrap();

        assert_eq!(claims.sub, 123);
        assert_eq!(claims.email, "coach@example.com");
        assert_eq!(claims.role, Role::Coach);
    }

    #[test]
    fn test_invalid_token() {
        assert!(verify_token(SECRET, "invalid.token.here").is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = generate_token(SECRET, 1, 1, "a@b.com", Role::User).unwrap();
        assert!(verify_token("another-secret", &token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        // Au-delà de la marge par défaut de jsonwebtoken (60s)
        let token = generate_token(SECRET, -1, 1, "a@b.com", Role::User).unwrap();
        assert!(verify_token(SECRET, &token).is_err());
    }
}
