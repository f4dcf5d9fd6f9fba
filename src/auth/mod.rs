use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config;
use crate::types::Platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id (`_id` of the user document)
    pub sub: String,
    pub platform: Platform,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(user_id: impl Into<String>, platform: Platform, role: impl Into<String>) -> Self {
        let now = Utc::now();
        let expiry_hours = config::config().security.jwt_expiry_hours;
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            sub: user_id.into(),
            platform,
            role: role.into(),
            exp,
            iat: now.timestamp(),
        }
    }
}

#[derive(Debug)]
pub enum JwtError {
    TokenGeneration(String),
    InvalidToken(String),
    InvalidSecret,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::TokenGeneration(msg) => write!(f, "JWT generation error: {}", msg),
            JwtError::InvalidToken(msg) => write!(f, "Invalid JWT token: {}", msg),
            JwtError::InvalidSecret => write!(f, "Invalid JWT secret"),
        }
    }
}

impl std::error::Error for JwtError {}

fn secret() -> Result<&'static str, JwtError> {
    let secret = &config::config().security.jwt_secret;
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }
    Ok(secret)
}

pub fn generate_jwt(claims: &Claims) -> Result<String, JwtError> {
    let encoding_key = EncodingKey::from_secret(secret()?.as_bytes());
    encode(&Header::default(), claims, &encoding_key).map_err(|e| JwtError::TokenGeneration(e.to_string()))
}

pub fn decode_jwt(token: &str) -> Result<Claims, JwtError> {
    let decoding_key = DecodingKey::from_secret(secret()?.as_bytes());
    decode::<Claims>(token, &decoding_key, &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| JwtError::InvalidToken(e.to_string()))
}

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, config::config().security.bcrypt_cost)
}

/// False for a wrong password or a malformed stored hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}
