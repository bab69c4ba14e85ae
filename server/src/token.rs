//! Signed, self-describing credentials. User tokens carry the user id and
//! expiry; back-office tokens carry the admin subject. Algorithm and
//! secret come from the environment.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token failed validation")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("token carries a malformed user id")]
    BadUserId,
}

#[derive(Debug, Serialize, Deserialize)]
struct UserClaims {
    /// Hex form without hyphens.
    user_id: String,
    exp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct AdminClaims {
    sub: String,
    exp: i64,
}

pub struct TokenKeys {
    header: Header,
    validation: Validation,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenKeys {
    pub fn new(secret: &str, algorithm: Algorithm) -> Self {
        Self {
            header: Header::new(algorithm),
            validation: Validation::new(algorithm),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn mint_user(
        &self,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = UserClaims {
            user_id: user_id.simple().to_string(),
            exp: expires_at.timestamp(),
        };
        Ok(encode(&self.header, &claims, &self.encoding)?)
    }

    /// Checks signature and expiry, then hands back the user id.
    pub fn verify_user(&self, token: &str) -> Result<Uuid, TokenError> {
        let data = decode::<UserClaims>(token, &self.decoding, &self.validation)?;
        Uuid::parse_str(&data.claims.user_id).map_err(|_| TokenError::BadUserId)
    }

    pub fn mint_admin(
        &self,
        username: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = AdminClaims {
            sub: username.to_owned(),
            exp: expires_at.timestamp(),
        };
        Ok(encode(&self.header, &claims, &self.encoding)?)
    }

    pub fn verify_admin(&self, token: &str) -> Result<String, TokenError> {
        let data = decode::<AdminClaims>(token, &self.decoding, &self.validation)?;
        Ok(data.claims.sub)
    }
}
