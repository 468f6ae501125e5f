use std::str::FromStr;

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::Error as JwtError,
};
use uuid::Uuid;

use crate::{auth::session::Session, error::AppError, model::role::Role, models::Claims};

/// HS256 signing material and token lifetime.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    pub fn generate_access_token(
        &self,
        subject_id: &str,
        email: &str,
        role: Role,
        now: i64,
    ) -> Result<(String, Claims), JwtError> {
        let claims = Claims {
            sub: subject_id.to_string(),
            email: email.to_string(),
            role: role.as_ref().to_string(),
            iat: now,
            exp: now + self.ttl_secs,
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok((token, claims))
    }

    /// Signature and shape are checked by the library; expiry against `now`
    /// so the caller's clock is authoritative.
    pub fn verify_token(&self, token: &str, now: i64) -> Result<Session, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| AppError::TokenInvalid)?
            .claims;

        if claims.exp <= now {
            return Err(AppError::TokenExpired);
        }

        let role = Role::from_str(&claims.role).map_err(|_| AppError::TokenInvalid)?;

        Ok(Session {
            subject_id: claims.sub,
            email: claims.email,
            role,
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }
}
