//! Bearer token verification.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

use crate::{JwtClaims, TokenValidationError, validate_claims};

/// Verifies a raw bearer token and returns its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;
}

/// HMAC-SHA256 verifier sharing a secret with the identity provider.
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is carried in `expires_at` and checked by `validate_claims`.
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = false;

        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        let data = decode::<JwtClaims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "bearer token rejected");
            TokenValidationError::Invalid
        })?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchpos_core::{AccountId, UserId};
    use chrono::Duration;
    use jsonwebtoken::{EncodingKey, Header, encode};

    use crate::Role;

    fn mint(secret: &[u8], claims: &JwtClaims) -> String {
        encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    fn claims(now: DateTime<Utc>) -> JwtClaims {
        JwtClaims {
            sub: UserId::new(),
            account_id: AccountId::new(),
            role: Role::Manager,
            branch_ids: vec![],
            issued_at: now - Duration::minutes(1),
            expires_at: now + Duration::hours(1),
        }
    }

    #[test]
    fn round_trips_valid_token() {
        let now = Utc::now();
        let c = claims(now);
        let token = mint(b"secret", &c);

        let validator = Hs256JwtValidator::new(b"secret");
        assert_eq!(validator.validate(&token, now).unwrap(), c);
    }

    #[test]
    fn rejects_wrong_secret() {
        let now = Utc::now();
        let token = mint(b"secret", &claims(now));

        let validator = Hs256JwtValidator::new(b"other");
        assert_eq!(validator.validate(&token, now), Err(TokenValidationError::Invalid));
    }

    #[test]
    fn rejects_expired_token() {
        let now = Utc::now();
        let token = mint(b"secret", &claims(now));

        let validator = Hs256JwtValidator::new(b"secret");
        let later = now + Duration::hours(2);
        assert_eq!(validator.validate(&token, later), Err(TokenValidationError::Expired));
    }
}
