//! Bearer-token principal. Tokens are issued elsewhere; this side only
//! checks the HS256 signature and expiry and trusts the `userId` claim.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::CateringError;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    pub exp: usize,
}

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self { key: DecodingKey::from_secret(secret.as_bytes()), validation: Validation::new(Algorithm::HS256) }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, CateringError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| CateringError::Unauthorized(format!("Invalid token: {e}")))
    }
}

/// Authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = CateringError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| CateringError::Unauthorized("Missing bearer token".into()))?;
        let claims = state.auth.verify(token)?;
        Ok(Self { user_id: claims.user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, exp: usize) -> (Uuid, String) {
        let user_id = Uuid::new_v4();
        let claims = Claims { user_id, exp };
        (user_id, encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap())
    }

    fn in_an_hour() -> usize {
        (chrono::Utc::now().timestamp() + 3600) as usize
    }

    #[test]
    fn test_verify_token() {
        let (user_id, token) = token("jwt-secret", in_an_hour());
        assert_eq!(JwtVerifier::new("jwt-secret").verify(&token).unwrap().user_id, user_id);
    }

    #[test]
    fn test_reject_foreign_or_expired_token() {
        let (_, foreign) = token("other-secret", in_an_hour());
        assert!(JwtVerifier::new("jwt-secret").verify(&foreign).is_err());

        let (_, expired) = token("jwt-secret", 1_000);
        assert!(matches!(JwtVerifier::new("jwt-secret").verify(&expired), Err(CateringError::Unauthorized(_))));
    }
}
