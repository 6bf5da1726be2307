/// Signed claim sets for access and refresh tokens
///
/// Access claims embed the resolved identity, roles, and permissions at
/// issuance time; they are never persisted and never individually revoked.
/// Refresh claims are only a signed wrapper around the opaque token secret
/// plus its family coordinates, so a replayed wrapper can still be traced to
/// its family after the underlying row has been rotated away.
use crate::error::{AuthError, AuthResult};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims carried by a short-lived access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Account id
    pub sub: String,
    pub email: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Claims carried by a refresh token wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Account id
    pub sub: String,
    /// Opaque secret looked up in the token store
    pub token: String,
    pub family_id: String,
    pub generation: i32,
    pub iat: i64,
    pub exp: i64,
}

/// Token signing and verification primitive
pub trait TokenSigner: Send + Sync {
    fn encode_access(&self, claims: &AccessClaims) -> AuthResult<String>;
    fn decode_access(&self, token: &str) -> AuthResult<AccessClaims>;
    fn encode_refresh(&self, claims: &RefreshClaims) -> AuthResult<String>;
    fn decode_refresh(&self, token: &str) -> AuthResult<RefreshClaims>;
}

/// HS256 signer backed by `jsonwebtoken`
pub struct JwtSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtSigner {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Allow some clock skew (5 minutes)
        validation.leeway = 300;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl TokenSigner for JwtSigner {
    fn encode_access(&self, claims: &AccessClaims) -> AuthResult<String> {
        encode(&Header::default(), claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("failed to sign access token: {e}")))
    }

    fn decode_access(&self, token: &str) -> AuthResult<AccessClaims> {
        decode::<AccessClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("access token rejected: {e}");
                AuthError::InvalidToken
            })
    }

    fn encode_refresh(&self, claims: &RefreshClaims) -> AuthResult<String> {
        encode(&Header::default(), claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("failed to sign refresh token: {e}")))
    }

    fn decode_refresh(&self, token: &str) -> AuthResult<RefreshClaims> {
        decode::<RefreshClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("refresh token rejected: {e}");
                AuthError::InvalidToken
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn access_claims() -> AccessClaims {
        let now = Utc::now().timestamp();
        AccessClaims {
            sub: "d9f0b1fa-0000-0000-0000-000000000000".to_string(),
            email: "ada@example.com".to_string(),
            roles: vec!["admin".to_string()],
            permissions: vec!["users:read".to_string()],
            iat: now,
            exp: now + 900,
        }
    }

    #[test]
    fn test_access_claims_round_trip() {
        let signer = JwtSigner::new("test-secret");
        let encoded = signer.encode_access(&access_claims()).unwrap();
        let decoded = signer.decode_access(&encoded).unwrap();
        assert_eq!(decoded.email, "ada@example.com");
        assert_eq!(decoded.roles, vec!["admin".to_string()]);
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let signer = JwtSigner::new("test-secret");
        let other = JwtSigner::new("different-secret");
        let encoded = signer.encode_access(&access_claims()).unwrap();
        assert!(matches!(
            other.decode_access(&encoded),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let signer = JwtSigner::new("test-secret");
        assert!(matches!(
            signer.decode_refresh("not.a.jwt"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_expired_beyond_leeway_is_rejected() {
        let signer = JwtSigner::new("test-secret");
        let mut claims = access_claims();
        claims.exp = Utc::now().timestamp() - 3600;
        let encoded = signer.encode_access(&claims).unwrap();
        assert!(matches!(
            signer.decode_access(&encoded),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn test_refresh_claims_carry_family_coordinates() {
        let signer = JwtSigner::new("test-secret");
        let now = Utc::now().timestamp();
        let claims = RefreshClaims {
            sub: "account".to_string(),
            token: "opaque-secret".to_string(),
            family_id: "family".to_string(),
            generation: 4,
            iat: now,
            exp: now + 3600,
        };
        let decoded = signer
            .decode_refresh(&signer.encode_refresh(&claims).unwrap())
            .unwrap();
        assert_eq!(decoded.token, "opaque-secret");
        assert_eq!(decoded.family_id, "family");
        assert_eq!(decoded.generation, 4);
    }
}
