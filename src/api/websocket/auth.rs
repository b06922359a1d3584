//! Subscription admission: origin allow-list and token checks
//!
//! In production mode every subscription must carry a `token` query parameter.
//! When `RELAY_JWT_SECRET` is set, any supplied token must also be a valid
//! HS256 JWT signed with that secret.
//!
//! ```bash
//! websocat "ws://localhost:3001/?conversationId=abc123&token=eyJhbGciOiJIUzI1NiIs..."
//! ```

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::RelayConfig;
use crate::error::RelayError;

/// JWT claims accepted on subscription tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Verifies HS256-signed subscription tokens
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, RelayError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| RelayError::Unauthorized(format!("Invalid token: {}", e)))
    }
}

/// Rules a subscription must pass before it is registered
pub struct SubscriptionPolicy {
    allowed_origins: Vec<String>,
    require_token: bool,
    verifier: Option<TokenVerifier>,
}

impl SubscriptionPolicy {
    pub fn new(allowed_origins: Vec<String>, require_token: bool, jwt_secret: Option<&str>) -> Self {
        Self {
            allowed_origins,
            require_token,
            verifier: jwt_secret.map(TokenVerifier::new),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            config.allowed_origins.clone(),
            config.require_token,
            config.jwt_secret.as_deref(),
        )
    }

    /// Check the request's Origin header and token
    ///
    /// Requests without an Origin header (non-browser clients) are allowed.
    pub fn authorize(&self, origin: Option<&str>, token: Option<&str>) -> Result<(), RelayError> {
        if let Some(origin) = origin {
            if !self.allowed_origins.iter().any(|o| o == origin) {
                return Err(RelayError::Unauthorized("Origin not allowed".to_string()));
            }
        }

        match (token.filter(|t| !t.is_empty()), &self.verifier) {
            (None, _) if self.require_token => {
                Err(RelayError::Unauthorized("Authentication required".to_string()))
            }
            (Some(token), Some(verifier)) => verifier.verify(token).map(|_| ()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret-that-is-long-enough-0123456789";

    fn token(secret: &str, exp_offset: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: "alice".to_string(),
            iat: now,
            exp: now + exp_offset,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn origins() -> Vec<String> {
        vec!["http://localhost:3000".to_string()]
    }

    #[test]
    fn test_dev_mode_allows_missing_token() {
        let policy = SubscriptionPolicy::new(origins(), false, None);
        assert!(policy.authorize(None, None).is_ok());
        assert!(policy.authorize(Some("http://localhost:3000"), None).is_ok());
    }

    #[test]
    fn test_production_requires_token() {
        let policy = SubscriptionPolicy::new(origins(), true, None);
        let err = policy.authorize(None, None).unwrap_err();
        assert_eq!(err.to_string(), "Authentication required");
        assert!(policy.authorize(None, Some("")).is_err());
        assert!(policy.authorize(None, Some("opaque")).is_ok());
    }

    #[test]
    fn test_disallowed_origin() {
        let policy = SubscriptionPolicy::new(origins(), false, None);
        let err = policy.authorize(Some("https://evil.example"), None).unwrap_err();
        assert_eq!(err.to_string(), "Origin not allowed");
    }

    #[test]
    fn test_jwt_verification() {
        let policy = SubscriptionPolicy::new(origins(), true, Some(SECRET));
        assert!(policy.authorize(None, Some(&token(SECRET, 3600))).is_ok());
        assert!(policy.authorize(None, Some(&token("some-other-secret-value-xxxxxxxxxx", 3600))).is_err());
        assert!(policy.authorize(None, Some(&token(SECRET, -3600))).is_err());
        assert!(policy.authorize(None, Some("not-a-jwt")).is_err());
    }

    #[test]
    fn test_verifier_returns_claims() {
        let verifier = TokenVerifier::new(SECRET);
        let claims = verifier.verify(&token(SECRET, 60)).unwrap();
        assert_eq!(claims.sub, "alice");
    }
}
