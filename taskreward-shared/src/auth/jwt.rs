/// JWT issuance and validation
///
/// Access tokens are signed with HS256 and identify a user by ID. The
/// signing key is held by a [`TokenIssuer`] built once from configuration
/// and shared through the API's application state, so handlers never read
/// secrets themselves and tests can build an issuer with their own key.
///
/// # Claims
///
/// - `sub`: user ID
/// - `login`: user login at issue time
/// - `iss`: always [`ISSUER`]
/// - `iat`, `nbf`, `exp`: Unix timestamps
///
/// # Example
///
/// ```
/// use chrono::Duration;
/// use taskreward_shared::auth::jwt::TokenIssuer;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let issuer = TokenIssuer::new("test-secret-key-at-least-32-bytes-long", Duration::hours(24));
/// let token = issuer.issue_for(42, "alice")?;
///
/// let claims = issuer.validate(&token)?;
/// assert_eq!(claims.sub, 42);
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::models::user::User;

/// Value of the `iss` claim
pub const ISSUER: &str = "taskreward";

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to create token: {0}")]
    CreateError(String),

    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    #[error("Token has expired")]
    Expired,

    #[error("Invalid issuer: expected taskreward")]
    InvalidIssuer,
}

/// JWT claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - user ID
    pub sub: i64,

    pub login: String,

    pub iss: String,

    pub iat: i64,

    pub nbf: i64,

    pub exp: i64,
}

impl Claims {
    /// Claims for `user_id` valid from now for `ttl`
    ///
    /// Fails when `now + ttl` is outside the representable date range.
    pub fn new(user_id: i64, login: impl Into<String>, ttl: Duration) -> Result<Self, JwtError> {
        let now = Utc::now();
        let expires_at = expiry_from(now, ttl)?;

        Ok(Self {
            sub: user_id,
            login: login.into(),
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
        })
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }
}

fn expiry_from(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, JwtError> {
    now.checked_add_signed(ttl)
        .ok_or_else(|| JwtError::CreateError(format!("Token lifetime out of range: {}", ttl)))
}

/// Signs and verifies access tokens with one HS256 key
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenIssuer {
    /// Creates an issuer; `secret` should be at least 32 bytes
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    /// Lifetime of issued tokens
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a token for `user`
    pub fn issue(&self, user: &User) -> Result<String, JwtError> {
        self.issue_for(user.id, &user.login)
    }

    pub fn issue_for(&self, user_id: i64, login: &str) -> Result<String, JwtError> {
        self.sign(&Claims::new(user_id, login, self.ttl)?)
    }

    /// Issues a token for `user` and reports when it expires
    pub fn issue_with_expiry(&self, user: &User) -> Result<(String, DateTime<Utc>), JwtError> {
        let claims = Claims::new(user.id, user.login.as_str(), self.ttl)?;
        let expires_at = expiry_from(Utc::now(), self.ttl)?;

        Ok((self.sign(&claims)?, expires_at))
    }

    /// Signs arbitrary claims
    pub fn sign(&self, claims: &Claims) -> Result<String, JwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
    }

    /// Verifies signature, issuer, `exp` and `nbf`, and returns the claims
    pub fn validate(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.validate_exp = true;
        validation.validate_nbf = true;

        let token_data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::Expired,
                ErrorKind::InvalidIssuer => JwtError::InvalidIssuer,
                _ => JwtError::ValidationError(format!("Token validation failed: {}", e)),
            }
        })?;

        Ok(token_data.claims)
    }
}
