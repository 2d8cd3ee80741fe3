/// Authentication primitives
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and verification
/// - [`jwt`]: HS256 access tokens through an injected [`jwt::TokenIssuer`]
///
/// # Example
///
/// ```no_run
/// use chrono::Duration;
/// use taskreward_shared::auth::jwt::TokenIssuer;
/// use taskreward_shared::auth::password::{hash_password, verify_password};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("user_password")?;
/// assert!(verify_password("user_password", &hash)?);
///
/// let issuer = TokenIssuer::new("secret-key-at-least-32-bytes-long!!", Duration::hours(24));
/// let token = issuer.issue_for(1, "alice")?;
/// # Ok(())
/// # }
/// ```

pub mod jwt;
pub mod password;
