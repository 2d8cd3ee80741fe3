/// Configuration management for the API server
///
/// Configuration is read from environment variables (a `.env` file is loaded
/// first when present).
///
/// # Environment Variables
///
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 8080)
/// - `CORS_ORIGINS`: Comma-separated allowed origins (default: `*`)
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `JWT_SECRET`: Secret key for JWT signing, at least 32 characters (required)
/// - `JWT_EXPIRATION_SECS`: Access token lifetime (default: 86400)
/// - `COMPLETION_TIMEOUT_SECS`: Bound on one completion transaction, 1..=60 (default: 5)
/// - `RUST_LOG`: Log filter (default: `taskreward_api=debug,taskreward_shared=debug,tower_http=debug`)
///
/// # Example
///
/// ```no_run
/// use taskreward_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;
use taskreward_shared::auth::jwt::TokenIssuer;
use taskreward_shared::db::pool::DatabaseConfig as PoolConfig;
use taskreward_shared::engine::CompletionConfig;

/// Shortest accepted JWT secret
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Longest accepted token lifetime (ten years)
pub const MAX_JWT_EXPIRATION_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,

    pub database: DatabaseConfig,

    pub jwt: JwtConfig,

    pub completion: CompletionSettings,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// Must be kept secret and at least 32 bytes.
    /// Generate with: `openssl rand -hex 32`
    #[serde(skip_serializing)]
    pub secret: String,

    /// Access token lifetime in seconds
    pub expiration_secs: i64,
}

/// Completion transaction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionSettings {
    pub timeout_secs: u64,
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value does not
    /// parse or is out of range.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let api_host = var("API_HOST", "0.0.0.0");
        let api_port = var("API_PORT", "8080")
            .parse::<u16>()
            .map_err(|e| anyhow::anyhow!("API_PORT is invalid: {}", e))?;

        let cors_origins: Vec<String> = var("CORS_ORIGINS", "*")
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let max_connections = var("DATABASE_MAX_CONNECTIONS", "10")
            .parse::<u32>()
            .map_err(|e| anyhow::anyhow!("DATABASE_MAX_CONNECTIONS is invalid: {}", e))?;
        if max_connections == 0 {
            anyhow::bail!("DATABASE_MAX_CONNECTIONS must be at least 1");
        }

        let jwt_secret = lookup("JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            anyhow::bail!(
                "JWT_SECRET must be at least {} characters long",
                MIN_JWT_SECRET_LEN
            );
        }

        let expiration_secs = var("JWT_EXPIRATION_SECS", "86400")
            .parse::<i64>()
            .map_err(|e| anyhow::anyhow!("JWT_EXPIRATION_SECS is invalid: {}", e))?;
        if !(1..=MAX_JWT_EXPIRATION_SECS).contains(&expiration_secs) {
            anyhow::bail!(
                "JWT_EXPIRATION_SECS must be between 1 and {}",
                MAX_JWT_EXPIRATION_SECS
            );
        }

        let timeout_secs = var("COMPLETION_TIMEOUT_SECS", "5")
            .parse::<u64>()
            .map_err(|e| anyhow::anyhow!("COMPLETION_TIMEOUT_SECS is invalid: {}", e))?;
        if !(1..=60).contains(&timeout_secs) {
            anyhow::bail!("COMPLETION_TIMEOUT_SECS must be between 1 and 60");
        }

        Ok(Self {
            api: ApiConfig {
                host: api_host,
                port: api_port,
                cors_origins,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            jwt: JwtConfig {
                secret: jwt_secret,
                expiration_secs,
            },
            completion: CompletionSettings { timeout_secs },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Pool settings for the shared database layer
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.database.max_connections,
            ..PoolConfig::from_url(self.database.url.clone())
        }
    }

    pub fn completion_config(&self) -> CompletionConfig {
        CompletionConfig::from_timeout_secs(Some(self.completion.timeout_secs))
    }

    pub fn token_issuer(&self) -> TokenIssuer {
        TokenIssuer::new(
            &self.jwt.secret,
            Duration::seconds(self.jwt.expiration_secs),
        )
    }

    /// Whether any origin is allowed
    pub fn cors_permissive(&self) -> bool {
        self.api.cors_origins.iter().any(|origin| origin == "*")
    }
}
