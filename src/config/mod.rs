//! Configuration for the gateway and the auth client.
//!
//! Values come from three layers, later ones winning:
//! 1. Built-in defaults
//! 2. `config.toml` (explicit `--config` path or the platform config dir)
//! 3. Environment variables (`JWT_SECRET`, `JWT_EXPIRES_IN`, `NODE_ENV`,
//!    `NEXT_PUBLIC_API_URL` and the per-endpoint `NEXT_PUBLIC_API_*` overrides)

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::password::{MAX_BCRYPT_COST, MIN_BCRYPT_COST};
use crate::auth::token::parse_expiry;

/// Secret used when nothing is configured outside production.
pub const DEV_FALLBACK_SECRET: &str = "cacadores-dev-secret-change-me";

const CONFIG_FILE_NAME: &str = "config.toml";

/// Deployment environment, read from `NODE_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    fn from_env_value(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("production") {
            Self::Production
        } else {
            Self::Development
        }
    }
}

/// Which credential store backs the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local store, reset on restart.
    #[default]
    Memory,
    /// `users.db` under the data directory.
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Login/register attempts per client per minute (0 = unlimited).
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    /// Key rate limits on `X-Forwarded-For`/`X-Real-IP`. Enable only behind
    /// a reverse proxy that overwrites those headers.
    pub trust_proxy_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            rate_limit_per_minute: 20,
            request_timeout_secs: 30,
            trust_proxy_headers: false,
        }
    }
}

/// A user inserted at startup, mirroring the hardcoded accounts of the demo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedUser {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "user".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC signing secret. `None` falls back to [`DEV_FALLBACK_SECRET`]
    /// outside production.
    pub jwt_secret: Option<String>,
    /// Token lifetime in `JWT_EXPIRES_IN` notation (`7d`, `12h`, `3600`).
    pub jwt_expires_in: String,
    pub bcrypt_cost: u32,
    pub min_password_len: usize,
    pub allow_registration: bool,
    pub store: StoreBackend,
    pub seed_users: Vec<SeedUser>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_expires_in: "7d".into(),
            bcrypt_cost: 10,
            min_password_len: 8,
            allow_registration: true,
            store: StoreBackend::Memory,
            seed_users: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the gateway.
    pub api_url: String,
    /// Full URL or path (joined onto `api_url`) of each endpoint.
    pub login_endpoint: String,
    pub register_endpoint: String,
    pub user_endpoint: String,
    pub timeout_secs: u64,
    /// TTL of the GET response cache (0 disables it).
    pub cache_ttl_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:3000".into(),
            login_endpoint: "/api/auth/login".into(),
            register_endpoint: "/api/auth/register".into(),
            user_endpoint: "/api/user".into(),
            timeout_secs: 30,
            cache_ttl_secs: 60,
        }
    }
}

impl ClientConfig {
    /// Resolve an endpoint setting into an absolute URL.
    pub fn resolve(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        let base = self.api_url.trim_end_matches('/');
        if endpoint.starts_with('/') {
            format!("{base}{endpoint}")
        } else {
            format!("{base}/{endpoint}")
        }
    }

    pub fn login_url(&self) -> String {
        self.resolve(&self.login_endpoint)
    }

    pub fn register_url(&self) -> String {
        self.resolve(&self.register_endpoint)
    }

    pub fn user_url(&self) -> String {
        self.resolve(&self.user_endpoint)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub environment: Environment,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub client: ClientConfig,
    /// Where the SQLite store and the client snapshot live.
    #[serde(skip)]
    pub data_dir: PathBuf,
}

impl Config {
    /// Load from `path` (or the default location), then apply environment
    /// overrides.
    pub fn load(path: Option<&Path>, data_dir: Option<&Path>) -> Result<Self> {
        let dirs = directories::ProjectDirs::from("org", "cacadores", "cacadores");

        let config_path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => dirs
                .as_ref()
                .map(|d| d.config_dir().join(CONFIG_FILE_NAME)),
        };

        let mut config = match config_path {
            Some(ref p) if p.exists() => Self::from_file(p)?,
            Some(ref p) if path.is_some() => {
                bail!("Config file not found: {}", p.display())
            }
            _ => Self::default(),
        };

        config.data_dir = match data_dir {
            Some(d) => d.to_path_buf(),
            None => dirs
                .as_ref()
                .map(|d| d.data_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".cacadores")),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply environment overrides. `lookup` is injectable for tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(env) = non_empty("NODE_ENV") {
            self.environment = Environment::from_env_value(&env);
        }
        if let Some(secret) = non_empty("JWT_SECRET") {
            self.auth.jwt_secret = Some(secret);
        }
        if let Some(expires) = non_empty("JWT_EXPIRES_IN") {
            self.auth.jwt_expires_in = expires;
        }
        if let Some(url) = non_empty("NEXT_PUBLIC_API_URL") {
            self.client.api_url = url;
        }
        if let Some(login) = non_empty("NEXT_PUBLIC_API_LOGIN") {
            self.client.login_endpoint = login;
        }
        if let Some(register) = non_empty("NEXT_PUBLIC_API_REGISTER") {
            self.client.register_endpoint = register;
        }
        if let Some(user) = non_empty("NEXT_PUBLIC_API_USER") {
            self.client.user_endpoint = user;
        }
    }

    /// Reject settings that cannot work.
    pub fn validate(&self) -> Result<()> {
        parse_expiry(&self.auth.jwt_expires_in)
            .with_context(|| format!("Invalid jwt_expires_in '{}'", self.auth.jwt_expires_in))?;

        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.auth.bcrypt_cost) {
            bail!("bcrypt_cost must be between {MIN_BCRYPT_COST} and {MAX_BCRYPT_COST}");
        }
        if self.auth.min_password_len == 0 {
            bail!("min_password_len must be at least 1");
        }
        if self.environment == Environment::Production && self.auth.jwt_secret.is_none() {
            bail!("JWT_SECRET must be set when NODE_ENV=production");
        }
        Ok(())
    }

    /// The signing secret, falling back to the development secret.
    pub fn jwt_secret(&self) -> &str {
        match self.auth.jwt_secret.as_deref() {
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_SECRET not set; using the development fallback secret");
                DEV_FALLBACK_SECRET
            }
        }
    }

    /// Token lifetime. Only valid after [`Config::validate`].
    pub fn token_ttl(&self) -> Result<Duration> {
        parse_expiry(&self.auth.jwt_expires_in)
    }

    pub fn users_db_path(&self) -> PathBuf {
        self.data_dir.join("users.db")
    }

    pub fn client_session_dir(&self) -> PathBuf {
        self.data_dir.join("session")
    }
}
