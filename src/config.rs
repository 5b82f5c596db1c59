use anyhow::{Context, Result};
use std::{env, path::PathBuf, str::FromStr};

use crate::cli::{GlobalArgs, ServeArgs};

pub const DEFAULT_STORAGE_DIR: &str = "./data/objects";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://./data/meta/files.db";
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_SIGNING_KEY: &str = "files-local-development-key";
pub const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 900;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments; flags win over env.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage_dir: PathBuf,
    pub database_url: String,
    pub signing: SigningConfig,
}

/// Settings for issuing and checking signed URLs.
#[derive(Clone)]
pub struct SigningConfig {
    /// Public root the HTTP surface is reachable under.
    pub base_url: String,
    pub key: String,
    pub ttl_secs: u64,
}

impl std::fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningConfig")
            .field("base_url", &self.base_url)
            .field("key", &"<redacted>")
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    /// Merge parsed global flags with `FILES_*` environment variables.
    pub fn resolve(args: &GlobalArgs) -> Result<Self> {
        let storage_dir = match &args.storage_dir {
            Some(dir) => dir.clone(),
            None => PathBuf::from(env_or("FILES_STORAGE_DIR", DEFAULT_STORAGE_DIR)),
        };
        let database_url = match &args.database_url {
            Some(url) => url.clone(),
            None => env_or("FILES_DATABASE_URL", DEFAULT_DATABASE_URL),
        };
        let base_url = match &args.base_url {
            Some(url) => url.clone(),
            None => env_or("FILES_BASE_URL", DEFAULT_BASE_URL),
        };
        let key = match &args.signing_key {
            Some(key) => key.clone(),
            None => env::var("FILES_SIGNING_KEY").unwrap_or_else(|_| {
                tracing::debug!("FILES_SIGNING_KEY not set, using the development signing key");
                DEFAULT_SIGNING_KEY.into()
            }),
        };
        let ttl_secs = match args.signed_url_ttl {
            Some(ttl) => ttl,
            None => env_parse("FILES_SIGNED_URL_TTL", DEFAULT_SIGNED_URL_TTL_SECS)?,
        };

        Ok(Self {
            storage_dir,
            database_url,
            signing: SigningConfig {
                base_url,
                key,
                ttl_secs,
            },
        })
    }
}

impl ServeConfig {
    pub fn resolve(args: &ServeArgs) -> Result<Self> {
        let host = match &args.host {
            Some(host) => host.clone(),
            None => env_or("FILES_HOST", "0.0.0.0"),
        };
        let port = match args.port {
            Some(port) => port,
            None => env_parse("FILES_PORT", 3000)?,
        };
        Ok(Self { host, port })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.into())
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
