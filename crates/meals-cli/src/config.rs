//! Configuration file management for meals.
//!
//! Provides a TOML-based config file at `~/.config/meals/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use meals_core::token::{SESSION_SECRET_ENV, TokenConfig};
use meals_db::config::{DATABASE_URL_ENV, DbConfig};

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    pub auth: AuthSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthSection {
    /// Hex-encoded session secret (64 hex chars = 32 bytes).
    pub session_secret: String,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the meals config directory: `$XDG_CONFIG_HOME/meals` or
/// `~/.config/meals`, on every platform.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("meals");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("meals")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    toml::from_str(&contents).context("failed to parse config file")
}

/// Write the config file with owner-only permissions, creating parent
/// directories as needed.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(path)
}

/// 32 random bytes, hex-encoded (64 chars).
pub fn generate_session_secret() -> String {
    use rand::Rng;
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

#[derive(Debug)]
pub struct MealsConfig {
    pub db_config: DbConfig,
    /// Absent until `meals init` has run or `MEALS_SESSION_SECRET` is set.
    /// Only commands that issue or check tokens need it.
    pub token_config: Option<TokenConfig>,
}

impl MealsConfig {
    /// Resolve configuration.
    ///
    /// - DB URL: `cli_db_url` > `MEALS_DATABASE_URL` > `database.url` > `DbConfig::DEFAULT_URL`
    /// - Session secret: `MEALS_SESSION_SECRET` > `auth.session_secret` > none
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file_config = load_config().ok();

        let db_url = if let Some(url) = cli_db_url {
            url.to_owned()
        } else if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_owned()
        };

        let token_config = if let Ok(secret_hex) = std::env::var(SESSION_SECRET_ENV) {
            Some(
                TokenConfig::from_hex(&secret_hex)
                    .with_context(|| format!("{SESSION_SECRET_ENV} is not a valid secret"))?,
            )
        } else if let Some(ref cfg) = file_config {
            Some(
                TokenConfig::from_hex(&cfg.auth.session_secret)
                    .context("invalid session_secret in config file")?,
            )
        } else {
            None
        };

        Ok(Self {
            db_config: DbConfig::new(db_url),
            token_config,
        })
    }

    pub fn require_tokens(&self) -> Result<&TokenConfig> {
        match &self.token_config {
            Some(config) => Ok(config),
            None => bail!(
                "session secret not found; set {SESSION_SECRET_ENV} or run `meals init` to create a config file"
            ),
        }
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
