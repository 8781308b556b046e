//! API token storage with platform keyring and file-based fallback.
//!
//! Lookup priority:
//! 1. `IPINFO_TOKEN` environment variable
//! 2. Platform keyring (if `keyring-storage` feature enabled and available)
//! 3. Token file in the config directory
//! 4. Legacy `.env` file in the working directory (imported into storage)

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(feature = "keyring-storage")]
use keyring::Entry;

/// Environment variable holding the geolocation service token
pub const TOKEN_ENV_VAR: &str = "IPINFO_TOKEN";

/// Service name used for keyring storage
#[cfg(feature = "keyring-storage")]
const KEYRING_SERVICE: &str = "yougotmapped";
/// Username used for keyring entry
#[cfg(feature = "keyring-storage")]
const KEYRING_USER: &str = "ipinfo-token";

/// Legacy token file written by earlier releases into the working directory
const LEGACY_DOTENV: &str = ".env";

/// Bearer token for the geolocation service.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    /// Wrap a token, trimming whitespace. Returns `None` for blank input.
    pub fn new(token: impl AsRef<str>) -> Option<Self> {
        let token = token.as_ref().trim();
        if token.is_empty() {
            None
        } else {
            Some(Self(token.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(***)")
    }
}

/// Where a loaded token came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    Environment,
    Keyring,
    File,
    LegacyDotenv,
}

impl fmt::Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenSource::Environment => write!(f, "environment variable {}", TOKEN_ENV_VAR),
            TokenSource::Keyring => write!(f, "platform keyring"),
            TokenSource::File => write!(f, "token file"),
            TokenSource::LegacyDotenv => write!(f, "legacy .env file"),
        }
    }
}

/// Get the yougotmapped config directory
fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .context("Failed to find config directory")?;
    Ok(config_dir.join("yougotmapped"))
}

/// Get the token file path for file-based storage
fn get_token_file_path() -> Result<PathBuf> {
    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }
    Ok(config_dir.join(".token"))
}

// ============================================================================
// File-based token storage (always available)
// ============================================================================

fn save_token_to_file(token: &ApiToken) -> Result<()> {
    let path = get_token_file_path()?;

    // Set restrictive permissions on Unix before writing
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600) // Owner read/write only
            .open(&path)
            .context("Failed to create token file")?;
        file.write_all(token.expose().as_bytes())
            .context("Failed to write token")?;
    }

    #[cfg(not(unix))]
    {
        fs::write(&path, token.expose()).context("Failed to write token file")?;
    }

    tracing::debug!("Token saved to file: {:?}", path);
    Ok(())
}

fn load_token_from_file() -> Result<Option<ApiToken>> {
    let path = get_token_file_path()?;
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path).context("Failed to read token file")?;
    Ok(ApiToken::new(content))
}

fn delete_token_file() {
    if let Ok(path) = get_token_file_path() {
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!("Failed to delete token file: {}", e);
            }
        }
    }
}

// ============================================================================
// Keyring-based token storage (optional, platform-specific)
// ============================================================================

#[cfg(feature = "keyring-storage")]
fn get_keyring_entry() -> Result<Entry> {
    Entry::new(KEYRING_SERVICE, KEYRING_USER).map_err(|e| {
        tracing::debug!(
            "Failed to create keyring entry (service='{}', user='{}'): {}",
            KEYRING_SERVICE,
            KEYRING_USER,
            e
        );
        anyhow::anyhow!("Failed to create keyring entry: {}", e)
    })
}

#[cfg(feature = "keyring-storage")]
fn save_token_to_keyring(token: &ApiToken) -> Result<TokenSource> {
    let entry = match get_keyring_entry() {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!("{}, using file storage", e);
            save_token_to_file(token)?;
            return Ok(TokenSource::File);
        }
    };

    if let Err(e) = entry.set_password(token.expose()) {
        tracing::warn!("Failed to save token to keyring: {}, using file storage", e);
        save_token_to_file(token)?;
        return Ok(TokenSource::File);
    }

    // Some secret-service backends accept writes they never persist
    match entry.get_password() {
        Ok(stored) if stored == token.expose() => {
            tracing::debug!("Token verified in keyring after save");
            Ok(TokenSource::Keyring)
        }
        Ok(_) | Err(keyring::Error::NoEntry) => {
            tracing::warn!("Token not readable back from keyring, using file storage");
            save_token_to_file(token)?;
            Ok(TokenSource::File)
        }
        Err(e) => {
            tracing::warn!("Could not verify token after save: {}", e);
            save_token_to_file(token)?;
            Ok(TokenSource::File)
        }
    }
}

#[cfg(feature = "keyring-storage")]
fn load_token_from_keyring() -> Option<ApiToken> {
    let entry = get_keyring_entry().ok()?;
    match entry.get_password() {
        Ok(secret) => {
            tracing::debug!("Token loaded from keyring");
            ApiToken::new(secret)
        }
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            tracing::warn!("Failed to load token from keyring: {}", e);
            None
        }
    }
}

#[cfg(feature = "keyring-storage")]
fn delete_token_from_keyring() -> Result<()> {
    let entry = get_keyring_entry()?;
    match entry.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(anyhow::anyhow!("Failed to delete token from keyring: {}", e)),
    }
}

// ============================================================================
// Legacy .env import
// ============================================================================

/// Extract `IPINFO_TOKEN` from `.env`-style content.
pub fn parse_dotenv_token(content: &str) -> Option<ApiToken> {
    content.lines().find_map(|line| {
        let line = line.trim();
        if line.starts_with('#') {
            return None;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let (key, value) = line.split_once('=')?;
        if key.trim() != TOKEN_ENV_VAR {
            return None;
        }
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        ApiToken::new(value)
    })
}

fn load_legacy_dotenv(path: &Path) -> Option<ApiToken> {
    let content = fs::read_to_string(path).ok()?;
    parse_dotenv_token(&content)
}

// ============================================================================
// Public API
// ============================================================================

/// Pick the environment token if one is set, otherwise nothing.
fn token_from_env(value: Option<String>) -> Option<ApiToken> {
    value.and_then(ApiToken::new)
}

/// Load the API token from the first source that has one.
///
/// A token found in a legacy `.env` file is copied into secure storage so
/// later runs no longer depend on the working directory.
pub fn load_token() -> Result<Option<(ApiToken, TokenSource)>> {
    if let Some(token) = token_from_env(std::env::var(TOKEN_ENV_VAR).ok()) {
        return Ok(Some((token, TokenSource::Environment)));
    }

    #[cfg(feature = "keyring-storage")]
    {
        if let Some(token) = load_token_from_keyring() {
            return Ok(Some((token, TokenSource::Keyring)));
        }
    }

    if let Some(token) = load_token_from_file()? {
        return Ok(Some((token, TokenSource::File)));
    }

    if let Some(token) = load_legacy_dotenv(Path::new(LEGACY_DOTENV)) {
        tracing::info!("Importing token from legacy {} file", LEGACY_DOTENV);
        if let Err(e) = save_token(&token) {
            tracing::warn!("Failed to import legacy token: {}", e);
        }
        return Ok(Some((token, TokenSource::LegacyDotenv)));
    }

    Ok(None)
}

/// Save the token to secure storage, returning where it ended up.
pub fn save_token(token: &ApiToken) -> Result<TokenSource> {
    #[cfg(feature = "keyring-storage")]
    let source = save_token_to_keyring(token)?;

    #[cfg(not(feature = "keyring-storage"))]
    let source = {
        save_token_to_file(token)?;
        TokenSource::File
    };

    tracing::info!("Token saved to {}", source);
    Ok(source)
}

/// Delete the token from all storage locations.
pub fn delete_token() -> Result<()> {
    delete_token_file();

    #[cfg(feature = "keyring-storage")]
    delete_token_from_keyring()?;

    Ok(())
}

/// Get information about token storage location (for documentation/debugging)
pub fn get_token_storage_info() -> String {
    let path = get_config_dir()
        .map(|p| p.join(".token").display().to_string())
        .unwrap_or_else(|_| "~/.config/yougotmapped/.token".to_string());

    #[cfg(feature = "keyring-storage")]
    {
        format!("Platform keyring (with file fallback at {})", path)
    }
    #[cfg(not(feature = "keyring-storage"))]
    {
        format!("File-based storage: {}", path)
    }
}
