//! Credential resolution.
//!
//! The API key is taken from the process environment first (after `.env` has
//! been loaded), then from the deployment secrets file. Missing both is fatal.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::constants;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{}", constants::MISSING_KEY_MESSAGE)]
    MissingApiKey { secrets_path: PathBuf },
}

/// An API credential whose value never shows up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Where a resolved credential came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    Environment,
    SecretsFile(PathBuf),
}

/// Looks up [`constants::API_KEY_VAR`] in the environment, then in `secrets_path`.
pub fn resolve_api_key(secrets_path: &Path) -> Result<(ApiKey, KeySource), ConfigError> {
    resolve_api_key_with(|name| std::env::var(name).ok(), secrets_path)
}

pub(crate) fn resolve_api_key_with<F>(lookup_env: F, secrets_path: &Path) -> Result<(ApiKey, KeySource), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup_env(constants::API_KEY_VAR).filter(|v| !v.trim().is_empty()) {
        debug!("Using API key from the environment");
        return Ok((ApiKey::new(value), KeySource::Environment));
    }

    if let Some(value) = read_secret(secrets_path, constants::API_KEY_VAR) {
        debug!(path = %secrets_path.display(), "Using API key from the secrets file");
        return Ok((ApiKey::new(value), KeySource::SecretsFile(secrets_path.to_path_buf())));
    }

    Err(ConfigError::MissingApiKey {
        secrets_path: secrets_path.to_path_buf(),
    })
}

/// A secrets file that is missing or unreadable counts as holding nothing.
fn read_secret(path: &Path, key: &str) -> Option<String> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read secrets file");
            return None;
        }
    };

    let secrets: HashMap<String, toml::Value> = match toml::from_str(&raw) {
        Ok(secrets) => secrets,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Secrets file is not valid TOML");
            return None;
        }
    };

    secrets
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .filter(|v| !v.trim().is_empty())
}
