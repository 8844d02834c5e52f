//! Client settings and environment loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{ApimanError, InputError, Result};

/// Deploy file names searched for when none is given.
pub const DEFAULT_DEPLOY_FILES: &[&str] = &[".apiman.yml", ".apiman.yaml"];

/// Entities requested per page when exporting.
pub const COLLECTION_SIZE: u32 = 64;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// File name of the stored token.
pub const TOKEN_FILE_NAME: &str = "apiman_token.json";

/// Environment variable overriding the token location.
pub const TOKEN_FILE_ENV: &str = "APIMAN_TOKEN_FILE";

/// Environment variable overriding the request timeout.
pub const TIMEOUT_ENV: &str = "APIMAN_TIMEOUT_SECS";

/// Environment variable listing loadable schema types, comma separated.
pub const TYPES_ENV: &str = "APIMAN_TYPES";

/// Runtime settings of the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Where the access token is stored.
    pub token_file: PathBuf,
    /// Request timeout.
    pub timeout: Duration,
    /// Export page size.
    pub page_size: u32,
    /// Types the backend can load by name.
    pub known_types: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            token_file: default_token_file(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            page_size: COLLECTION_SIZE,
            known_types: Vec::new(),
        }
    }
}

impl Settings {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an invalid value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(path) = lookup(TOKEN_FILE_ENV).filter(|p| !p.is_empty()) {
            debug!("Overriding token file from environment");
            settings.token_file = PathBuf::from(path);
        }

        if let Some(secs) = lookup(TIMEOUT_ENV) {
            let secs: u64 = secs.trim().parse().map_err(|e| {
                InputError::parse(format!("invalid timeout \"{secs}\": {e}"), Some(TIMEOUT_ENV.to_string()))
            })?;
            settings.timeout = Duration::from_secs(secs);
        }

        if let Some(types) = lookup(TYPES_ENV) {
            settings.known_types = types
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        }

        Ok(settings)
    }

    /// Overrides the token file location.
    #[must_use]
    pub fn with_token_file(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.token_file = path;
        }
        self
    }
}

/// Token location in the home directory, or the temp dir when there is none.
#[must_use]
pub fn default_token_file() -> PathBuf {
    dirs::home_dir()
        .filter(|home| home.is_dir())
        .unwrap_or_else(std::env::temp_dir)
        .join(TOKEN_FILE_NAME)
}

/// Loads `<base_dir>/.env` if present.
///
/// Returns whether a file was loaded.
///
/// # Errors
///
/// Returns an error if the .env file exists but cannot be loaded.
pub fn load_dotenv(base_dir: &Path) -> Result<bool> {
    let env_path = base_dir.join(".env");

    if !env_path.exists() {
        debug!(".env file not found at: {}", env_path.display());
        return Ok(false);
    }

    info!("Loading environment from: {}", env_path.display());
    dotenvy::from_path(&env_path).map_err(|e| {
        ApimanError::Input(InputError::parse(
            format!("Failed to load .env file: {e}"),
            Some(env_path.display().to_string()),
        ))
    })?;

    Ok(true)
}

/// Finds a deploy file in `start_dir` or one of its parents.
///
/// # Errors
///
/// Returns an error if no deploy file is found.
pub fn find_deploy_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_DEPLOY_FILES {
            let candidate = current.join(filename);
            if candidate.is_file() {
                info!("Found deploy file: {}", candidate.display());
                return Ok(candidate);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(ApimanError::Input(InputError::FileNotFound {
        path: start.join(DEFAULT_DEPLOY_FILES[0]),
    }))
}
