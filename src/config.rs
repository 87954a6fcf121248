// Configuration: built-in defaults merged with an optional JSON file found
// on a search path. Loaded once at startup and then only changed through
// explicit command line overrides.

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding extra config locations (colon separated),
/// searched before the built-in ones.
pub const CONFIG_PATH_ENV: &str = "GALAH_CONFIG_PATH";

/// Environment variable overriding the stored password.
pub const PASSWORD_ENV: &str = "GALAH_PASSWORD";

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "~/.galah/config/api_client.config",
    "/etc/galah/api_client.config",
    "./api_client.config",
];

/// Identity used when neither the command line nor the config names one.
pub const ANONYMOUS: &str = "Anonymous";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    #[serde(alias = "galah_host")]
    pub host: String,
    #[serde(alias = "galah_home")]
    pub home: PathBuf,
    pub use_oauth: bool,
    pub verify_certificate: bool,
    pub user: Option<String>,
    pub password: Option<String>,
    pub download_interval_secs: u64,
    pub download_max_attempts: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "http://localhost:5000".into(),
            home: PathBuf::from("~/.galah"),
            use_oauth: false,
            verify_certificate: true,
            user: None,
            password: None,
            download_interval_secs: 2,
            download_max_attempts: None,
        }
    }
}

impl Config {
    /// Parse a config file and merge it over the defaults. The home
    /// directory has `~` expanded.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ClientError::Config {
            path: path.to_path_buf(),
            message: format!("could not be opened for reading ({})", e),
        })?;
        let mut config: Config =
            serde_json::from_str(&text).map_err(|e| ClientError::Config {
                path: path.to_path_buf(),
                message: format!("is not formatted correctly ({})", e),
            })?;
        config.home = expand_tilde(&config.home);
        Ok(config)
    }

    /// Load from `explicit` when given, otherwise from the first existing
    /// file on the search path, otherwise the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let found = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => search_paths().into_iter().find(|p| p.is_file()),
        };
        match found {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading configuration");
                Config::from_file(&path)
            }
            None => {
                tracing::debug!("no configuration file found, using defaults");
                let mut config = Config::default();
                config.home = expand_tilde(&config.home);
                Ok(config)
            }
        }
    }

    /// Identity this invocation acts as.
    pub fn identity(&self, override_user: Option<&str>) -> String {
        override_user
            .map(str::to_string)
            .or_else(|| self.user.clone())
            .unwrap_or_else(|| ANONYMOUS.to_string())
    }

    /// Password from the environment value or the config file. The
    /// environment wins; having both is worth a warning.
    pub fn resolve_password(&self, env_password: Option<String>) -> Option<String> {
        let env_password = env_password.filter(|p| !p.is_empty());
        if env_password.is_some() && self.password.is_some() {
            tracing::warn!(
                "password specified in both {} and the configuration file, using {}",
                PASSWORD_ENV,
                PASSWORD_ENV
            );
        }
        env_password.or_else(|| self.password.clone().filter(|p| !p.is_empty()))
    }

    /// Whether delegated login is used after applying command line flags.
    pub fn delegated_login(&self, force_on: bool, force_off: bool) -> bool {
        !force_off && (force_on || self.use_oauth)
    }

    /// Scratch directory for the descriptor cache and the session file.
    pub fn tmp_dir(&self) -> PathBuf {
        self.home.join("tmp")
    }

    pub fn download_interval(&self) -> Duration {
        Duration::from_secs(self.download_interval_secs)
    }
}

/// Ordered list of places to look for the config file, top first.
pub fn search_paths() -> Vec<PathBuf> {
    search_paths_with(std::env::var(CONFIG_PATH_ENV).ok().as_deref())
}

fn search_paths_with(env_value: Option<&str>) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = env_value
        .map(|v| {
            v.split(':')
                .filter(|s| !s.is_empty())
                .map(|s| expand_tilde(Path::new(s)))
                .collect()
        })
        .unwrap_or_default();
    paths.extend(
        DEFAULT_CONFIG_PATHS
            .iter()
            .map(|p| expand_tilde(Path::new(p))),
    );
    paths
}

/// Replace a leading `~` with the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
