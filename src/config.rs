/// The config module provides the config spec and parsing logic. Parsing
/// is deliberately fussy: every bad value names the key and the file it
/// came from.
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::errors::{ConfigError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Directories walked by the synchronizer.
    pub library_roots: Vec<PathBuf>,
    /// Where the cache database lives.
    pub cache_dir: PathBuf,
    /// Upper bound on the played-track history consulted by previous/next.
    pub history_limit: usize,
    /// When set, pressing previous at the start of history restarts the
    /// current track instead of doing nothing.
    pub restart_on_previous: bool,
}

impl Config {
    pub fn cache_database_path(&self) -> PathBuf {
        self.cache_dir.join("library.db")
    }

    /// Platform default config file location.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "wired").map(|d| d.config_dir().join("config.toml"))
    }

    pub fn parse(config_path: &Path) -> Result<Config> {
        let text = match fs::read_to_string(config_path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(config_path.to_path_buf()).into());
            }
            Err(e) => return Err(e.into()),
        };
        let data: toml::Value = text.parse().map_err(|e: toml::de::Error| ConfigError::Decode {
            path: config_path.to_path_buf(),
            message: e.to_string(),
        })?;

        let library_roots = match data.get("library_roots") {
            Some(toml::Value::Array(xs)) => {
                let mut roots = Vec::with_capacity(xs.len());
                for x in xs {
                    let s = x.as_str().ok_or_else(|| invalid(config_path, "library_roots", "must be a list of paths"))?;
                    roots.push(PathBuf::from(shellexpand::tilde(s).to_string()));
                }
                if roots.is_empty() {
                    return Err(invalid(config_path, "library_roots", "must not be empty").into());
                }
                roots
            }
            Some(_) => return Err(invalid(config_path, "library_roots", "must be a list of paths").into()),
            None => {
                return Err(ConfigError::MissingKey {
                    path: config_path.to_path_buf(),
                    key: "library_roots".to_string(),
                }
                .into());
            }
        };

        let cache_dir = match data.get("cache_dir") {
            Some(toml::Value::String(s)) => PathBuf::from(shellexpand::tilde(s).to_string()),
            Some(_) => return Err(invalid(config_path, "cache_dir", "must be a path").into()),
            None => default_cache_dir(config_path)?,
        };

        let history_limit = match data.get("history_limit") {
            Some(toml::Value::Integer(n)) if *n > 0 => *n as usize,
            Some(_) => return Err(invalid(config_path, "history_limit", "must be a positive integer").into()),
            None => 100,
        };

        let restart_on_previous = match data.get("restart_on_previous") {
            Some(toml::Value::Boolean(b)) => *b,
            Some(_) => return Err(invalid(config_path, "restart_on_previous", "must be a boolean").into()),
            None => false,
        };

        Ok(Config {
            library_roots,
            cache_dir,
            history_limit,
            restart_on_previous,
        })
    }
}

fn default_cache_dir(config_path: &Path) -> Result<PathBuf> {
    ProjectDirs::from("", "", "wired").map(|d| d.cache_dir().to_path_buf()).ok_or_else(|| {
        invalid(config_path, "cache_dir", "not set and no platform cache directory could be resolved").into()
    })
}

fn invalid(path: &Path, key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        path: path.to_path_buf(),
        key: key.to_string(),
        message: message.to_string(),
    }
}
