use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const PRIMARY_CONFIG_PATH: &str = "/etc/facegate/config.toml";
pub const SECONDARY_CONFIG_PATH: &str = "/usr/local/etc/facegate/config.toml";
/// Euclidean distance below which dlib's ResNet encoder considers two faces the same person.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.6;
pub const DEFAULT_EMBEDDING_DIM: usize = 128;
pub const DEFAULT_EMBEDDING_STORE_DIR: &str = "/var/lib/facegate/identities";
pub const DEFAULT_NOTES_STORE_DIR: &str = "/var/lib/facegate/notes";
pub const DEFAULT_JITTERS: u32 = 1;
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub match_threshold: Option<f64>,
    pub embedding_dim: Option<usize>,
    pub embedding_store_dir: Option<PathBuf>,
    pub notes_store_dir: Option<PathBuf>,
    pub store_key_file: Option<PathBuf>,
    pub landmark_model: Option<PathBuf>,
    pub encoder_model: Option<PathBuf>,
    pub jitters: Option<u32>,
    pub token_secret_file: Option<PathBuf>,
    pub token_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub match_threshold: f64,
    pub embedding_dim: usize,
    pub embedding_store_dir: PathBuf,
    pub notes_store_dir: PathBuf,
    pub store_key_file: Option<PathBuf>,
    pub landmark_model: Option<PathBuf>,
    pub encoder_model: Option<PathBuf>,
    pub jitters: u32,
    pub token_secret_file: Option<PathBuf>,
    pub token_ttl: Duration,
}

impl ResolvedConfig {
    pub fn from_raw(raw: ConfigFile) -> Self {
        Self {
            match_threshold: raw.match_threshold.unwrap_or(DEFAULT_MATCH_THRESHOLD),
            embedding_dim: raw.embedding_dim.unwrap_or(DEFAULT_EMBEDDING_DIM),
            embedding_store_dir: raw
                .embedding_store_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EMBEDDING_STORE_DIR)),
            notes_store_dir: raw
                .notes_store_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_NOTES_STORE_DIR)),
            store_key_file: raw.store_key_file,
            landmark_model: raw.landmark_model,
            encoder_model: raw.encoder_model,
            jitters: raw.jitters.unwrap_or(DEFAULT_JITTERS),
            token_secret_file: raw.token_secret_file,
            token_ttl: Duration::from_secs(
                raw.token_ttl_secs.unwrap_or(DEFAULT_TOKEN_TTL_SECS).max(1),
            ),
        }
    }

    /// Rejects values that would make every comparison trivially pass or fail.
    pub fn validate(&self, source: &Path) -> Result<(), ConfigError> {
        if !self.match_threshold.is_finite() || self.match_threshold <= 0.0 {
            return Err(ConfigError::Invalid {
                path: source.to_path_buf(),
                message: format!(
                    "match_threshold must be a positive number (found {})",
                    self.match_threshold
                ),
            });
        }
        if self.embedding_dim == 0 {
            return Err(ConfigError::Invalid {
                path: source.to_path_buf(),
                message: "embedding_dim must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self::from_raw(ConfigFile::default())
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub contents: ConfigFile,
    pub source: PathBuf,
}

impl LoadedConfig {
    pub fn new(contents: ConfigFile, source: PathBuf) -> Self {
        Self { contents, source }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfigWithSource {
    pub resolved: ResolvedConfig,
    pub source: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid configuration in {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

pub fn default_paths() -> [PathBuf; 2] {
    [
        PathBuf::from(PRIMARY_CONFIG_PATH),
        PathBuf::from(SECONDARY_CONFIG_PATH),
    ]
}

pub fn load_config() -> Result<Option<LoadedConfig>, ConfigError> {
    load_from_paths(&default_paths())
}

pub fn load_resolved_config() -> Result<ResolvedConfigWithSource, ConfigError> {
    load_resolved_from_paths(&default_paths())
}

pub fn load_from_paths(paths: &[PathBuf]) -> Result<Option<LoadedConfig>, ConfigError> {
    for path in paths {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let parsed =
                    toml::from_str::<ConfigFile>(&contents).map_err(|err| ConfigError::Parse {
                        path: path.clone(),
                        message: err.to_string(),
                    })?;
                return Ok(Some(LoadedConfig::new(parsed, path.clone())));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source: err,
                })
            }
        }
    }

    Ok(None)
}

pub fn load_resolved_from_paths(
    paths: &[PathBuf],
) -> Result<ResolvedConfigWithSource, ConfigError> {
    match load_from_paths(paths)? {
        Some(entry) => {
            let resolved = ResolvedConfig::from_raw(entry.contents);
            resolved.validate(&entry.source)?;
            Ok(ResolvedConfigWithSource {
                resolved,
                source: Some(entry.source),
            })
        }
        None => Ok(ResolvedConfigWithSource {
            resolved: ResolvedConfig::default(),
            source: None,
        }),
    }
}
