use std::path::PathBuf;

use facegate_config::{self, ResolvedConfig, ResolvedConfigWithSource, PRIMARY_CONFIG_PATH};

use crate::cli::ModelArgs;
use crate::errors::{config_error, AppError, AppResult};

pub fn load_settings() -> AppResult<ResolvedConfigWithSource> {
    load_settings_from(&facegate_config::default_paths())
}

pub fn load_settings_from(paths: &[PathBuf]) -> AppResult<ResolvedConfigWithSource> {
    let settings = facegate_config::load_resolved_from_paths(paths).map_err(config_error)?;
    match &settings.source {
        Some(path) => tracing::debug!(path = %path.display(), "loaded configuration"),
        None => tracing::debug!("no configuration file found; using defaults"),
    }
    Ok(settings)
}

/// Path used when reporting a problem with a setting that may have no file.
pub fn settings_origin(settings: &ResolvedConfigWithSource) -> PathBuf {
    settings
        .source
        .clone()
        .unwrap_or_else(|| PathBuf::from(PRIMARY_CONFIG_PATH))
}

pub fn apply_model_overrides(config: &mut ResolvedConfig, args: &ModelArgs) {
    if let Some(path) = &args.landmark_model {
        config.landmark_model = Some(path.clone());
    }
    if let Some(path) = &args.encoder_model {
        config.encoder_model = Some(path.clone());
    }
    if let Some(jitters) = args.jitters {
        config.jitters = jitters;
    }
}

pub fn apply_store_dir_override(config: &mut ResolvedConfig, store_dir: Option<&PathBuf>) {
    if let Some(dir) = store_dir {
        config.embedding_store_dir = dir.clone();
    }
}

pub fn apply_notes_dir_override(config: &mut ResolvedConfig, notes_dir: Option<&PathBuf>) {
    if let Some(dir) = notes_dir {
        config.notes_store_dir = dir.clone();
    }
}

pub fn apply_threshold_override(
    config: &mut ResolvedConfig,
    threshold: Option<f64>,
) -> AppResult<()> {
    if let Some(value) = threshold {
        if !value.is_finite() || value <= 0.0 {
            return Err(AppError::InvalidArgument {
                name: "--threshold",
                message: format!("must be a positive number (found {value})"),
            });
        }
        config.match_threshold = value;
    }
    Ok(())
}
