use facegate_config::ConfigError;

pub use facegate_core::errors::{AppError, AppResult, ErrorKind};

/// Folds configuration loading failures into the shared error type.
pub fn config_error(err: ConfigError) -> AppError {
    match err {
        ConfigError::Read { path, source } => AppError::Config {
            path,
            message: source.to_string(),
        },
        ConfigError::Parse { path, message } | ConfigError::Invalid { path, message } => {
            AppError::Config { path, message }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn config_errors_keep_their_path() {
        let err = config_error(ConfigError::Parse {
            path: PathBuf::from("/etc/facegate/config.toml"),
            message: "expected value".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("/etc/facegate/config.toml"));
    }
}
