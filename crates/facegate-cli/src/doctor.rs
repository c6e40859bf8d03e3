use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use facegate_config::{
    self, ConfigError, ResolvedConfig, ResolvedConfigWithSource, PRIMARY_CONFIG_PATH,
    SECONDARY_CONFIG_PATH,
};
use facegate_core::credentials::JwtIssuer;
use facegate_core::crypto::StoreKey;
use facegate_core::faces::{ENCODER_ENV, LANDMARK_ENV};
use serde::Serialize;

use crate::errors::AppResult;

const CHECK_CONFIG: &str = "config";
const CHECK_EMBEDDING_DIR: &str = "embedding_store_dir";
const CHECK_NOTES_DIR: &str = "notes_store_dir";
const CHECK_LANDMARK_MODEL: &str = "landmark_model";
const CHECK_ENCODER_MODEL: &str = "encoder_model";
const CHECK_BACKEND: &str = "embedding_backend";
const CHECK_STORE_KEY: &str = "store_key";
const CHECK_TOKEN_SECRET: &str = "token_secret";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorCheck {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl DoctorCheck {
    fn new(name: &str, status: CheckStatus, message: String, path: Option<&Path>) -> Self {
        Self {
            name: name.into(),
            status,
            message,
            path: path.map(|p| p.display().to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorOutcome {
    pub ok: bool,
    pub checks: Vec<DoctorCheck>,
}

#[derive(Clone)]
pub struct DoctorPaths {
    pub config_paths: Vec<PathBuf>,
}

impl Default for DoctorPaths {
    fn default() -> Self {
        Self {
            config_paths: vec![
                PathBuf::from(PRIMARY_CONFIG_PATH),
                PathBuf::from(SECONDARY_CONFIG_PATH),
            ],
        }
    }
}

pub struct DoctorContext {
    pub paths: DoctorPaths,
    pub fallback_config: ResolvedConfig,
    pub backend_available: bool,
}

impl Default for DoctorContext {
    fn default() -> Self {
        Self {
            paths: DoctorPaths::default(),
            fallback_config: ResolvedConfig::default(),
            backend_available: cfg!(feature = "dlib"),
        }
    }
}

pub fn run_doctor() -> AppResult<DoctorOutcome> {
    run_doctor_with(&DoctorContext::default())
}

pub fn run_doctor_with(ctx: &DoctorContext) -> AppResult<DoctorOutcome> {
    let (config_check, resolved) = check_config(&ctx.paths, &ctx.fallback_config);
    let cfg = &resolved.resolved;

    let landmark = cfg
        .landmark_model
        .clone()
        .or_else(|| env::var_os(LANDMARK_ENV).map(PathBuf::from));
    let encoder = cfg
        .encoder_model
        .clone()
        .or_else(|| env::var_os(ENCODER_ENV).map(PathBuf::from));

    let checks = vec![
        config_check,
        check_store_dir(CHECK_EMBEDDING_DIR, "Embedding store", &cfg.embedding_store_dir),
        check_store_dir(CHECK_NOTES_DIR, "Notes store", &cfg.notes_store_dir),
        check_model(CHECK_LANDMARK_MODEL, landmark.as_deref()),
        check_model(CHECK_ENCODER_MODEL, encoder.as_deref()),
        check_backend(ctx.backend_available),
        check_store_key(cfg.store_key_file.as_deref()),
        check_token_secret(cfg),
    ];

    let ok = checks.iter().all(|c| c.status != CheckStatus::Fail);
    Ok(DoctorOutcome { ok, checks })
}

fn check_config(
    paths: &DoctorPaths,
    fallback: &ResolvedConfig,
) -> (DoctorCheck, ResolvedConfigWithSource) {
    let fallback_with_source = || ResolvedConfigWithSource {
        resolved: fallback.clone(),
        source: None,
    };
    let existing = paths.config_paths.iter().filter(|p| p.exists()).count();

    match facegate_config::load_resolved_from_paths(&paths.config_paths) {
        Ok(resolved) => match resolved.source.clone() {
            Some(source) => {
                let check = if existing > 1 {
                    DoctorCheck::new(
                        CHECK_CONFIG,
                        CheckStatus::Warn,
                        format!(
                            "Several config files exist; using {}",
                            source.display()
                        ),
                        Some(&source),
                    )
                } else {
                    DoctorCheck::new(
                        CHECK_CONFIG,
                        CheckStatus::Pass,
                        format!("Loaded config from {}", source.display()),
                        Some(&source),
                    )
                };
                (check, resolved)
            }
            None => (
                DoctorCheck::new(
                    CHECK_CONFIG,
                    CheckStatus::Fail,
                    format!(
                        "Config file missing; tried {}",
                        display_paths(&paths.config_paths)
                    ),
                    None,
                ),
                fallback_with_source(),
            ),
        },
        Err(ConfigError::Read { path, source }) => (
            DoctorCheck::new(
                CHECK_CONFIG,
                CheckStatus::Fail,
                format!("Failed to read {}: {}", path.display(), source),
                Some(&path),
            ),
            fallback_with_source(),
        ),
        Err(ConfigError::Parse { path, message }) => (
            DoctorCheck::new(
                CHECK_CONFIG,
                CheckStatus::Fail,
                format!("Failed to parse {}: {}", path.display(), message),
                Some(&path),
            ),
            fallback_with_source(),
        ),
        Err(ConfigError::Invalid { path, message }) => (
            DoctorCheck::new(
                CHECK_CONFIG,
                CheckStatus::Fail,
                format!("Invalid settings in {}: {}", path.display(), message),
                Some(&path),
            ),
            fallback_with_source(),
        ),
    }
}

fn check_store_dir(name: &str, label: &str, path: &Path) -> DoctorCheck {
    if !path.exists() {
        return DoctorCheck::new(
            name,
            CheckStatus::Fail,
            format!("{label} {} missing", path.display()),
            Some(path),
        );
    }
    if !path.is_dir() {
        return DoctorCheck::new(
            name,
            CheckStatus::Fail,
            format!("{label} {} is not a directory", path.display()),
            Some(path),
        );
    }

    let readable = fs::read_dir(path).is_ok();
    let writeable = is_writeable_dir(path);
    if readable && writeable {
        return DoctorCheck::new(
            name,
            CheckStatus::Pass,
            format!("{label} {} is readable/writable", path.display()),
            Some(path),
        );
    }
    let missing = match (readable, writeable) {
        (false, false) => "read/write",
        (false, true) => "read",
        _ => "write",
    };
    DoctorCheck::new(
        name,
        CheckStatus::Fail,
        format!("{label} {} lacks {missing} permissions", path.display()),
        Some(path),
    )
}

fn check_model(name: &str, path: Option<&Path>) -> DoctorCheck {
    match path {
        None => DoctorCheck::new(
            name,
            CheckStatus::Fail,
            "Model path not configured; set config or env".into(),
            None,
        ),
        Some(p) => match fs::File::open(p) {
            Ok(_) => DoctorCheck::new(
                name,
                CheckStatus::Pass,
                format!("Found model at {}", p.display()),
                Some(p),
            ),
            Err(err) => DoctorCheck::new(
                name,
                CheckStatus::Fail,
                format!("Cannot read model {}: {}", p.display(), err),
                Some(p),
            ),
        },
    }
}

fn check_backend(available: bool) -> DoctorCheck {
    if available {
        DoctorCheck::new(
            CHECK_BACKEND,
            CheckStatus::Pass,
            "dlib face recognition backend compiled in".into(),
            None,
        )
    } else {
        DoctorCheck::new(
            CHECK_BACKEND,
            CheckStatus::Fail,
            "built without the `dlib` feature; enroll/verify/login are unavailable".into(),
            None,
        )
    }
}

fn check_store_key(path: Option<&Path>) -> DoctorCheck {
    match path {
        None => DoctorCheck::new(
            CHECK_STORE_KEY,
            CheckStatus::Pass,
            "Store encryption disabled (no store_key_file)".into(),
            None,
        ),
        Some(p) => match StoreKey::load(p) {
            Ok(_) => DoctorCheck::new(
                CHECK_STORE_KEY,
                CheckStatus::Pass,
                format!("Loaded store key from {}", p.display()),
                Some(p),
            ),
            Err(err) => DoctorCheck::new(
                CHECK_STORE_KEY,
                CheckStatus::Fail,
                err.human_message(),
                Some(p),
            ),
        },
    }
}

fn check_token_secret(cfg: &ResolvedConfig) -> DoctorCheck {
    match cfg.token_secret_file.as_deref() {
        None => DoctorCheck::new(
            CHECK_TOKEN_SECRET,
            CheckStatus::Fail,
            "token_secret_file not configured; login and notes are unavailable".into(),
            None,
        ),
        Some(p) => match JwtIssuer::from_secret_file(p, cfg.token_ttl) {
            Ok(_) => DoctorCheck::new(
                CHECK_TOKEN_SECRET,
                CheckStatus::Pass,
                format!("Token signing secret loaded from {}", p.display()),
                Some(p),
            ),
            Err(err) => DoctorCheck::new(
                CHECK_TOKEN_SECRET,
                CheckStatus::Fail,
                err.human_message(),
                Some(p),
            ),
        },
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_writeable_dir(path: &Path) -> bool {
    if let Ok(metadata) = fs::metadata(path) {
        if metadata.permissions().readonly() {
            return false;
        }
    }
    tempfile::Builder::new()
        .prefix(".facegate-doctor")
        .tempfile_in(path)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    fn base_paths(tmp: &Path) -> DoctorPaths {
        DoctorPaths {
            config_paths: vec![tmp.join("config.toml")],
        }
    }

    fn write_fixtures(tmp: &Path) {
        fs::create_dir_all(tmp.join("identities")).unwrap();
        fs::create_dir_all(tmp.join("notes")).unwrap();
        File::create(tmp.join("landmark.dat")).unwrap();
        File::create(tmp.join("encoder.dat")).unwrap();
        fs::write(tmp.join("token.secret"), "x".repeat(48)).unwrap();
    }

    fn write_config(tmp: &Path) {
        fs::write(
            tmp.join("config.toml"),
            format!(
                "embedding_store_dir = \"{}\"\nnotes_store_dir = \"{}\"\nlandmark_model = \"{}\"\nencoder_model = \"{}\"\ntoken_secret_file = \"{}\"\n",
                tmp.join("identities").display(),
                tmp.join("notes").display(),
                tmp.join("landmark.dat").display(),
                tmp.join("encoder.dat").display(),
                tmp.join("token.secret").display(),
            ),
        )
        .unwrap();
    }

    fn doctor_with(tmp: &Path, backend_available: bool) -> DoctorOutcome {
        let ctx = DoctorContext {
            paths: base_paths(tmp),
            fallback_config: ResolvedConfig::default(),
            backend_available,
        };
        run_doctor_with(&ctx).unwrap()
    }

    fn status<'a>(checks: &'a [DoctorCheck], name: &str) -> &'a DoctorCheck {
        checks
            .iter()
            .find(|c| c.name == name)
            .expect("check present")
    }

    #[test]
    fn doctor_success_when_all_checks_pass() {
        let tmp = tempdir().unwrap();
        write_fixtures(tmp.path());
        write_config(tmp.path());

        let outcome = doctor_with(tmp.path(), true);
        assert!(outcome.ok, "statuses: {:?}", outcome.checks);
        assert_eq!(
            status(&outcome.checks, CHECK_STORE_KEY).status,
            CheckStatus::Pass
        );
    }

    #[test]
    fn doctor_reports_missing_config() {
        let tmp = tempdir().unwrap();
        write_fixtures(tmp.path());
        let outcome = doctor_with(tmp.path(), true);

        assert_eq!(
            status(&outcome.checks, CHECK_CONFIG).status,
            CheckStatus::Fail
        );
        assert_eq!(
            status(&outcome.checks, CHECK_TOKEN_SECRET).status,
            CheckStatus::Fail
        );
        assert!(!outcome.ok);
    }

    #[test]
    fn doctor_reports_parse_error() {
        let tmp = tempdir().unwrap();
        write_fixtures(tmp.path());
        fs::write(
            tmp.path().join("config.toml"),
            "embedding_store_dir = { invalid = true }",
        )
        .unwrap();

        let outcome = doctor_with(tmp.path(), true);
        let check = status(&outcome.checks, CHECK_CONFIG);
        assert_eq!(check.status, CheckStatus::Fail);
        assert!(check.message.starts_with("Failed to parse"));
    }

    #[test]
    fn doctor_reports_short_token_secret_and_bad_store_key() {
        let tmp = tempdir().unwrap();
        write_fixtures(tmp.path());
        write_config(tmp.path());
        fs::write(tmp.path().join("token.secret"), "too-short").unwrap();
        fs::write(tmp.path().join("store.key"), "not base64 at all!").unwrap();
        let mut contents = fs::read_to_string(tmp.path().join("config.toml")).unwrap();
        contents.push_str(&format!(
            "store_key_file = \"{}\"\n",
            tmp.path().join("store.key").display()
        ));
        fs::write(tmp.path().join("config.toml"), contents).unwrap();

        let outcome = doctor_with(tmp.path(), true);
        assert_eq!(
            status(&outcome.checks, CHECK_TOKEN_SECRET).status,
            CheckStatus::Fail
        );
        assert_eq!(
            status(&outcome.checks, CHECK_STORE_KEY).status,
            CheckStatus::Fail
        );
        assert!(!outcome.ok);
    }

    #[test]
    fn doctor_reports_missing_store_dirs_and_backend() {
        let tmp = tempdir().unwrap();
        write_fixtures(tmp.path());
        write_config(tmp.path());
        fs::remove_dir_all(tmp.path().join("notes")).unwrap();

        let outcome = doctor_with(tmp.path(), false);
        assert_eq!(
            status(&outcome.checks, CHECK_NOTES_DIR).status,
            CheckStatus::Fail
        );
        assert_eq!(
            status(&outcome.checks, CHECK_EMBEDDING_DIR).status,
            CheckStatus::Pass
        );
        assert_eq!(
            status(&outcome.checks, CHECK_BACKEND).status,
            CheckStatus::Fail
        );
    }

    #[test]
    fn unconfigured_model_fails() {
        let check = check_model(CHECK_LANDMARK_MODEL, None);
        assert_eq!(check.status, CheckStatus::Fail);
        assert!(check.path.is_none());
    }
}
