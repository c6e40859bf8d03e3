//! Builds core services from resolved configuration.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use facegate_config::{ResolvedConfig, ResolvedConfigWithSource};
use facegate_core::credentials::JwtIssuer;
use facegate_core::crypto::StoreKey;
use facegate_core::faces::{
    load_dlib_backend, DlibBackend, EnvModelPathResolver, FaceEmbeddingExtractor, FaceMatcher,
    FilesystemEmbeddingStore, ModelOverrides,
};
use facegate_core::notes::FilesystemNoteStore;

use crate::config::settings_origin;
use crate::errors::{AppError, AppResult};

/// An image as handed over on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    /// Base64 or data URI text.
    Payload(String),
    /// Encoded image file contents.
    Bytes(Vec<u8>),
}

/// Reads `path` (`-` for stdin) as a payload string, or as raw bytes when `raw`.
pub fn read_image_input(path: &Path, raw: bool) -> AppResult<ImageInput> {
    let bytes = if path == Path::new("-") {
        let mut buf = Vec::new();
        io::stdin()
            .lock()
            .read_to_end(&mut buf)
            .map_err(|source| AppError::MissingInput {
                path: path.to_path_buf(),
                source,
            })?;
        buf
    } else {
        fs::read(path).map_err(|source| AppError::MissingInput {
            path: path.to_path_buf(),
            source,
        })?
    };

    if raw {
        return Ok(ImageInput::Bytes(bytes));
    }
    // Non-UTF-8 bytes become U+FFFD and are then rejected by the base64 decoder.
    Ok(ImageInput::Payload(String::from_utf8_lossy(&bytes).into_owned()))
}

fn load_store_key(config: &ResolvedConfig) -> AppResult<Option<StoreKey>> {
    config
        .store_key_file
        .as_deref()
        .map(StoreKey::load)
        .transpose()
}

pub fn open_embedding_store(config: &ResolvedConfig) -> AppResult<FilesystemEmbeddingStore> {
    let store = FilesystemEmbeddingStore::new(config.embedding_store_dir.clone());
    Ok(match load_store_key(config)? {
        Some(key) => store.with_key(key),
        None => store,
    })
}

pub fn open_note_store(config: &ResolvedConfig) -> AppResult<FilesystemNoteStore> {
    let store = FilesystemNoteStore::new(config.notes_store_dir.clone());
    Ok(match load_store_key(config)? {
        Some(key) => store.with_key(key),
        None => store,
    })
}

pub fn build_extractor(config: &ResolvedConfig) -> AppResult<FaceEmbeddingExtractor<DlibBackend>> {
    let overrides = ModelOverrides {
        landmark_model: config.landmark_model.clone(),
        encoder_model: config.encoder_model.clone(),
    };
    let backend = load_dlib_backend(&EnvModelPathResolver, &overrides)?;
    Ok(FaceEmbeddingExtractor::new(
        backend,
        config.jitters,
        config.embedding_dim,
    ))
}

pub fn build_matcher(config: &ResolvedConfig) -> AppResult<FaceMatcher> {
    FaceMatcher::new(config.match_threshold)
}

pub fn token_secret_path(settings: &ResolvedConfigWithSource) -> AppResult<PathBuf> {
    settings
        .resolved
        .token_secret_file
        .clone()
        .ok_or_else(|| AppError::Config {
            path: settings_origin(settings),
            message: "token_secret_file is not configured".into(),
        })
}

pub fn build_issuer(settings: &ResolvedConfigWithSource) -> AppResult<JwtIssuer> {
    let path = token_secret_path(settings)?;
    JwtIssuer::from_secret_file(&path, settings.resolved.token_ttl)
}
