use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use image::ImageError;
use serde::Serialize;
use thiserror::Error;

/// Stable, caller-visible classification of an [`AppError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    DecodeError,
    NoFaceDetected,
    FaceMismatch,
    UnknownUser,
    DuplicateUsername,
    Unauthorized,
    NoteNotFound,
    Configuration,
    Backend,
    Storage,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::DecodeError => "decode_error",
            ErrorKind::NoFaceDetected => "no_face_detected",
            ErrorKind::FaceMismatch => "face_mismatch",
            ErrorKind::UnknownUser => "unknown_user",
            ErrorKind::DuplicateUsername => "duplicate_username",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NoteNotFound => "note_not_found",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Backend => "backend",
            ErrorKind::Storage => "storage",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("invalid user name '{user}': {message}")]
    InvalidUser { user: String, message: String },

    #[error("invalid value for {name}: {message}")]
    InvalidArgument { name: &'static str, message: String },

    #[error("invalid note: {message}")]
    InvalidNote { message: String },

    #[error("image payload is empty")]
    EmptyPayload,

    #[error("invalid base64 image data: {source}")]
    Base64 {
        #[source]
        source: base64::DecodeError,
    },

    #[error("failed to decode image: {source}")]
    ImageDecode {
        #[source]
        source: ImageError,
    },

    #[error("input file not found or unreadable: {path}")]
    MissingInput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no face found in the image")]
    NoFaceDetected,

    #[error("face recognition failed for user {user} (distance {distance:.4} > threshold {threshold:.4})")]
    FaceMismatch {
        user: String,
        distance: f64,
        threshold: f64,
    },

    #[error("user {user} not found")]
    UnknownUser { user: String },

    #[error("user {user} is already enrolled")]
    DuplicateUsername { user: String },

    #[error("embedding failed validation: {message}")]
    EmbeddingValidation { message: String },

    #[error("embedding length mismatch (expected {expected}, found {found})")]
    EmbeddingMismatch { expected: usize, found: usize },

    #[error("missing {kind} model; provide {flag} or set ${env}")]
    MissingModel {
        kind: &'static str,
        flag: &'static str,
        env: &'static str,
    },

    #[error("failed to load model {path}: {message}")]
    ModelLoad { path: PathBuf, message: String },

    #[error("face embedding backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("failed to read store file {path}: {source}")]
    StoreRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write store file {path}: {source}")]
    StoreWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("store file {path} is invalid: {message}")]
    InvalidStoreFile { path: PathBuf, message: String },

    #[error("store file {path} is encrypted and requires a store key")]
    EncryptedStoreRequiresKey { path: PathBuf },

    #[error("store file {path} is not encrypted but a store key is configured")]
    UnencryptedStoreFile { path: PathBuf },

    #[error("store encryption error: {0}")]
    Encryption(String),

    #[error("failed to load key file {path}: {message}")]
    KeyFile { path: PathBuf, message: String },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("credential error: {0}")]
    Credential(String),

    #[error("note {id} not found for user {user}")]
    NoteNotFound { user: String, id: u64 },

    #[error("configuration error in {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::MissingField { .. }
            | AppError::InvalidUser { .. }
            | AppError::InvalidArgument { .. }
            | AppError::InvalidNote { .. }
            | AppError::MissingInput { .. } => ErrorKind::ValidationError,
            AppError::EmptyPayload | AppError::Base64 { .. } | AppError::ImageDecode { .. } => {
                ErrorKind::DecodeError
            }
            AppError::NoFaceDetected => ErrorKind::NoFaceDetected,
            AppError::FaceMismatch { .. } => ErrorKind::FaceMismatch,
            AppError::UnknownUser { .. } => ErrorKind::UnknownUser,
            AppError::DuplicateUsername { .. } => ErrorKind::DuplicateUsername,
            AppError::Unauthorized(_) => ErrorKind::Unauthorized,
            AppError::NoteNotFound { .. } => ErrorKind::NoteNotFound,
            AppError::Config { .. } | AppError::KeyFile { .. } | AppError::MissingModel { .. } => {
                ErrorKind::Configuration
            }
            AppError::ModelLoad { .. } | AppError::BackendUnavailable(_) => ErrorKind::Backend,
            AppError::StoreRead { .. }
            | AppError::StoreWrite { .. }
            | AppError::InvalidStoreFile { .. }
            | AppError::EncryptedStoreRequiresKey { .. }
            | AppError::UnencryptedStoreFile { .. }
            | AppError::Encryption(_) => ErrorKind::Storage,
            AppError::EmbeddingValidation { .. }
            | AppError::EmbeddingMismatch { .. }
            | AppError::Credential(_)
            | AppError::Serialization(_)
            | AppError::Io(_)
            | AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        match self.kind() {
            ErrorKind::ValidationError | ErrorKind::DecodeError | ErrorKind::NoFaceDetected => {
                ExitCode::from(2)
            }
            ErrorKind::FaceMismatch | ErrorKind::Unauthorized => ExitCode::from(3),
            ErrorKind::UnknownUser | ErrorKind::NoteNotFound => ExitCode::from(4),
            ErrorKind::DuplicateUsername => ExitCode::from(5),
            _ => ExitCode::from(1),
        }
    }

    pub fn human_message(&self) -> String {
        self.to_string()
    }
}

pub type AppResult<T> = Result<T, AppError>;
