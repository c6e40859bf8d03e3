//! Enrollment, verification, login, removal and token lookup as run from the
//! command line.

use facegate_core::credentials::CredentialIssuer;
use facegate_core::faces::{
    remove_identity, DlibBackend, EmbeddingStore, FaceEmbeddingBackend, FaceEnrollmentOutcome,
    FaceVerificationOutcome, FilesystemEmbeddingStore, IdentityEnrollmentService,
    IdentityVerificationService, LoginOutcome,
};
use facegate_core::notes::NoteStore;
use facegate_core::sessions::{Session, SessionAuthenticator};
use facegate_core::users::{require_field, validate_user_name};
use serde::Serialize;
use tracing::debug;

use crate::cli::{EnrollArgs, ImageArgs, RemoveArgs, VerifyArgs, WhoamiArgs};
use crate::config::{
    apply_model_overrides, apply_notes_dir_override, apply_store_dir_override,
    apply_threshold_override, load_settings,
};
use crate::errors::{AppError, AppResult};
use crate::runtime::{
    build_extractor, build_issuer, build_matcher, open_embedding_store, open_note_store,
    read_image_input, ImageInput,
};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RemovalOutcome {
    pub user: String,
    pub id: String,
    pub created_at: String,
    pub notes_removed: usize,
}

/// A validated user name with the image read from disk or stdin.
#[derive(Debug)]
pub struct ImageRequest {
    pub user: String,
    pub input: ImageInput,
}

pub fn read_image_request(args: &ImageArgs) -> AppResult<ImageRequest> {
    let user = require_field(args.user.as_deref(), "username")?;
    validate_user_name(user)?;
    let path = args
        .image
        .as_deref()
        .ok_or(AppError::MissingField { field: "image" })?;
    let input = read_image_input(path, args.raw)?;
    Ok(ImageRequest {
        user: user.to_string(),
        input,
    })
}

pub fn run_enroll(args: &EnrollArgs) -> AppResult<FaceEnrollmentOutcome> {
    let mut settings = load_settings()?;
    apply_model_overrides(&mut settings.resolved, &args.models);
    apply_store_dir_override(&mut settings.resolved, args.store_dir.as_ref());

    let request = read_image_request(&args.image)?;
    let store = open_embedding_store(&settings.resolved)?;
    let extractor = build_extractor(&settings.resolved)?;
    enroll_with(&IdentityEnrollmentService::new(extractor, store), &request)
}

pub fn enroll_with<B, S>(
    service: &IdentityEnrollmentService<B, S>,
    request: &ImageRequest,
) -> AppResult<FaceEnrollmentOutcome>
where
    B: FaceEmbeddingBackend,
    S: EmbeddingStore,
{
    match &request.input {
        ImageInput::Payload(text) => service.enroll(Some(&request.user), Some(text)),
        ImageInput::Bytes(bytes) => service.enroll_image_bytes(&request.user, bytes),
    }
}

pub fn run_verify(args: &VerifyArgs) -> AppResult<FaceVerificationOutcome> {
    let (service, request) = prepare_verification(args)?;
    verify_with(&service, &request)
}

pub fn verify_with<B, S>(
    service: &IdentityVerificationService<B, S>,
    request: &ImageRequest,
) -> AppResult<FaceVerificationOutcome>
where
    B: FaceEmbeddingBackend,
    S: EmbeddingStore,
{
    match &request.input {
        ImageInput::Payload(text) => service.verify(Some(&request.user), Some(text)),
        ImageInput::Bytes(bytes) => service.verify_image_bytes(&request.user, bytes),
    }
}

pub fn run_login(args: &VerifyArgs) -> AppResult<LoginOutcome> {
    let settings = load_settings()?;
    let issuer = build_issuer(&settings)?;
    let (service, request) = prepare_verification(args)?;
    login_with(&service, &issuer, &request)
}

pub fn login_with<B, S, I>(
    service: &IdentityVerificationService<B, S>,
    issuer: &I,
    request: &ImageRequest,
) -> AppResult<LoginOutcome>
where
    B: FaceEmbeddingBackend,
    S: EmbeddingStore,
    I: CredentialIssuer,
{
    match &request.input {
        ImageInput::Payload(text) => service.login(issuer, Some(&request.user), Some(text)),
        ImageInput::Bytes(bytes) => service.login_image_bytes(issuer, &request.user, bytes),
    }
}

type VerificationSetup = (
    IdentityVerificationService<DlibBackend, FilesystemEmbeddingStore>,
    ImageRequest,
);

fn prepare_verification(args: &VerifyArgs) -> AppResult<VerificationSetup> {
    let mut settings = load_settings()?;
    apply_model_overrides(&mut settings.resolved, &args.models);
    apply_store_dir_override(&mut settings.resolved, args.store_dir.as_ref());
    apply_threshold_override(&mut settings.resolved, args.threshold)?;

    let request = read_image_request(&args.image)?;
    let store = open_embedding_store(&settings.resolved)?;
    // Unknown users are reported before any model is loaded.
    store.get(&request.user)?;
    debug!(user = %request.user, "found enrolled identity; loading models");

    let extractor = build_extractor(&settings.resolved)?;
    let matcher = build_matcher(&settings.resolved)?;
    Ok((
        IdentityVerificationService::new(extractor, store, matcher),
        request,
    ))
}

pub fn run_remove(args: &RemoveArgs) -> AppResult<RemovalOutcome> {
    let mut settings = load_settings()?;
    apply_store_dir_override(&mut settings.resolved, args.store_dir.as_ref());
    apply_notes_dir_override(&mut settings.resolved, args.notes_dir.as_ref());
    let store = open_embedding_store(&settings.resolved)?;
    let notes = open_note_store(&settings.resolved)?;
    remove_with(&store, &notes, &args.user)
}

pub fn remove_with<S, N>(store: &S, notes: &N, user: &str) -> AppResult<RemovalOutcome>
where
    S: EmbeddingStore,
    N: NoteStore,
{
    let removed = remove_identity(store, notes, user)?;
    Ok(RemovalOutcome {
        user: removed.identity.username,
        id: removed.identity.id,
        created_at: removed.identity.created_at,
        notes_removed: removed.notes_removed,
    })
}

pub fn run_whoami(args: &WhoamiArgs) -> AppResult<Session> {
    let mut settings = load_settings()?;
    apply_store_dir_override(&mut settings.resolved, args.store_dir.as_ref());
    let issuer = build_issuer(&settings)?;
    let store = open_embedding_store(&settings.resolved)?;
    whoami_with(&SessionAuthenticator::new(issuer, store), args)
}

pub fn whoami_with<I, S>(
    sessions: &SessionAuthenticator<I, S>,
    args: &WhoamiArgs,
) -> AppResult<Session>
where
    I: CredentialIssuer,
    S: EmbeddingStore,
{
    sessions.whoami(args.token.as_deref())
}
