pub mod embedding;
pub mod enrollment;
pub mod extractor;
pub mod matcher;
pub mod store;
pub mod verification;

pub use embedding::FaceEmbedding;

pub use enrollment::{
    remove_identity, EnrollmentRecord, FaceEnrollmentOutcome, IdentityEnrollmentService,
    IdentityRemoval,
};

pub use extractor::{
    load_dlib_backend, BoundingBox, DlibBackend, EnvModelPathResolver, ExtractedFace,
    FaceEmbeddingBackend, FaceEmbeddingExtractor, FaceEmbeddingRecord, FaceModelPaths,
    ModelOverrides, ModelPathResolver, PrimaryFace, ENCODER_ENV, LANDMARK_ENV,
};

pub use matcher::{euclidean_distance, FaceMatcher, MatchOutcome, DEFAULT_MATCH_THRESHOLD};

pub use store::{
    EmbeddingStore, EnrolledIdentity, FilesystemEmbeddingStore, InMemoryEmbeddingStore,
};

pub use verification::{
    FaceVerificationOutcome, IdentityVerificationService, LoginOutcome, VerificationResult,
    VerificationStage,
};
