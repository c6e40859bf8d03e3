use std::env;
use std::path::PathBuf;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{AppError, AppResult};
use crate::faces::embedding::FaceEmbedding;

pub const LANDMARK_ENV: &str = "DLIB_LANDMARK_MODEL";
pub const ENCODER_ENV: &str = "DLIB_ENCODER_MODEL";

#[derive(Debug, Clone, Default)]
pub struct ModelOverrides {
    pub landmark_model: Option<PathBuf>,
    pub encoder_model: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FaceModelPaths {
    pub landmark: PathBuf,
    pub encoder: PathBuf,
}

pub trait ModelPathResolver {
    fn resolve(&self, overrides: &ModelOverrides) -> AppResult<FaceModelPaths>;
}

/// Uses explicit paths first, then `$DLIB_LANDMARK_MODEL` / `$DLIB_ENCODER_MODEL`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvModelPathResolver;

impl ModelPathResolver for EnvModelPathResolver {
    fn resolve(&self, overrides: &ModelOverrides) -> AppResult<FaceModelPaths> {
        let landmark = overrides
            .landmark_model
            .clone()
            .or_else(|| env::var(LANDMARK_ENV).ok().map(PathBuf::from))
            .ok_or(AppError::MissingModel {
                kind: "landmark predictor",
                flag: "--landmark-model",
                env: LANDMARK_ENV,
            })?;

        let encoder = overrides
            .encoder_model
            .clone()
            .or_else(|| env::var(ENCODER_ENV).ok().map(PathBuf::from))
            .ok_or(AppError::MissingModel {
                kind: "face encoding network",
                flag: "--encoder-model",
                env: ENCODER_ENV,
            })?;

        Ok(FaceModelPaths { landmark, encoder })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoundingBox {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

/// Raw per-face output of a backend, in detection order.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceEmbeddingRecord {
    pub bounding_box: BoundingBox,
    pub embedding: Vec<f64>,
}

/// A detected face whose embedding passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFace {
    pub bounding_box: BoundingBox,
    pub embedding: FaceEmbedding,
}

/// The live side of a single request: the face used plus how many were seen.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryFace {
    pub face: ExtractedFace,
    pub faces_detected: usize,
}

pub trait FaceEmbeddingBackend {
    fn extract(&self, image: &RgbImage, num_jitters: u32) -> AppResult<Vec<FaceEmbeddingRecord>>;
}

impl<B: FaceEmbeddingBackend + ?Sized> FaceEmbeddingBackend for &B {
    fn extract(&self, image: &RgbImage, num_jitters: u32) -> AppResult<Vec<FaceEmbeddingRecord>> {
        (**self).extract(image, num_jitters)
    }
}

impl<B: FaceEmbeddingBackend + ?Sized> FaceEmbeddingBackend for Box<B> {
    fn extract(&self, image: &RgbImage, num_jitters: u32) -> AppResult<Vec<FaceEmbeddingRecord>> {
        (**self).extract(image, num_jitters)
    }
}

/// Turns pixel buffers into validated embeddings using a backend.
pub struct FaceEmbeddingExtractor<B> {
    backend: B,
    jitters: u32,
    embedding_dim: usize,
}

impl<B: FaceEmbeddingBackend> FaceEmbeddingExtractor<B> {
    pub fn new(backend: B, jitters: u32, embedding_dim: usize) -> Self {
        Self {
            backend,
            jitters,
            embedding_dim,
        }
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Every detected face in detection order. Fails when none are found.
    pub fn extract_all(&self, image: &RgbImage) -> AppResult<Vec<ExtractedFace>> {
        let records = self.backend.extract(image, self.jitters)?;
        debug!(
            faces = records.len(),
            width = image.width(),
            height = image.height(),
            "face detection finished"
        );
        if records.is_empty() {
            return Err(AppError::NoFaceDetected);
        }

        records
            .into_iter()
            .map(|record| {
                Ok(ExtractedFace {
                    bounding_box: record.bounding_box,
                    embedding: FaceEmbedding::new(record.embedding, self.embedding_dim)?,
                })
            })
            .collect()
    }

    /// The first detected face. Additional faces are ignored; there is no
    /// selection heuristic by size or position.
    pub fn extract_primary(&self, image: &RgbImage) -> AppResult<PrimaryFace> {
        let faces = self.extract_all(image)?;
        let faces_detected = faces.len();
        if faces_detected > 1 {
            warn!(
                faces = faces_detected,
                "multiple faces detected; using the first in detection order"
            );
        }
        let face = faces
            .into_iter()
            .next()
            .ok_or(AppError::NoFaceDetected)?;
        Ok(PrimaryFace {
            face,
            faces_detected,
        })
    }
}

#[cfg(feature = "dlib")]
mod dlib_backend {
    use dlib_face_recognition::{
        FaceDetector, FaceDetectorTrait, FaceEncoderNetwork, FaceEncoderTrait, ImageMatrix,
        LandmarkPredictor, LandmarkPredictorTrait,
    };
    use image::RgbImage;
    use tracing::debug;

    use super::{BoundingBox, FaceEmbeddingBackend, FaceEmbeddingRecord, FaceModelPaths};
    use crate::errors::{AppError, AppResult};

    pub struct DlibBackend {
        detector: FaceDetector,
        predictor: LandmarkPredictor,
        encoder: FaceEncoderNetwork,
    }

    impl DlibBackend {
        pub fn new(models: &FaceModelPaths) -> AppResult<Self> {
            debug!(path = %models.landmark.display(), "loading landmark model");
            let predictor = LandmarkPredictor::open(&models.landmark).map_err(|message| {
                AppError::ModelLoad {
                    path: models.landmark.clone(),
                    message,
                }
            })?;
            debug!(path = %models.encoder.display(), "loading encoder model");
            let encoder = FaceEncoderNetwork::open(&models.encoder).map_err(|message| {
                AppError::ModelLoad {
                    path: models.encoder.clone(),
                    message,
                }
            })?;
            let detector = FaceDetector::new();

            Ok(Self {
                detector,
                predictor,
                encoder,
            })
        }
    }

    impl FaceEmbeddingBackend for DlibBackend {
        fn extract(
            &self,
            image: &RgbImage,
            num_jitters: u32,
        ) -> AppResult<Vec<FaceEmbeddingRecord>> {
            let matrix = ImageMatrix::from_image(image);
            let locations = self.detector.face_locations(&matrix);

            let mut landmarks = Vec::with_capacity(locations.len());
            for rect in locations.iter() {
                landmarks.push(self.predictor.face_landmarks(&matrix, rect));
            }

            let encodings = self
                .encoder
                .get_face_encodings(&matrix, &landmarks, num_jitters);

            let mut records = Vec::with_capacity(locations.len());
            for (rect, encoding) in locations.iter().zip(encodings.iter()) {
                records.push(FaceEmbeddingRecord {
                    bounding_box: BoundingBox {
                        left: rect.left,
                        top: rect.top,
                        right: rect.right,
                        bottom: rect.bottom,
                    },
                    embedding: encoding.as_ref().to_vec(),
                });
            }

            Ok(records)
        }
    }
}

#[cfg(not(feature = "dlib"))]
mod dlib_backend {
    use image::RgbImage;

    use super::{FaceEmbeddingBackend, FaceEmbeddingRecord, FaceModelPaths};
    use crate::errors::{AppError, AppResult};

    /// Placeholder used when the crate is built without the `dlib` feature.
    pub struct DlibBackend {
        _private: (),
    }

    impl DlibBackend {
        pub fn new(_models: &FaceModelPaths) -> AppResult<Self> {
            Err(AppError::BackendUnavailable(
                "facegate was built without the `dlib` feature".into(),
            ))
        }
    }

    impl FaceEmbeddingBackend for DlibBackend {
        fn extract(
            &self,
            _image: &RgbImage,
            _num_jitters: u32,
        ) -> AppResult<Vec<FaceEmbeddingRecord>> {
            Err(AppError::BackendUnavailable(
                "facegate was built without the `dlib` feature".into(),
            ))
        }
    }
}

pub use dlib_backend::DlibBackend;

/// Resolves model paths and loads the dlib backend.
pub fn load_dlib_backend<R: ModelPathResolver>(
    resolver: &R,
    overrides: &ModelOverrides,
) -> AppResult<DlibBackend> {
    let models = resolver.resolve(overrides)?;
    DlibBackend::new(&models)
}
