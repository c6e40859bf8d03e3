use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

/// A face embedding of known, validated dimensionality.
///
/// Construction goes through [`FaceEmbedding::new`], which rejects vectors of
/// the wrong length, non-finite components and the zero vector. Deserialized
/// values are unchecked until passed through [`FaceEmbedding::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceEmbedding(Vec<f64>);

impl FaceEmbedding {
    pub fn new(values: Vec<f64>, expected_dim: usize) -> AppResult<Self> {
        let embedding = Self(values);
        embedding.validate(expected_dim)?;
        Ok(embedding)
    }

    pub fn validate(&self, expected_dim: usize) -> AppResult<()> {
        if self.0.len() != expected_dim {
            return Err(AppError::EmbeddingMismatch {
                expected: expected_dim,
                found: self.0.len(),
            });
        }

        if let Some(idx) = self.0.iter().position(|value| !value.is_finite()) {
            return Err(AppError::EmbeddingValidation {
                message: format!("component {idx} is not a finite number"),
            });
        }

        let magnitude = self.0.iter().map(|value| value * value).sum::<f64>().sqrt();
        if magnitude <= f64::EPSILON {
            return Err(AppError::EmbeddingValidation {
                message: "embedding has zero magnitude".into(),
            });
        }

        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

impl Deref for FaceEmbedding {
    type Target = [f64];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[f64]> for FaceEmbedding {
    fn as_ref(&self) -> &[f64] {
        &self.0
    }
}
