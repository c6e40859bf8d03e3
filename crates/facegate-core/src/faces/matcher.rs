use serde::Serialize;

use crate::errors::{AppError, AppResult};

pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchOutcome {
    pub matched: bool,
    pub distance: f64,
    pub threshold: f64,
}

/// Euclidean-distance comparison against a fixed threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceMatcher {
    threshold: f64,
}

impl FaceMatcher {
    pub fn new(threshold: f64) -> AppResult<Self> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(AppError::Internal(format!(
                "match threshold must be a positive number (found {threshold})"
            )));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// A candidate matches when its distance to the stored embedding is at most the threshold.
    pub fn compare(&self, stored: &[f64], candidate: &[f64]) -> AppResult<MatchOutcome> {
        let distance = euclidean_distance(stored, candidate)?;
        Ok(MatchOutcome {
            matched: distance <= self.threshold,
            distance,
            threshold: self.threshold,
        })
    }
}

impl Default for FaceMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

pub fn euclidean_distance(lhs: &[f64], rhs: &[f64]) -> AppResult<f64> {
    if lhs.len() != rhs.len() {
        return Err(AppError::EmbeddingMismatch {
            expected: lhs.len(),
            found: rhs.len(),
        });
    }

    let sum = lhs
        .iter()
        .zip(rhs.iter())
        .map(|(l, r)| {
            let diff = l - r;
            diff * diff
        })
        .sum::<f64>();
    Ok(sum.sqrt())
}
