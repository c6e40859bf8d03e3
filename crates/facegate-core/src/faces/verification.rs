use image::RgbImage;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::credentials::{Credential, CredentialIssuer};
use crate::errors::{AppError, AppResult};
use crate::faces::extractor::{FaceEmbeddingBackend, FaceEmbeddingExtractor};
use crate::faces::matcher::FaceMatcher;
use crate::faces::store::{EmbeddingStore, EnrolledIdentity};
use crate::payload::{decode_image_bytes, decode_image_payload};
use crate::users::{require_field, validate_user_name};

/// Progress of a single verification attempt. `Accepted` and `Rejected` are
/// terminal; any error ends the attempt at the last stage reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStage {
    Received,
    Decoded,
    EmbeddingExtracted,
    Matched,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VerificationResult {
    pub user: String,
    /// Enrollment the live face was matched against.
    pub identity_id: String,
    pub accepted: bool,
    pub distance: f64,
    pub threshold: f64,
    pub faces_detected: usize,
}

#[derive(Debug)]
pub struct FaceVerificationOutcome {
    pub result: VerificationResult,
    pub stages: Vec<VerificationStage>,
    pub logs: Vec<String>,
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub verification: FaceVerificationOutcome,
    pub credential: Credential,
}

struct Attempt<'a> {
    user: &'a str,
    stages: Vec<VerificationStage>,
    logs: Vec<String>,
}

impl<'a> Attempt<'a> {
    fn new(user: &'a str) -> Self {
        Self {
            user,
            stages: vec![VerificationStage::Received],
            logs: Vec::new(),
        }
    }

    fn advance(&mut self, stage: VerificationStage, log: String) {
        debug!(user = self.user, ?stage, "verification stage reached");
        self.stages.push(stage);
        self.logs.push(log);
    }

    fn last_stage(&self) -> VerificationStage {
        self.stages
            .last()
            .copied()
            .unwrap_or(VerificationStage::Received)
    }

    /// Records where the attempt stopped before handing the error back.
    fn fail(&self, err: AppError) -> AppError {
        debug!(
            user = self.user,
            stage = ?self.last_stage(),
            kind = %err.kind(),
            "verification attempt failed"
        );
        err
    }
}

/// Checks a live image against a user's enrolled embedding.
pub struct IdentityVerificationService<B, S> {
    extractor: FaceEmbeddingExtractor<B>,
    store: S,
    matcher: FaceMatcher,
}

impl<B, S> IdentityVerificationService<B, S>
where
    B: FaceEmbeddingBackend,
    S: EmbeddingStore,
{
    pub fn new(extractor: FaceEmbeddingExtractor<B>, store: S, matcher: FaceMatcher) -> Self {
        Self {
            extractor,
            store,
            matcher,
        }
    }

    pub fn matcher(&self) -> &FaceMatcher {
        &self.matcher
    }

    /// Verifies a base64 or data URI payload against `username`'s enrollment.
    ///
    /// The stored embedding is looked up before any image work, so an unknown
    /// user is reported regardless of the payload. A distance above the
    /// threshold fails with `FaceMismatch`.
    pub fn verify(
        &self,
        username: Option<&str>,
        image_payload: Option<&str>,
    ) -> AppResult<FaceVerificationOutcome> {
        let username = require_field(username, "username")?;
        let image_payload = require_field(image_payload, "image")?;
        validate_user_name(username)?;

        let enrolled = self.store.get(username)?;
        let attempt = Attempt::new(username);
        let image = decode_image_payload(image_payload).map_err(|err| attempt.fail(err))?;
        self.verify_decoded(&enrolled, &image, attempt)
    }

    /// Verifies raw image bytes (PNG, JPEG, ...).
    pub fn verify_image_bytes(
        &self,
        username: &str,
        bytes: &[u8],
    ) -> AppResult<FaceVerificationOutcome> {
        let username = require_field(Some(username), "username")?;
        validate_user_name(username)?;

        let enrolled = self.store.get(username)?;
        let attempt = Attempt::new(username);
        let image = decode_image_bytes(bytes).map_err(|err| attempt.fail(err))?;
        self.verify_decoded(&enrolled, &image, attempt)
    }

    /// Verifies, then asks `issuer` for a credential on acceptance.
    pub fn login<I: CredentialIssuer>(
        &self,
        issuer: &I,
        username: Option<&str>,
        image_payload: Option<&str>,
    ) -> AppResult<LoginOutcome> {
        let verification = self.verify(username, image_payload)?;
        self.issue_for(issuer, verification)
    }

    pub fn login_image_bytes<I: CredentialIssuer>(
        &self,
        issuer: &I,
        username: &str,
        bytes: &[u8],
    ) -> AppResult<LoginOutcome> {
        let verification = self.verify_image_bytes(username, bytes)?;
        self.issue_for(issuer, verification)
    }

    fn issue_for<I: CredentialIssuer>(
        &self,
        issuer: &I,
        mut verification: FaceVerificationOutcome,
    ) -> AppResult<LoginOutcome> {
        let credential = issuer.issue(
            &verification.result.user,
            &verification.result.identity_id,
        )?;
        verification.logs.push(format!(
            "Issued {} credential for user {}",
            credential.token_type, verification.result.user
        ));
        Ok(LoginOutcome {
            verification,
            credential,
        })
    }

    fn verify_decoded(
        &self,
        enrolled: &EnrolledIdentity,
        image: &RgbImage,
        mut attempt: Attempt<'_>,
    ) -> AppResult<FaceVerificationOutcome> {
        attempt.advance(
            VerificationStage::Decoded,
            format!("Decoded image ({}x{})", image.width(), image.height()),
        );

        let primary = self
            .extractor
            .extract_primary(image)
            .map_err(|err| attempt.fail(err))?;
        attempt.advance(
            VerificationStage::EmbeddingExtracted,
            format!("Detected {} face(s)", primary.faces_detected),
        );

        enrolled
            .embedding
            .validate(self.extractor.embedding_dim())
            .map_err(|err| attempt.fail(err))?;
        let outcome = self
            .matcher
            .compare(&enrolled.embedding, &primary.face.embedding)
            .map_err(|err| attempt.fail(err))?;
        attempt.advance(
            VerificationStage::Matched,
            format!(
                "Euclidean distance {:.4} (threshold {:.4})",
                outcome.distance, outcome.threshold
            ),
        );

        let user = attempt.user.to_string();
        if !outcome.matched {
            warn!(
                stage = ?VerificationStage::Rejected,
                user = %user,
                distance = outcome.distance,
                threshold = outcome.threshold,
                "face verification rejected"
            );
            return Err(AppError::FaceMismatch {
                user,
                distance: outcome.distance,
                threshold: outcome.threshold,
            });
        }

        attempt.advance(
            VerificationStage::Accepted,
            format!("Accepted face for user {user}"),
        );
        info!(user = %user, distance = outcome.distance, "face verification accepted");

        Ok(FaceVerificationOutcome {
            result: VerificationResult {
                user,
                identity_id: enrolled.id.clone(),
                accepted: true,
                distance: outcome.distance,
                threshold: outcome.threshold,
                faces_detected: primary.faces_detected,
            },
            stages: attempt.stages,
            logs: attempt.logs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faces::embedding::FaceEmbedding;
    use crate::faces::extractor::{BoundingBox, FaceEmbeddingRecord};
    use crate::faces::store::InMemoryEmbeddingStore;
    use base64::{engine::general_purpose, Engine as _};
    use image::{ImageOutputFormat, Rgb};
    use std::io::Cursor;

    struct FixedBackend(Vec<f64>);

    impl FaceEmbeddingBackend for FixedBackend {
        fn extract(
            &self,
            _image: &RgbImage,
            _num_jitters: u32,
        ) -> AppResult<Vec<FaceEmbeddingRecord>> {
            Ok(vec![FaceEmbeddingRecord {
                bounding_box: BoundingBox {
                    left: 0,
                    top: 0,
                    right: 1,
                    bottom: 1,
                },
                embedding: self.0.clone(),
            }])
        }
    }

    fn payload() -> String {
        let img = RgbImage::from_pixel(4, 4, Rgb([9, 9, 9]));
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, ImageOutputFormat::Png).unwrap();
        format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(cursor.into_inner())
        )
    }

    fn store_with_alice() -> InMemoryEmbeddingStore {
        let store = InMemoryEmbeddingStore::new();
        store
            .insert(&EnrolledIdentity {
                id: "id".into(),
                username: "alice".into(),
                embedding: FaceEmbedding::new(vec![1.0, 0.0], 2).unwrap(),
                bounding_box: BoundingBox {
                    left: 0,
                    top: 0,
                    right: 1,
                    bottom: 1,
                },
                created_at: "2024-01-01T00:00:00.000Z".into(),
            })
            .unwrap();
        store
    }

    fn service(live: Vec<f64>) -> IdentityVerificationService<FixedBackend, InMemoryEmbeddingStore> {
        IdentityVerificationService::new(
            FaceEmbeddingExtractor::new(FixedBackend(live), 1, 2),
            store_with_alice(),
            FaceMatcher::default(),
        )
    }

    #[test]
    fn close_face_is_accepted_with_full_stage_trace() {
        let outcome = service(vec![0.9, 0.1]).verify(Some("alice"), Some(&payload())).unwrap();
        assert!(outcome.result.accepted);
        assert!(outcome.result.distance < 0.6);
        assert_eq!(
            outcome.stages,
            vec![
                VerificationStage::Received,
                VerificationStage::Decoded,
                VerificationStage::EmbeddingExtracted,
                VerificationStage::Matched,
                VerificationStage::Accepted,
            ]
        );
    }

    #[test]
    fn distant_face_is_a_mismatch() {
        let err = service(vec![0.0, 1.0])
            .verify(Some("alice"), Some(&payload()))
            .unwrap_err();
        match err {
            AppError::FaceMismatch {
                distance,
                threshold,
                ..
            } => assert!(distance > threshold),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_user_wins_over_bad_payload() {
        let err = service(vec![1.0, 0.0])
            .verify(Some("bob"), Some("%%% not base64"))
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownUser { .. }));
    }

    #[test]
    fn never_enrolled_names_are_unknown_whatever_their_characters() {
        let service = service(vec![1.0, 0.0]);
        for name in ["bob@example.com", "john.doe", "../alice"] {
            let err = service.verify(Some(name), Some(&payload())).unwrap_err();
            assert!(
                matches!(err, AppError::UnknownUser { .. }),
                "{name}: {err:?}"
            );
        }
    }

    #[test]
    fn accepted_result_names_the_matched_enrollment() {
        let outcome = service(vec![1.0, 0.0])
            .verify(Some("alice"), Some(&payload()))
            .unwrap();
        assert_eq!(outcome.result.identity_id, "id");
    }

    #[test]
    fn stored_embedding_of_other_dimension_is_rejected() {
        let service = IdentityVerificationService::new(
            FaceEmbeddingExtractor::new(FixedBackend(vec![1.0, 0.0, 0.0]), 1, 3),
            store_with_alice(),
            FaceMatcher::default(),
        );
        let err = service.verify(Some("alice"), Some(&payload())).unwrap_err();
        assert!(matches!(err, AppError::EmbeddingMismatch { .. }));
    }
}
