use chrono::{SecondsFormat, Utc};
use image::RgbImage;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::AppResult;
use crate::faces::extractor::{FaceEmbeddingBackend, FaceEmbeddingExtractor};
use crate::faces::store::{EmbeddingStore, EnrolledIdentity};
use crate::notes::NoteStore;
use crate::payload::{decode_image_bytes, decode_image_payload};
use crate::users::{require_field, validate_user_name};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EnrollmentRecord {
    pub id: String,
    pub embedding_len: usize,
    pub created_at: String,
}

/// What [`remove_identity`] deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityRemoval {
    pub identity: EnrolledIdentity,
    pub notes_removed: usize,
}

#[derive(Debug)]
pub struct FaceEnrollmentOutcome {
    pub user: String,
    pub record: EnrollmentRecord,
    pub faces_detected: usize,
    pub logs: Vec<String>,
}

/// Registers a user's face: decode, extract, then create-only insert.
pub struct IdentityEnrollmentService<B, S> {
    extractor: FaceEmbeddingExtractor<B>,
    store: S,
}

impl<B, S> IdentityEnrollmentService<B, S>
where
    B: FaceEmbeddingBackend,
    S: EmbeddingStore,
{
    pub fn new(extractor: FaceEmbeddingExtractor<B>, store: S) -> Self {
        Self { extractor, store }
    }

    /// Enrolls `username` from a base64 or data URI image payload.
    ///
    /// An already enrolled user is rejected with `DuplicateUsername`; the
    /// existing embedding is left untouched.
    pub fn enroll(
        &self,
        username: Option<&str>,
        image_payload: Option<&str>,
    ) -> AppResult<FaceEnrollmentOutcome> {
        let username = require_field(username, "username")?;
        let image_payload = require_field(image_payload, "image")?;
        validate_user_name(username)?;

        let image = decode_image_payload(image_payload)?;
        self.enroll_decoded(username, &image)
    }

    /// Enrolls from raw image bytes (PNG, JPEG, ...).
    pub fn enroll_image_bytes(
        &self,
        username: &str,
        bytes: &[u8],
    ) -> AppResult<FaceEnrollmentOutcome> {
        let username = require_field(Some(username), "username")?;
        validate_user_name(username)?;
        let image = decode_image_bytes(bytes)?;
        self.enroll_decoded(username, &image)
    }

    fn enroll_decoded(&self, username: &str, image: &RgbImage) -> AppResult<FaceEnrollmentOutcome> {
        let mut logs = Vec::new();
        logs.push(format!(
            "Decoded image ({}x{})",
            image.width(),
            image.height()
        ));

        let primary = self.extractor.extract_primary(image)?;
        logs.push(format!("Detected {} face(s)", primary.faces_detected));
        debug!(
            user = username,
            faces = primary.faces_detected,
            "extracted enrollment embedding"
        );

        let identity = EnrolledIdentity {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            bounding_box: primary.face.bounding_box,
            embedding: primary.face.embedding,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        self.store.insert(&identity)?;

        let record = EnrollmentRecord {
            id: identity.id.clone(),
            embedding_len: identity.embedding.dim(),
            created_at: identity.created_at.clone(),
        };
        logs.push(format!(
            "Enrolled embedding {} (length {}) for user {}",
            record.id, record.embedding_len, username
        ));
        info!(user = username, id = %record.id, "user enrolled");

        Ok(FaceEnrollmentOutcome {
            user: username.to_string(),
            record,
            faces_detected: primary.faces_detected,
            logs,
        })
    }

    /// Deletes the enrolled identity and its notes so the user can enroll again.
    pub fn remove<N: NoteStore>(&self, notes: &N, username: &str) -> AppResult<IdentityRemoval> {
        remove_identity(&self.store, notes, username)
    }
}

/// Removes `username` and everything owned by it.
///
/// Notes go first: should the identity removal then fail, the user is still
/// enrolled and the call can be repeated. Tokens minted for the removed
/// enrollment stop authenticating as soon as the identity is gone.
pub fn remove_identity<S: EmbeddingStore, N: NoteStore>(
    store: &S,
    notes: &N,
    username: &str,
) -> AppResult<IdentityRemoval> {
    validate_user_name(username)?;
    store.get(username)?;
    let notes_removed = notes.purge(username)?;
    let identity = store.remove(username)?;
    info!(
        user = username,
        id = %identity.id,
        notes = notes_removed,
        "enrolled identity removed"
    );
    Ok(IdentityRemoval {
        identity,
        notes_removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use crate::faces::extractor::{BoundingBox, FaceEmbeddingRecord};
    use crate::faces::store::InMemoryEmbeddingStore;
    use crate::notes::InMemoryNoteStore;
    use base64::{engine::general_purpose, Engine as _};
    use image::{ImageOutputFormat, Rgb};
    use std::io::Cursor;

    struct StubBackend {
        faces: Vec<Vec<f64>>,
    }

    impl FaceEmbeddingBackend for StubBackend {
        fn extract(
            &self,
            _image: &RgbImage,
            _num_jitters: u32,
        ) -> AppResult<Vec<FaceEmbeddingRecord>> {
            Ok(self
                .faces
                .iter()
                .map(|embedding| FaceEmbeddingRecord {
                    bounding_box: BoundingBox {
                        left: 0,
                        top: 0,
                        right: 1,
                        bottom: 1,
                    },
                    embedding: embedding.clone(),
                })
                .collect())
        }
    }

    fn payload() -> String {
        let img = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, ImageOutputFormat::Png).unwrap();
        general_purpose::STANDARD.encode(cursor.into_inner())
    }

    fn service(faces: Vec<Vec<f64>>) -> IdentityEnrollmentService<StubBackend, InMemoryEmbeddingStore> {
        IdentityEnrollmentService::new(
            FaceEmbeddingExtractor::new(StubBackend { faces }, 1, 2),
            InMemoryEmbeddingStore::new(),
        )
    }

    #[test]
    fn enroll_stores_first_embedding() {
        let service = service(vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        let outcome = service.enroll(Some("alice"), Some(&payload())).unwrap();
        assert_eq!(outcome.faces_detected, 2);
        assert_eq!(outcome.record.embedding_len, 2);
        assert_eq!(
            service.store.get("alice").unwrap().embedding.as_slice(),
            &[1.0, 0.0]
        );
    }

    #[test]
    fn missing_fields_are_validation_errors() {
        let service = service(vec![vec![1.0, 0.0]]);
        assert!(matches!(
            service.enroll(None, Some(&payload())).unwrap_err(),
            AppError::MissingField { field: "username" }
        ));
        assert!(matches!(
            service.enroll(Some("alice"), Some("")).unwrap_err(),
            AppError::MissingField { field: "image" }
        ));
    }

    #[test]
    fn no_face_leaves_store_empty() {
        let service = service(vec![]);
        let err = service.enroll(Some("alice"), Some(&payload())).unwrap_err();
        assert!(matches!(err, AppError::NoFaceDetected));
        assert!(service.store.is_empty());
    }

    #[test]
    fn remove_allows_fresh_enrollment_without_old_notes() {
        let service = service(vec![vec![1.0, 0.0]]);
        let notes = InMemoryNoteStore::new();
        let first = service.enroll(Some("john.doe"), Some(&payload())).unwrap();
        notes.create("john.doe", "old", "").unwrap();

        let removed = service.remove(&notes, "john.doe").unwrap();
        assert_eq!(removed.identity.id, first.record.id);
        assert_eq!(removed.notes_removed, 1);
        assert!(notes.list("john.doe").unwrap().is_empty());

        let second = service.enroll(Some("john.doe"), Some(&payload())).unwrap();
        assert_ne!(second.record.id, first.record.id);
    }

    #[test]
    fn removing_unknown_user_keeps_notes() {
        let service = service(vec![vec![1.0, 0.0]]);
        let notes = InMemoryNoteStore::new();
        notes.create("ghost", "left behind", "").unwrap();
        assert!(matches!(
            service.remove(&notes, "ghost").unwrap_err(),
            AppError::UnknownUser { .. }
        ));
        assert_eq!(notes.list("ghost").unwrap().len(), 1);
    }
}
