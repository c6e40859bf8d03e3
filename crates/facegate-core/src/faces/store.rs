use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::atomic_file::{is_already_exists, write_atomic, WriteMode};
use crate::crypto::{self, StoreKey};
use crate::errors::{AppError, AppResult};
use crate::faces::embedding::FaceEmbedding;
use crate::faces::extractor::BoundingBox;
use crate::users::{storage_key, validate_user_name};

/// The single stored embedding for a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrolledIdentity {
    pub id: String,
    pub username: String,
    pub embedding: FaceEmbedding,
    pub bounding_box: BoundingBox,
    pub created_at: String,
}

/// Durable mapping from user name to enrolled embedding.
///
/// Implementations must make `insert` and `put` atomic with respect to `get`
/// for the same user: a reader sees the previous record or the new one, never
/// a partial write.
pub trait EmbeddingStore: Send + Sync {
    /// Stores `identity` only if its user has no record yet.
    fn insert(&self, identity: &EnrolledIdentity) -> AppResult<()>;
    /// Stores `identity`, replacing any existing record for its user.
    fn put(&self, identity: &EnrolledIdentity) -> AppResult<()>;
    fn get(&self, username: &str) -> AppResult<EnrolledIdentity>;
    fn remove(&self, username: &str) -> AppResult<EnrolledIdentity>;
}

impl<S: EmbeddingStore + ?Sized> EmbeddingStore for &S {
    fn insert(&self, identity: &EnrolledIdentity) -> AppResult<()> {
        (**self).insert(identity)
    }

    fn put(&self, identity: &EnrolledIdentity) -> AppResult<()> {
        (**self).put(identity)
    }

    fn get(&self, username: &str) -> AppResult<EnrolledIdentity> {
        (**self).get(username)
    }

    fn remove(&self, username: &str) -> AppResult<EnrolledIdentity> {
        (**self).remove(username)
    }
}

/// One JSON file per user under `dir`, optionally AES-256-GCM encrypted.
#[derive(Debug, Clone)]
pub struct FilesystemEmbeddingStore {
    dir: PathBuf,
    key: Option<StoreKey>,
}

impl FilesystemEmbeddingStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            key: None,
        }
    }

    pub fn with_key(mut self, key: StoreKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn user_path(&self, username: &str) -> AppResult<PathBuf> {
        validate_user_name(username)?;
        Ok(self.dir.join(format!("{}.json", storage_key(username))))
    }

    fn serialize(&self, identity: &EnrolledIdentity) -> AppResult<Vec<u8>> {
        crypto::encode_record(serde_json::to_vec_pretty(identity)?, self.key.as_ref())
    }

    fn read_identity(&self, path: &Path, username: &str) -> AppResult<EnrolledIdentity> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(AppError::UnknownUser {
                    user: username.to_string(),
                })
            }
            Err(source) => {
                return Err(AppError::StoreRead {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let plaintext = crypto::decode_record(data, self.key.as_ref(), path)?;

        let identity: EnrolledIdentity =
            serde_json::from_slice(&plaintext).map_err(|err| AppError::InvalidStoreFile {
                path: path.to_path_buf(),
                message: format!("invalid identity record: {err}"),
            })?;

        if identity.username != username {
            return Err(AppError::InvalidStoreFile {
                path: path.to_path_buf(),
                message: format!(
                    "record belongs to '{}' but was stored for '{username}'",
                    identity.username
                ),
            });
        }

        Ok(identity)
    }
}

impl EmbeddingStore for FilesystemEmbeddingStore {
    fn insert(&self, identity: &EnrolledIdentity) -> AppResult<()> {
        let path = self.user_path(&identity.username)?;
        let contents = self.serialize(identity)?;
        match write_atomic(&path, &contents, WriteMode::CreateNew) {
            Ok(()) => {
                debug!(user = %identity.username, path = %path.display(), "inserted identity");
                Ok(())
            }
            Err(err) if is_already_exists(&err) => Err(AppError::DuplicateUsername {
                user: identity.username.clone(),
            }),
            Err(err) => Err(err),
        }
    }

    fn put(&self, identity: &EnrolledIdentity) -> AppResult<()> {
        let path = self.user_path(&identity.username)?;
        let contents = self.serialize(identity)?;
        write_atomic(&path, &contents, WriteMode::Replace)?;
        debug!(user = %identity.username, path = %path.display(), "stored identity");
        Ok(())
    }

    fn get(&self, username: &str) -> AppResult<EnrolledIdentity> {
        let path = self.user_path(username)?;
        self.read_identity(&path, username)
    }

    fn remove(&self, username: &str) -> AppResult<EnrolledIdentity> {
        let path = self.user_path(username)?;
        let existing = self.read_identity(&path, username)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(existing),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(AppError::UnknownUser {
                user: username.to_string(),
            }),
            Err(source) => Err(AppError::StoreWrite { path, source }),
        }
    }
}

/// Process-local store with the same semantics as the filesystem store.
#[derive(Debug, Default)]
pub struct InMemoryEmbeddingStore {
    identities: RwLock<HashMap<String, EnrolledIdentity>>,
}

impl InMemoryEmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.identities.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> AppError {
    AppError::Internal("identity store lock poisoned".into())
}

impl EmbeddingStore for InMemoryEmbeddingStore {
    fn insert(&self, identity: &EnrolledIdentity) -> AppResult<()> {
        validate_user_name(&identity.username)?;
        let mut map = self.identities.write().map_err(|_| poisoned())?;
        if map.contains_key(&identity.username) {
            return Err(AppError::DuplicateUsername {
                user: identity.username.clone(),
            });
        }
        map.insert(identity.username.clone(), identity.clone());
        Ok(())
    }

    fn put(&self, identity: &EnrolledIdentity) -> AppResult<()> {
        validate_user_name(&identity.username)?;
        let mut map = self.identities.write().map_err(|_| poisoned())?;
        map.insert(identity.username.clone(), identity.clone());
        Ok(())
    }

    fn get(&self, username: &str) -> AppResult<EnrolledIdentity> {
        let map = self.identities.read().map_err(|_| poisoned())?;
        map.get(username).cloned().ok_or_else(|| AppError::UnknownUser {
            user: username.to_string(),
        })
    }

    fn remove(&self, username: &str) -> AppResult<EnrolledIdentity> {
        let mut map = self.identities.write().map_err(|_| poisoned())?;
        map.remove(username).ok_or_else(|| AppError::UnknownUser {
            user: username.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{SecondsFormat, Utc};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    fn identity(user: &str, values: Vec<f64>) -> EnrolledIdentity {
        let dim = values.len();
        EnrolledIdentity {
            id: uuid::Uuid::new_v4().to_string(),
            username: user.into(),
            embedding: FaceEmbedding::new(values, dim).unwrap(),
            bounding_box: BoundingBox {
                left: 0,
                top: 0,
                right: 1,
                bottom: 1,
            },
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    #[test]
    fn filesystem_store_round_trip_without_encryption() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemEmbeddingStore::new(tmp.path());
        let record = identity("alice", vec![0.1, 0.2, 0.3]);
        store.insert(&record).unwrap();

        assert_eq!(store.get("alice").unwrap(), record);
        let raw = fs::read_to_string(store.user_path("alice").unwrap()).unwrap();
        assert!(raw.contains("\"username\": \"alice\""));
    }

    #[test]
    fn filesystem_store_round_trip_with_encryption() {
        let tmp = TempDir::new().unwrap();
        let key = StoreKey::generate();
        let store = FilesystemEmbeddingStore::new(tmp.path()).with_key(key.clone());
        let record = identity("alice", vec![0.1, 0.2, 0.3]);
        store.insert(&record).unwrap();

        let raw = fs::read_to_string(store.user_path("alice").unwrap()).unwrap();
        assert!(raw.contains("AES-256-GCM"));
        assert!(!raw.contains("alice"));
        assert_eq!(store.get("alice").unwrap(), record);

        let keyless = FilesystemEmbeddingStore::new(tmp.path());
        assert!(matches!(
            keyless.get("alice").unwrap_err(),
            AppError::EncryptedStoreRequiresKey { .. }
        ));
    }

    #[test]
    fn keyed_store_refuses_planted_plaintext_records() {
        let tmp = TempDir::new().unwrap();
        let plain = FilesystemEmbeddingStore::new(tmp.path());
        plain.insert(&identity("mallory", vec![1.0, 0.0])).unwrap();

        let keyed = FilesystemEmbeddingStore::new(tmp.path()).with_key(StoreKey::generate());
        assert!(matches!(
            keyed.get("mallory").unwrap_err(),
            AppError::UnencryptedStoreFile { .. }
        ));
    }

    #[test]
    fn insert_rejects_duplicates_and_keeps_original() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemEmbeddingStore::new(tmp.path());
        let original = identity("alice", vec![1.0, 0.0]);
        store.insert(&original).unwrap();

        let err = store.insert(&identity("alice", vec![0.0, 1.0])).unwrap_err();
        assert!(matches!(err, AppError::DuplicateUsername { .. }));
        assert_eq!(store.get("alice").unwrap(), original);
    }

    #[test]
    fn put_replaces_existing_record() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemEmbeddingStore::new(tmp.path());
        store.insert(&identity("alice", vec![1.0, 0.0])).unwrap();
        let replacement = identity("alice", vec![0.0, 1.0]);
        store.put(&replacement).unwrap();
        assert_eq!(store.get("alice").unwrap(), replacement);
    }

    #[test]
    fn missing_user_is_unknown() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemEmbeddingStore::new(tmp.path());
        assert!(matches!(
            store.get("bob").unwrap_err(),
            AppError::UnknownUser { .. }
        ));
        assert!(matches!(
            store.remove("bob").unwrap_err(),
            AppError::UnknownUser { .. }
        ));
    }

    #[test]
    fn remove_deletes_the_record() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemEmbeddingStore::new(tmp.path());
        let record = identity("alice", vec![1.0, 0.0]);
        store.insert(&record).unwrap();
        let path = store.user_path("alice").unwrap();
        assert_eq!(store.remove("alice").unwrap(), record);
        assert!(!path.exists());
    }

    #[test]
    fn path_like_user_names_stay_inside_the_store() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("store");
        let store = FilesystemEmbeddingStore::new(&dir);
        assert!(matches!(
            store.get("../escape").unwrap_err(),
            AppError::UnknownUser { .. }
        ));

        for name in ["../escape", "john.doe", "bob@example.com"] {
            let record = identity(name, vec![1.0, 0.0]);
            store.insert(&record).unwrap();
            assert_eq!(store.get(name).unwrap(), record);
            assert_eq!(store.user_path(name).unwrap().parent(), Some(dir.as_path()));
        }
        assert!(!tmp.path().join("escape.json").exists());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 3);
    }

    #[test]
    fn blank_user_name_is_invalid() {
        let tmp = TempDir::new().unwrap();
        let store = FilesystemEmbeddingStore::new(tmp.path());
        assert!(matches!(
            store.get(" ").unwrap_err(),
            AppError::InvalidUser { .. }
        ));
    }

    #[test]
    fn concurrent_inserts_have_a_single_winner() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(FilesystemEmbeddingStore::new(tmp.path()));
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|idx| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let record = identity("alice", vec![1.0, idx as f64]);
                    barrier.wait();
                    store.insert(&record)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|err| matches!(err, AppError::DuplicateUsername { .. })));
    }

    #[test]
    fn in_memory_store_matches_filesystem_semantics() {
        let store = InMemoryEmbeddingStore::new();
        let record = identity("alice", vec![1.0, 0.0]);
        store.insert(&record).unwrap();
        assert!(matches!(
            store.insert(&record).unwrap_err(),
            AppError::DuplicateUsername { .. }
        ));
        assert_eq!(store.get("alice").unwrap(), record);
        assert_eq!(store.len(), 1);
        store.remove("alice").unwrap();
        assert!(store.is_empty());
    }
}
