//! Per-user notes, reachable only with a credential minted by a successful
//! face verification.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::atomic_file::{write_atomic, WriteMode};
use crate::credentials::CredentialIssuer;
use crate::crypto::{self, StoreKey};
use crate::errors::{AppError, AppResult};
use crate::faces::EmbeddingStore;
use crate::sessions::SessionAuthenticator;
use crate::users::{require_field, storage_key, validate_user_name};

pub const MAX_NOTE_TITLE_LEN: usize = 255;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Note {
    pub id: u64,
    pub title: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields of an update; `None` leaves the current value in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotePatch<'a> {
    pub title: Option<&'a str>,
    pub content: Option<&'a str>,
}

pub trait NoteStore: Send + Sync {
    /// Notes owned by `username`, oldest first.
    fn list(&self, username: &str) -> AppResult<Vec<Note>>;
    fn create(&self, username: &str, title: &str, content: &str) -> AppResult<Note>;
    fn update(&self, username: &str, id: u64, patch: NotePatch<'_>) -> AppResult<Note>;
    fn delete(&self, username: &str, id: u64) -> AppResult<Note>;
    /// Drops the user's whole note book; returns how many notes it held.
    fn purge(&self, username: &str) -> AppResult<usize>;
}

impl<N: NoteStore + ?Sized> NoteStore for &N {
    fn list(&self, username: &str) -> AppResult<Vec<Note>> {
        (**self).list(username)
    }

    fn create(&self, username: &str, title: &str, content: &str) -> AppResult<Note> {
        (**self).create(username, title, content)
    }

    fn update(&self, username: &str, id: u64, patch: NotePatch<'_>) -> AppResult<Note> {
        (**self).update(username, id, patch)
    }

    fn delete(&self, username: &str, id: u64) -> AppResult<Note> {
        (**self).delete(username, id)
    }

    fn purge(&self, username: &str) -> AppResult<usize> {
        (**self).purge(username)
    }
}

pub fn validate_note_title(title: &str) -> AppResult<()> {
    if title.trim().is_empty() {
        return Err(AppError::MissingField { field: "title" });
    }
    let len = title.chars().count();
    if len > MAX_NOTE_TITLE_LEN {
        return Err(AppError::InvalidNote {
            message: format!("title exceeds {MAX_NOTE_TITLE_LEN} characters (found {len})"),
        });
    }
    Ok(())
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// All notes of one user plus the id counter. Ids are never reused, even
/// after the newest note is deleted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NoteBook {
    owner: String,
    next_id: u64,
    notes: Vec<Note>,
}

impl NoteBook {
    fn empty(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            next_id: 1,
            notes: Vec::new(),
        }
    }

    fn create(&mut self, title: &str, content: &str) -> Note {
        let now = timestamp();
        let note = Note {
            id: self.next_id,
            title: title.to_string(),
            content: content.to_string(),
            created_at: now.clone(),
            updated_at: now,
        };
        self.next_id += 1;
        self.notes.push(note.clone());
        note
    }

    fn update(&mut self, id: u64, patch: NotePatch<'_>) -> AppResult<Note> {
        let owner = self.owner.clone();
        let note = self
            .notes
            .iter_mut()
            .find(|note| note.id == id)
            .ok_or(AppError::NoteNotFound { user: owner, id })?;
        if let Some(title) = patch.title {
            note.title = title.to_string();
        }
        if let Some(content) = patch.content {
            note.content = content.to_string();
        }
        note.updated_at = timestamp();
        Ok(note.clone())
    }

    fn delete(&mut self, id: u64) -> AppResult<Note> {
        let idx = self
            .notes
            .iter()
            .position(|note| note.id == id)
            .ok_or_else(|| AppError::NoteNotFound {
                user: self.owner.clone(),
                id,
            })?;
        Ok(self.notes.remove(idx))
    }
}

/// One JSON file per user under `dir`.
///
/// Writers are serialized within the process so read-modify-write cycles on
/// a note book do not interleave; each write replaces the file atomically.
#[derive(Debug)]
pub struct FilesystemNoteStore {
    dir: PathBuf,
    key: Option<StoreKey>,
    write_lock: Mutex<()>,
}

impl FilesystemNoteStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            key: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_key(mut self, key: StoreKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn book_path(&self, username: &str) -> AppResult<PathBuf> {
        validate_user_name(username)?;
        Ok(self.dir.join(format!("{}.json", storage_key(username))))
    }

    fn load(&self, path: &Path, username: &str) -> AppResult<NoteBook> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(NoteBook::empty(username))
            }
            Err(source) => {
                return Err(AppError::StoreRead {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let plaintext = crypto::decode_record(data, self.key.as_ref(), path)?;
        let book: NoteBook =
            serde_json::from_slice(&plaintext).map_err(|err| AppError::InvalidStoreFile {
                path: path.to_path_buf(),
                message: format!("invalid note book: {err}"),
            })?;
        if book.owner != username {
            return Err(AppError::InvalidStoreFile {
                path: path.to_path_buf(),
                message: format!(
                    "note book belongs to '{}' but was stored for '{username}'",
                    book.owner
                ),
            });
        }
        Ok(book)
    }

    fn save(&self, path: &Path, book: &NoteBook) -> AppResult<()> {
        let contents = crypto::encode_record(serde_json::to_vec_pretty(book)?, self.key.as_ref())?;
        write_atomic(path, &contents, WriteMode::Replace)?;
        debug!(user = %book.owner, path = %path.display(), notes = book.notes.len(), "saved note book");
        Ok(())
    }

    fn modify<T>(
        &self,
        username: &str,
        change: impl FnOnce(&mut NoteBook) -> AppResult<T>,
    ) -> AppResult<T> {
        let path = self.book_path(username)?;
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| AppError::Internal("note store lock poisoned".into()))?;
        let mut book = self.load(&path, username)?;
        let result = change(&mut book)?;
        self.save(&path, &book)?;
        Ok(result)
    }
}

impl NoteStore for FilesystemNoteStore {
    fn list(&self, username: &str) -> AppResult<Vec<Note>> {
        let path = self.book_path(username)?;
        Ok(self.load(&path, username)?.notes)
    }

    fn create(&self, username: &str, title: &str, content: &str) -> AppResult<Note> {
        self.modify(username, |book| Ok(book.create(title, content)))
    }

    fn update(&self, username: &str, id: u64, patch: NotePatch<'_>) -> AppResult<Note> {
        self.modify(username, |book| book.update(id, patch))
    }

    fn delete(&self, username: &str, id: u64) -> AppResult<Note> {
        self.modify(username, |book| book.delete(id))
    }

    fn purge(&self, username: &str) -> AppResult<usize> {
        let path = self.book_path(username)?;
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| AppError::Internal("note store lock poisoned".into()))?;
        let count = self.load(&path, username)?.notes.len();
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => return Err(AppError::StoreWrite { path, source }),
        }
        debug!(user = %username, notes = count, "purged note book");
        Ok(count)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryNoteStore {
    books: RwLock<HashMap<String, NoteBook>>,
}

impl InMemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> AppError {
    AppError::Internal("note store lock poisoned".into())
}

impl NoteStore for InMemoryNoteStore {
    fn list(&self, username: &str) -> AppResult<Vec<Note>> {
        validate_user_name(username)?;
        let books = self.books.read().map_err(|_| poisoned())?;
        Ok(books
            .get(username)
            .map(|book| book.notes.clone())
            .unwrap_or_default())
    }

    fn create(&self, username: &str, title: &str, content: &str) -> AppResult<Note> {
        validate_user_name(username)?;
        let mut books = self.books.write().map_err(|_| poisoned())?;
        Ok(books
            .entry(username.to_string())
            .or_insert_with(|| NoteBook::empty(username))
            .create(title, content))
    }

    fn update(&self, username: &str, id: u64, patch: NotePatch<'_>) -> AppResult<Note> {
        let mut books = self.books.write().map_err(|_| poisoned())?;
        match books.get_mut(username) {
            Some(book) => book.update(id, patch),
            None => Err(AppError::NoteNotFound {
                user: username.to_string(),
                id,
            }),
        }
    }

    fn delete(&self, username: &str, id: u64) -> AppResult<Note> {
        let mut books = self.books.write().map_err(|_| poisoned())?;
        match books.get_mut(username) {
            Some(book) => book.delete(id),
            None => Err(AppError::NoteNotFound {
                user: username.to_string(),
                id,
            }),
        }
    }

    fn purge(&self, username: &str) -> AppResult<usize> {
        let mut books = self.books.write().map_err(|_| poisoned())?;
        Ok(books
            .remove(username)
            .map(|book| book.notes.len())
            .unwrap_or(0))
    }
}

/// Token-gated note operations. The acting user is always the token
/// subject, and only while the enrollment the token names is still current.
pub struct NotesService<I, S, N> {
    sessions: SessionAuthenticator<I, S>,
    store: N,
}

impl<I, S, N> NotesService<I, S, N>
where
    I: CredentialIssuer,
    S: EmbeddingStore,
    N: NoteStore,
{
    pub fn new(sessions: SessionAuthenticator<I, S>, store: N) -> Self {
        Self { sessions, store }
    }

    fn authenticate(&self, token: Option<&str>) -> AppResult<String> {
        Ok(self.sessions.authenticate(token)?.username)
    }

    pub fn list(&self, token: Option<&str>) -> AppResult<(String, Vec<Note>)> {
        let username = self.authenticate(token)?;
        let notes = self.store.list(&username)?;
        debug!(user = %username, count = notes.len(), "listed notes");
        Ok((username, notes))
    }

    pub fn create(
        &self,
        token: Option<&str>,
        title: Option<&str>,
        content: Option<&str>,
    ) -> AppResult<(String, Note)> {
        let username = self.authenticate(token)?;
        let title = require_field(title, "title")?;
        validate_note_title(title)?;
        let note = self.store.create(&username, title, content.unwrap_or(""))?;
        info!(user = %username, id = note.id, "note created");
        Ok((username, note))
    }

    pub fn update(
        &self,
        token: Option<&str>,
        id: u64,
        patch: NotePatch<'_>,
    ) -> AppResult<(String, Note)> {
        let username = self.authenticate(token)?;
        if patch.title.is_none() && patch.content.is_none() {
            return Err(AppError::InvalidNote {
                message: "provide a title or content to update".into(),
            });
        }
        if let Some(title) = patch.title {
            validate_note_title(title)?;
        }
        let note = self.store.update(&username, id, patch)?;
        info!(user = %username, id, "note updated");
        Ok((username, note))
    }

    pub fn delete(&self, token: Option<&str>, id: u64) -> AppResult<(String, Note)> {
        let username = self.authenticate(token)?;
        let note = self.store.delete(&username, id)?;
        info!(user = %username, id, "note deleted");
        Ok((username, note))
    }
}
