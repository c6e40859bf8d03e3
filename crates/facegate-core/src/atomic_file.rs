use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Atomically replace whatever is at the destination.
    Replace,
    /// Fail with [`io::ErrorKind::AlreadyExists`] if the destination exists.
    CreateNew,
}

/// Writes `contents` to a temp file beside `path`, syncs it and moves it into
/// place, so readers observe either the old file or the complete new one.
///
/// `CreateNew` failures caused by an existing destination are returned as a
/// [`AppError::StoreWrite`] whose source has kind `AlreadyExists`.
pub fn write_atomic(path: &Path, contents: &[u8], mode: WriteMode) -> AppResult<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|source| AppError::StoreWrite {
        path: parent.to_path_buf(),
        source,
    })?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|source| AppError::StoreWrite {
        path: path.to_path_buf(),
        source,
    })?;

    {
        let file = tmp.as_file_mut();
        {
            let mut writer = BufWriter::new(&mut *file);
            writer
                .write_all(contents)
                .and_then(|_| writer.write_all(b"\n"))
                .and_then(|_| writer.flush())
                .map_err(|source| AppError::StoreWrite {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
        file.sync_all().map_err(|source| AppError::StoreWrite {
            path: path.to_path_buf(),
            source,
        })?;
    }

    let file = match mode {
        WriteMode::Replace => tmp.persist(path),
        WriteMode::CreateNew => tmp.persist_noclobber(path),
    }
    .map_err(|err| AppError::StoreWrite {
        path: path.to_path_buf(),
        source: err.error,
    })?;

    restrict_permissions(&file, path)
}

/// True when `err` came from a `CreateNew` write that found the destination occupied.
pub fn is_already_exists(err: &AppError) -> bool {
    matches!(err, AppError::StoreWrite { source, .. } if source.kind() == io::ErrorKind::AlreadyExists)
}

#[cfg(unix)]
fn restrict_permissions(file: &File, path: &Path) -> AppResult<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = file
        .metadata()
        .map_err(|source| AppError::StoreWrite {
            path: path.to_path_buf(),
            source,
        })?
        .permissions();
    perms.set_mode(0o600);
    file.set_permissions(perms)
        .map_err(|source| AppError::StoreWrite {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &File, _path: &Path) -> AppResult<()> {
    Ok(())
}
