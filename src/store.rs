use std::io;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

/// A store location proven to live under the store root.
///
/// Values only come out of [`FileStore::resolve`]. The relative form is
/// the exact string upload digests are computed over; the absolute form is
/// where the bytes live on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePath {
    relative: String,
    absolute: PathBuf,
}

impl StorePath {
    pub fn relative(&self) -> &str {
        &self.relative
    }

    pub fn absolute(&self) -> &Path {
        &self.absolute
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ObjectMeta {
    pub len: u64,
    pub is_dir: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("path is not a valid store location")]
    ForbiddenPath,
    #[error("object already exists")]
    AlreadyExists,
    #[error("object not found")]
    NotFound,
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a decoded request path to a confined store location.
    ///
    /// `sub_path` must already be normalized (no surrounding slashes).
    /// The remainder after the prefix is normalized segment by segment
    /// before it is joined under the root: `.` drops, `..` pops, and a pop
    /// with nothing left to pop is an escape attempt and is rejected, not
    /// clamped.
    pub fn resolve(&self, sub_path: &str, url_path: &str) -> Result<StorePath, StoreError> {
        let rest = strip_sub_path(sub_path, url_path).ok_or(StoreError::ForbiddenPath)?;
        if rest.is_empty() || rest == "/" {
            return Err(StoreError::ForbiddenPath);
        }
        let rest = rest.strip_prefix('/').unwrap_or(rest);

        let mut segments: Vec<&str> = Vec::new();
        for component in Path::new(rest).components() {
            match component {
                Component::Normal(seg) => {
                    let seg = seg.to_str().ok_or(StoreError::ForbiddenPath)?;
                    if seg.contains('\0') {
                        return Err(StoreError::ForbiddenPath);
                    }
                    segments.push(seg);
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    if segments.pop().is_none() {
                        return Err(StoreError::ForbiddenPath);
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(StoreError::ForbiddenPath);
                }
            }
        }
        if segments.is_empty() {
            return Err(StoreError::ForbiddenPath);
        }

        let relative = segments.join("/");
        let mut absolute = self.root.clone();
        absolute.extend(&segments);
        Ok(StorePath { relative, absolute })
    }

    /// Create the object and drain `stream` into it, returning the byte
    /// count written.
    ///
    /// Creation is exclusive (`O_CREAT|O_EXCL`): of two concurrent uploads
    /// to one path exactly one wins, and the loser never touches the
    /// winner's bytes. A failed copy leaves the partial object in place;
    /// callers surface the error rather than rolling back.
    pub async fn create<S, E>(&self, path: &StorePath, stream: S) -> Result<u64, StoreError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if let Some(parent) = path.absolute().parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path.absolute())
            .await
            .map_err(|err| match err.kind() {
                io::ErrorKind::AlreadyExists => StoreError::AlreadyExists,
                _ => StoreError::Io(err),
            })?;

        let mut reader =
            StreamReader::new(stream.map_err(|err| io::Error::new(io::ErrorKind::Other, err)));
        let written = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        Ok(written)
    }

    pub async fn stat(&self, path: &StorePath) -> Result<ObjectMeta, StoreError> {
        let metadata = fs::metadata(path.absolute()).await.map_err(map_not_found)?;
        Ok(ObjectMeta {
            len: metadata.len(),
            is_dir: metadata.is_dir(),
        })
    }

    pub async fn open(&self, path: &StorePath) -> Result<File, StoreError> {
        File::open(path.absolute()).await.map_err(map_not_found)
    }
}

// Prefix matching respects segment boundaries so `/uploadX/f` never
// matches a sub-path of `upload`.
fn strip_sub_path<'a>(sub_path: &str, url_path: &'a str) -> Option<&'a str> {
    if sub_path.is_empty() {
        return Some(url_path);
    }
    let rest = url_path.strip_prefix('/')?.strip_prefix(sub_path)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

// ENOTDIR comes from a lookup that descends through a stored file;
// clients see that location the same as a missing one.
fn map_not_found(err: io::Error) -> StoreError {
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => StoreError::NotFound,
        _ => StoreError::Io(err),
    }
}
