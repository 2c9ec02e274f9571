//! The object-store capability used to move stage files to and from remote storage.
//!
//! The interface is synchronous; implementations backed by async SDKs block
//! internally.

use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;

/// Error returned by an [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct ObjectStoreError {
    pub message: String,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    Authorization,
    NotFound,
    InvalidInput,
    Network,
    Timeout,
    Io,
    Other,
}

impl fmt::Display for ObjectStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl Error for ObjectStoreError {}

impl ObjectStoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

/// Blob storage addressed by bucket and key (S3, GCS, ...).
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `bucket`/`key`, replacing any existing object.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket is unreachable or the upload fails
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> ObjectStoreResult<()>;

    /// Fetch the object's bytes.
    ///
    /// # Errors
    ///
    /// Returns an error of kind [`ErrorKind::NotFound`] if the object does not exist
    fn get_object(&self, bucket: &str, key: &str) -> ObjectStoreResult<Vec<u8>>;

    /// # Errors
    ///
    /// Returns an error if the check itself fails
    fn object_exists(&self, bucket: &str, key: &str) -> ObjectStoreResult<bool>;

    /// # Errors
    ///
    /// Returns an error if the deletion fails
    fn delete_object(&self, bucket: &str, key: &str) -> ObjectStoreResult<()>;

    /// Upload a local file. Implementations with multipart uploads should override this.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the upload fails
    fn upload_file(&self, path: &Path, bucket: &str, key: &str) -> ObjectStoreResult<()> {
        let data = fs::read(path).map_err(|e| {
            ObjectStoreError::new(ErrorKind::Io, format!("read {}: {e}", path.display()))
        })?;
        self.put_object(bucket, key, &data)
    }

    /// Download an object into a local file, creating or replacing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is missing or the file cannot be written
    fn download_file(&self, bucket: &str, key: &str, path: &Path) -> ObjectStoreResult<()> {
        let data = self.get_object(bucket, key)?;
        fs::write(path, data).map_err(|e| {
            ObjectStoreError::new(ErrorKind::Io, format!("write {}: {e}", path.display()))
        })
    }
}
