//! Moving stage files between the context root and other locations.
//!
//! A location is either a local path (`data/rows.jsonl`, `file:///data/rows.jsonl`)
//! or an object URI `<scheme>://<bucket>/<key>` with scheme `s3` or `gs`. Object
//! locations go through the [`ObjectStore`](crate::io::cloud::ObjectStore) given to
//! the [`Context`]; any other scheme is rejected up front.

use crate::config::Durability;
use crate::context::Context;
use crate::error::{Result, StageError};
use crate::io::{Codec, StageWriter};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// URI schemes routed to the context's object store.
pub const OBJECT_SCHEMES: &[&str] = &["s3", "gs"];

/// Where a stage file is uploaded to or downloaded from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    Object {
        scheme: String,
        bucket: String,
        key: String,
    },
}

impl Location {
    /// Parse a path or URI.
    ///
    /// # Errors
    /// - [`StageError::UnsupportedScheme`] for schemes other than `file`, `s3`, `gs`.
    /// - [`StageError::InvalidLocation`] for empty paths and object URIs without a
    ///   bucket or key.
    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = |reason| StageError::InvalidLocation {
            uri: uri.to_string(),
            reason,
        };
        let Some((scheme, rest)) = uri.split_once("://") else {
            if uri.is_empty() {
                return Err(invalid("empty path"));
            }
            return Ok(Self::Local(PathBuf::from(uri)));
        };
        match scheme {
            "file" if rest.is_empty() => Err(invalid("empty path")),
            "file" => Ok(Self::Local(PathBuf::from(rest))),
            s if OBJECT_SCHEMES.contains(&s) => {
                let (bucket, key) = rest
                    .split_once('/')
                    .ok_or_else(|| invalid("missing object key"))?;
                if bucket.is_empty() {
                    return Err(invalid("missing bucket"));
                }
                if key.is_empty() {
                    return Err(invalid("missing object key"));
                }
                Ok(Self::Object {
                    scheme: scheme.to_string(),
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
            }
            other => Err(StageError::UnsupportedScheme {
                scheme: other.to_string(),
                uri: uri.to_string(),
            }),
        }
    }
}

impl FromStr for Location {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<PathBuf> for Location {
    fn from(path: PathBuf) -> Self {
        Self::Local(path)
    }
}

impl From<&Path> for Location {
    fn from(path: &Path) -> Self {
        Self::Local(path.to_path_buf())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Object {
                scheme,
                bucket,
                key,
            } => write!(f, "{scheme}://{bucket}/{key}"),
        }
    }
}

/// Write `records` as a fresh file at `path`, replacing any previous content.
pub(crate) fn write_file<'a, T, I>(
    path: &Path,
    codec: Codec,
    durability: Durability,
    records: I,
) -> Result<usize>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = (&'a String, &'a T)>,
{
    let mut writer = StageWriter::<T>::create(path.to_path_buf(), codec, durability)?;
    for (key, value) in records {
        writer.write(key, value)?;
    }
    writer.close()?;
    Ok(writer.written())
}

/// Encode `records` to `dest`.
///
/// The first record is encoded before anything is created, so a value type the codec
/// cannot store fails without touching `dest`.
pub(crate) fn publish<'a, T, I>(
    ctx: &Context,
    records: I,
    dest: &Location,
    codec: Codec,
) -> Result<()>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = (&'a String, &'a T)>,
{
    let mut records = records.into_iter().peekable();
    if let Some((key, value)) = records.peek() {
        codec.encode(key, *value)?;
    }
    let durability = ctx.config().durability;
    match dest {
        Location::Local(path) => {
            let n = write_file(path, codec, durability, records)?;
            info!(location = %dest, records = n, "wrote collection");
        }
        Location::Object { bucket, key, .. } => {
            let store = ctx.object_store().ok_or_else(|| {
                StageError::transfer(dest.to_string(), "no object store configured")
            })?;
            let staging = tempfile::tempdir()
                .map_err(|e| StageError::io("create upload staging directory", e))?;
            let path = staging.path().join(format!("upload.{}", codec.extension()));
            let n = write_file(&path, codec, durability, records)?;
            store
                .upload_file(&path, bucket, key)
                .map_err(|e| StageError::Transfer {
                    location: dest.to_string(),
                    message: "upload failed".to_string(),
                    source: Some(e),
                })?;
            info!(location = %dest, records = n, "uploaded collection");
        }
    }
    Ok(())
}

/// Bring the file at `source` to `dest` (a stage path inside the root).
///
/// Nothing appears at `dest` unless the whole file arrived: copies and downloads land
/// in a staging directory next to `dest` and are renamed into place on success.
pub(crate) fn fetch(ctx: &Context, source: &Location, dest: &Path) -> Result<()> {
    if dest.exists() {
        return Err(StageError::transfer(
            source.to_string(),
            format!("destination {} already exists", dest.display()),
        ));
    }
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .map_err(|e| StageError::io(format!("mkdir -p {}", dir.display()), e))?;
    let staging = tempfile::Builder::new()
        .prefix(".fetch")
        .tempdir_in(dir)
        .map_err(|e| StageError::io(format!("create staging directory in {}", dir.display()), e))?;
    let staged = staging.path().join("stage");

    match source {
        Location::Local(from) => {
            if !from.is_file() {
                return Err(StageError::transfer(source.to_string(), "source file not found"));
            }
            if fs::rename(from, dest).is_ok() {
                info!(location = %source, path = %dest.display(), "moved stage file");
                return Ok(());
            }
            debug!(from = %from.display(), "rename failed, copying instead");
            fs::copy(from, &staged).map_err(|e| {
                StageError::io(format!("copy {} to {}", from.display(), staged.display()), e)
            })?;
        }
        Location::Object { bucket, key, .. } => {
            let store = ctx.object_store().ok_or_else(|| {
                StageError::transfer(source.to_string(), "no object store configured")
            })?;
            store
                .download_file(bucket, key, &staged)
                .map_err(|e| StageError::Transfer {
                    location: source.to_string(),
                    message: "download failed".to_string(),
                    source: Some(e),
                })?;
        }
    }
    if !staged.is_file() {
        return Err(StageError::transfer(
            source.to_string(),
            format!("{} missing after download", dest.display()),
        ));
    }
    fs::rename(&staged, dest).map_err(|e| {
        StageError::io(format!("rename {} to {}", staged.display(), dest.display()), e)
    })?;
    info!(location = %source, path = %dest.display(), "fetched stage file");
    Ok(())
}
