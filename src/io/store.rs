//! The stage store: one append-only file per stage under a root directory.
//!
//! [`StageStore::read`] returns every complete record of a stage, or `None` when the
//! stage has never been written. [`StageStore::create_writer`] opens the stage for
//! appending; each [`StageWriter::write`] puts one whole record on disk before it
//! returns, so an interruption loses at most the record being written.

use crate::config::Durability;
use crate::error::{Result, StageError};
use crate::io::Codec;
use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fs::{File, OpenOptions, create_dir_all};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const MAX_STAGE_NAME_LEN: usize = 200;
const TAIL_CHUNK: usize = 8 * 1024;

/// Check that `name` can be used as a file name inside the root directory.
///
/// # Errors
/// Returns [`StageError::InvalidStageName`] for empty or overlong names, names with
/// path separators or NUL bytes, and names starting with `.`.
pub fn validate_stage_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "stage name cannot be empty"
    } else if name.len() > MAX_STAGE_NAME_LEN {
        "stage name too long (max 200 bytes)"
    } else if name.contains(['/', '\\', '\0']) {
        "stage name cannot contain path separators or NUL"
    } else if name.starts_with('.') {
        "stage name cannot start with `.`"
    } else {
        return Ok(());
    };
    Err(StageError::InvalidStageName {
        name: name.to_string(),
        reason,
    })
}

/// A stage file found in the root directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageEntry {
    pub name: String,
    pub codec: Codec,
    pub path: PathBuf,
}

/// Record-level facts about a stage file, without decoding any values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageStats {
    /// Complete (delimited) records, duplicates and blank lines included.
    pub records: usize,
    /// File size in bytes.
    pub bytes: u64,
    /// Bytes after the last delimiter, left by an interrupted write.
    pub torn_bytes: u64,
}

/// Stage files under one root directory.
#[derive(Clone, Debug)]
pub struct StageStore {
    root: PathBuf,
    durability: Durability,
}

impl StageStore {
    pub fn new(root: impl Into<PathBuf>, durability: Durability) -> Self {
        Self {
            root: root.into(),
            durability,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the backing file for `stage` written with `codec`.
    ///
    /// # Errors
    /// Returns [`StageError::InvalidStageName`] if the name is not usable as a file name.
    pub fn path(&self, stage: &str, codec: Codec) -> Result<PathBuf> {
        validate_stage_name(stage)?;
        Ok(self.root.join(format!("{stage}.{}", codec.extension())))
    }

    /// Read every persisted record of `stage`, in file order.
    ///
    /// Returns `Ok(None)` if the stage has no backing file. A torn trailing record is
    /// skipped; if a key appears more than once, the first occurrence wins.
    ///
    /// # Errors
    /// Fails with [`StageError::UnsupportedValueType`] before touching the file if the
    /// codec cannot store `T`, and on IO errors or any complete record that does not
    /// decode.
    pub fn read<T: DeserializeOwned>(
        &self,
        stage: &str,
        codec: Codec,
    ) -> Result<Option<IndexMap<String, T>>> {
        codec.check_value_type::<T>()?;
        read_records(&self.path(stage, codec)?, codec)
    }

    /// Open `stage` for appending, creating the root directory and the file as needed.
    ///
    /// # Errors
    /// Fails if the directory or file cannot be created or opened for writing.
    pub fn create_writer<T: Serialize>(
        &self,
        stage: &str,
        codec: Codec,
    ) -> Result<StageWriter<T>> {
        let path = self.path(stage, codec)?;
        StageWriter::append(path, codec, self.durability)
    }

    /// Count records of a stage without decoding them. `None` if the stage is absent.
    ///
    /// # Errors
    /// Fails on IO errors.
    pub fn stat(&self, stage: &str, codec: Codec) -> Result<Option<StageStats>> {
        let path = self.path(stage, codec)?;
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StageError::io(format!("open {}", path.display()), e)),
        };
        let delimiter = codec.delimiter();
        let mut rdr = BufReader::new(file);
        let mut stats = StageStats::default();
        let mut frame = Vec::new();
        loop {
            frame.clear();
            let n = rdr
                .read_until(delimiter, &mut frame)
                .map_err(|e| StageError::io(format!("read {}", path.display()), e))?;
            if n == 0 {
                break;
            }
            stats.bytes += n as u64;
            if frame.last() == Some(&delimiter) {
                stats.records += 1;
            } else {
                stats.torn_bytes = n as u64;
            }
        }
        Ok(Some(stats))
    }

    /// List the stages present under the root, sorted by name then codec.
    ///
    /// # Errors
    /// Fails if the root path cannot be expressed as a glob pattern.
    pub fn stages(&self) -> Result<Vec<StageEntry>> {
        let root = self.root.to_str().ok_or_else(|| {
            StageError::io(
                format!("list {}", self.root.display()),
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "root is not UTF-8"),
            )
        })?;
        let mut out = Vec::new();
        for &codec in Codec::ALL {
            let pattern = format!("{}/*.{}", glob::Pattern::escape(root), codec.extension());
            let paths = glob::glob(&pattern).map_err(|e| {
                StageError::io(
                    format!("list {}", self.root.display()),
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
                )
            })?;
            for path in paths.filter_map(std::result::Result::ok) {
                let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                if validate_stage_name(name).is_err() || !path.is_file() {
                    continue;
                }
                out.push(StageEntry {
                    name: name.to_string(),
                    codec,
                    path,
                });
            }
        }
        out.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.codec.extension().cmp(b.codec.extension()))
        });
        Ok(out)
    }
}

/// Read all complete records of the file at `path`.
pub(crate) fn read_records<T: DeserializeOwned>(
    path: &Path,
    codec: Codec,
) -> Result<Option<IndexMap<String, T>>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StageError::io(format!("open {}", path.display()), e)),
    };
    let delimiter = codec.delimiter();
    let mut rdr = BufReader::new(file);
    let mut out = IndexMap::new();
    let mut frame = Vec::new();
    let mut record = 0;
    loop {
        frame.clear();
        let n = rdr
            .read_until(delimiter, &mut frame)
            .map_err(|e| StageError::io(format!("read {}", path.display()), e))?;
        if n == 0 {
            break;
        }
        if frame.last() != Some(&delimiter) {
            warn!(path = %path.display(), bytes = n, "ignoring torn trailing record");
            break;
        }
        record += 1;
        if codec.is_blank(&frame) {
            continue;
        }
        let (key, value) = codec.decode::<T>(&mut frame, path, record)?;
        if out.contains_key(&key) {
            debug!(path = %path.display(), %key, record, "duplicate key, keeping first");
            continue;
        }
        out.insert(key, value);
    }
    Ok(Some(out))
}

/// Cut a trailing partial record so appends start on a record boundary.
fn trim_torn_tail(path: &Path, delimiter: u8) -> Result<()> {
    let io_err = |e| StageError::io(format!("repair {}", path.display()), e);
    let mut file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(io_err(e)),
    };
    let len = file.metadata().map_err(io_err)?.len();
    if len == 0 {
        return Ok(());
    }
    let mut last = [0_u8];
    file.seek(SeekFrom::End(-1)).map_err(io_err)?;
    file.read_exact(&mut last).map_err(io_err)?;
    if last[0] == delimiter {
        return Ok(());
    }

    let keep = end_of_last_record(&mut file, len, delimiter).map_err(io_err)?;
    warn!(
        path = %path.display(),
        dropped_bytes = len - keep,
        "trimming torn trailing record before appending"
    );
    file.set_len(keep).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    Ok(())
}

/// Offset just past the last `delimiter` in the first `len` bytes, or 0 if there is none.
///
/// Reads backwards in fixed-size chunks so a long torn tail never loads the file.
fn end_of_last_record(file: &mut File, len: u64, delimiter: u8) -> std::io::Result<u64> {
    let mut buf = vec![0_u8; TAIL_CHUNK];
    let mut end = len;
    while end > 0 {
        let start = end.saturating_sub(TAIL_CHUNK as u64);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(i) = chunk.iter().rposition(|b| *b == delimiter) {
            return Ok(start + i as u64 + 1);
        }
        end = start;
    }
    Ok(0)
}

/// Appends records to one stage file.
///
/// The file is closed by [`close`](Self::close) or, failing that, when the writer is
/// dropped, including during unwinding or when an enclosing future is cancelled.
#[derive(Debug)]
pub struct StageWriter<T> {
    file: Option<File>,
    path: PathBuf,
    codec: Codec,
    durability: Durability,
    written: HashSet<String>,
    _t: PhantomData<fn(&T)>,
}

impl<T: Serialize> StageWriter<T> {
    /// Open `path` for appending, after trimming any torn trailing record.
    pub(crate) fn append(path: PathBuf, codec: Codec, durability: Durability) -> Result<Self> {
        ensure_parent(&path)?;
        trim_torn_tail(&path, codec.delimiter())?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StageError::io(format!("open {} for append", path.display()), e))?;
        Ok(Self::from_file(file, path, codec, durability))
    }

    /// Create or truncate `path`.
    pub(crate) fn create(path: PathBuf, codec: Codec, durability: Durability) -> Result<Self> {
        ensure_parent(&path)?;
        let file = File::create(&path)
            .map_err(|e| StageError::io(format!("create {}", path.display()), e))?;
        Ok(Self::from_file(file, path, codec, durability))
    }

    pub(crate) fn from_file(
        file: File,
        path: PathBuf,
        codec: Codec,
        durability: Durability,
    ) -> Self {
        Self {
            file: Some(file),
            path,
            codec,
            durability,
            written: HashSet::new(),
            _t: PhantomData,
        }
    }

    /// Persist one record. Returns once the whole record is on disk.
    ///
    /// # Errors
    /// - [`StageError::MalformedRecord`] for an empty key or a key already written by
    ///   this writer.
    /// - [`StageError::UnsupportedValueType`] if the codec cannot encode `value`
    ///   (nothing is written in that case).
    /// - [`StageError::WriterClosed`] after [`close`](Self::close).
    pub fn write(&mut self, key: &str, value: &T) -> Result<()> {
        let record = self.written.len() + 1;
        if key.is_empty() {
            return Err(StageError::MalformedRecord {
                path: self.path.clone(),
                record,
                message: "empty key".to_string(),
            });
        }
        if self.written.contains(key) {
            return Err(StageError::MalformedRecord {
                path: self.path.clone(),
                record,
                message: format!("key `{key}` already written in this session"),
            });
        }
        let bytes = self.codec.encode(key, value)?;
        let file = self.file.as_mut().ok_or_else(|| StageError::WriterClosed {
            path: self.path.clone(),
        })?;
        file.write_all(&bytes)
            .and_then(|()| file.flush())
            .map_err(|e| StageError::io(format!("append to {}", self.path.display()), e))?;
        if self.durability == Durability::Sync {
            file.sync_data()
                .map_err(|e| StageError::io(format!("sync {}", self.path.display()), e))?;
        }
        self.written.insert(key.to_string());
        Ok(())
    }
}

impl<T> StageWriter<T> {
    /// Close the file. Safe to call more than once.
    ///
    /// # Errors
    /// Fails if the final sync fails.
    pub fn close(&mut self) -> Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        if self.durability == Durability::Sync {
            file.sync_all()
                .map_err(|e| StageError::io(format!("sync {}", self.path.display()), e))?;
        }
        debug!(path = %self.path.display(), records = self.written.len(), "closed stage writer");
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records written by this writer so far.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written.len()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }
}

impl<T> Drop for StageWriter<T> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.path.display(), error = %e, "failed to close stage writer");
        }
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent)
            .map_err(|e| StageError::io(format!("mkdir -p {}", parent.display()), e))?;
    }
    Ok(())
}
