//! The pipeline context: root directory, durability and object store shared by every
//! collection derived from it.

use crate::collection::{Staged, StageValue};
use crate::config::ContextConfig;
use crate::error::{Result, StageError};
use crate::io::cloud::ObjectStore;
use crate::io::{Codec, StageEntry, StageStore};
use crate::transfer::{self, Location};
use indexmap::IndexMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::info;

struct ContextInner {
    config: ContextConfig,
    store: StageStore,
    object_store: Option<Arc<dyn ObjectStore>>,
}

/// Shared handle to a pipeline's stage directory. Cheap to clone.
///
/// The root directory is created lazily, on the first stage write.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.inner.config)
            .field("object_store", &self.inner.object_store.is_some())
            .finish()
    }
}

impl Context {
    /// Context rooted at `root` with default durability.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::from_config(ContextConfig::with_root(root))
    }

    #[must_use]
    pub fn from_config(config: ContextConfig) -> Self {
        let store = StageStore::new(config.root.clone(), config.durability);
        Self {
            inner: Arc::new(ContextInner {
                config,
                store,
                object_store: None,
            }),
        }
    }

    /// Attach the object store used for `s3://` and `gs://` locations.
    #[must_use]
    pub fn with_object_store(self, object_store: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                config: self.inner.config.clone(),
                store: self.inner.store.clone(),
                object_store: Some(object_store),
            }),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        self.inner.store.root()
    }

    #[must_use]
    pub fn config(&self) -> &ContextConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn store(&self) -> &StageStore {
        &self.inner.store
    }

    #[must_use]
    pub fn object_store(&self) -> Option<&Arc<dyn ObjectStore>> {
        self.inner.object_store.as_ref()
    }

    /// Backing file of `stage` for `codec`.
    ///
    /// # Errors
    /// Fails for invalid stage names.
    pub fn stage_path(&self, stage: &str, codec: Codec) -> Result<PathBuf> {
        self.inner.store.path(stage, codec)
    }

    /// Stages present under the root.
    ///
    /// # Errors
    /// Fails if the root cannot be listed.
    pub fn stages(&self) -> Result<Vec<StageEntry>> {
        self.inner.store.stages()
    }

    /// Wrap an in-memory mapping. Nothing is persisted.
    pub fn create<T, I>(&self, values: I) -> Staged<T>
    where
        I: IntoIterator<Item = (String, T)>,
    {
        Staged::new(self.clone(), values.into_iter().collect())
    }

    /// Load `stage` if it exists, otherwise run `init_fn` once and persist its output.
    ///
    /// The initial records are written to a temporary file that is renamed into place
    /// once complete, so an interrupted init leaves no stage behind.
    ///
    /// # Errors
    /// Fails on read, encode or IO errors.
    pub fn init<T, I, F>(&self, stage: &str, codec: Codec, init_fn: F) -> Result<Staged<T>>
    where
        T: StageValue,
        I: IntoIterator<Item = (String, T)>,
        F: FnOnce() -> I,
    {
        self.try_init(stage, codec, || Ok::<_, std::convert::Infallible>(init_fn()))
    }

    /// Fallible [`init`](Self::init).
    ///
    /// # Errors
    /// [`StageError::UserFunction`] if `init_fn` fails; nothing is persisted then.
    pub fn try_init<T, I, E, F>(&self, stage: &str, codec: Codec, init_fn: F) -> Result<Staged<T>>
    where
        T: StageValue,
        I: IntoIterator<Item = (String, T)>,
        E: Into<anyhow::Error>,
        F: FnOnce() -> Result<I, E>,
    {
        if let Some(values) = self.inner.store.read::<T>(stage, codec)? {
            info!(stage, records = values.len(), "loaded cached init stage");
            return Ok(Staged::new(self.clone(), values));
        }

        let values: IndexMap<String, T> = init_fn()
            .map_err(|e| StageError::UserFunction {
                stage: stage.to_string(),
                key: "(init)".to_string(),
                source: e.into(),
            })?
            .into_iter()
            .collect();

        let path = self.inner.store.path(stage, codec)?;
        let root = self.root();
        std::fs::create_dir_all(root)
            .map_err(|e| StageError::io(format!("mkdir -p {}", root.display()), e))?;
        let staging = NamedTempFile::new_in(root)
            .map_err(|e| StageError::io(format!("create temp file in {}", root.display()), e))?;
        transfer::write_file(staging.path(), codec, self.config().durability, &values)?;
        staging
            .persist(&path)
            .map_err(|e| StageError::io(format!("rename into {}", path.display()), e.error))?;
        info!(stage, records = values.len(), "initialized stage");
        Ok(Staged::new(self.clone(), values))
    }

    /// Load an existing stage.
    ///
    /// # Errors
    /// [`StageError::StageNotFound`] if the stage has no backing file.
    pub fn load<T: StageValue>(&self, stage: &str, codec: Codec) -> Result<Staged<T>> {
        let values = self
            .inner
            .store
            .read::<T>(stage, codec)?
            .ok_or_else(|| StageError::StageNotFound {
                stage: stage.to_string(),
                root: self.root().to_path_buf(),
            })?;
        Ok(Staged::new(self.clone(), values))
    }

    /// Load `stage`, fetching its file from `source` first if it is not present locally.
    ///
    /// A local source file is moved into the root (copied across filesystems).
    ///
    /// # Errors
    /// Location errors, [`StageError::Transfer`] when the fetch fails or produces no
    /// file, plus any read error.
    pub fn download<T: StageValue>(
        &self,
        stage: &str,
        source: &str,
        codec: Codec,
    ) -> Result<Staged<T>> {
        self.download_from(stage, &Location::parse(source)?, codec)
    }

    /// [`download`](Self::download) with a parsed location.
    ///
    /// # Errors
    /// See [`download`](Self::download).
    pub fn download_from<T: StageValue>(
        &self,
        stage: &str,
        source: &Location,
        codec: Codec,
    ) -> Result<Staged<T>> {
        if let Some(values) = self.inner.store.read::<T>(stage, codec)? {
            return Ok(Staged::new(self.clone(), values));
        }
        let path = self.inner.store.path(stage, codec)?;
        transfer::fetch(self, source, &path)?;
        let values = self.inner.store.read::<T>(stage, codec)?.ok_or_else(|| {
            StageError::transfer(source.to_string(), "stage missing after download")
        })?;
        Ok(Staged::new(self.clone(), values))
    }
}
