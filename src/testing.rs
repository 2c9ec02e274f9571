//! Utilities for testing stage pipelines.
//!
//! [`TestContext`] gives each test its own stage directory that is removed when the
//! test ends, and can [`reopen`](TestContext::reopen) that directory as a fresh
//! context to simulate a process restart.
//!
//! ```
//! use stagecache::Codec;
//! use stagecache::testing::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let t = TestContext::new()?;
//! let calls = CallCounter::new();
//! let rows = t.create(numbered_rows(3));
//!
//! let c = calls.clone();
//! rows.map("double", Codec::Jsonl, |_, r| { c.tick(); Row::new(r.value * 2) })?;
//!
//! // Same root, new context: nothing left to compute.
//! let again = t.reopen().create(numbered_rows(3));
//! let c = calls.clone();
//! let doubled = again.map("double", Codec::Jsonl, |_, r| { c.tick(); Row::new(r.value * 2) })?;
//!
//! assert_eq!(calls.get(), 3);
//! assert_staged_eq(
//!     &doubled,
//!     &[("row1", Row::new(2)), ("row2", Row::new(4)), ("row3", Row::new(6))],
//! );
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;

use crate::config::{ContextConfig, Durability};
use crate::context::Context;
use crate::io::cloud::ObjectStore;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A [`Context`] rooted in a temporary directory.
///
/// Uses [`Durability::Flush`] since the directory never outlives the test.
pub struct TestContext {
    dir: TempDir,
    context: Context,
}

impl TestContext {
    /// # Errors
    /// Fails if the temporary directory cannot be created.
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let context = Self::open(dir.path());
        Ok(Self { dir, context })
    }

    fn open(root: &Path) -> Context {
        Context::from_config(ContextConfig {
            root: root.to_path_buf(),
            durability: Durability::Flush,
        })
    }

    /// Attach an object store to the wrapped context.
    #[must_use]
    pub fn with_object_store(self, object_store: Arc<dyn ObjectStore>) -> Self {
        Self {
            context: self.context.with_object_store(object_store),
            dir: self.dir,
        }
    }

    #[must_use]
    pub const fn context(&self) -> &Context {
        &self.context
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// A new context over the same root, sharing nothing in memory with the first.
    ///
    /// The object store, if any, is carried over.
    #[must_use]
    pub fn reopen(&self) -> Context {
        let fresh = Self::open(self.dir.path());
        match self.context.object_store() {
            Some(store) => fresh.with_object_store(Arc::clone(store)),
            None => fresh,
        }
    }
}

impl std::ops::Deref for TestContext {
    type Target = Context;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

impl AsRef<Context> for TestContext {
    fn as_ref(&self) -> &Context {
        &self.context
    }
}
