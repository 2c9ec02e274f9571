//! # Stagecache
//!
//! **Resumable, key-addressed batch transformations** with on-disk checkpointing.
//!
//! Stagecache targets pipelines where each step is expensive (an API call per item,
//! a model inference, a slow parse) and has to survive interruption. Every named
//! stage appends its results to a file under the context root as they are computed.
//! When the process crashes or is restarted, a stage reloads what it already has and
//! computes only the missing keys.
//!
//! ## Key Features
//!
//! - **Resumable maps** - [`map`](Staged::map), [`try_map`](Staged::try_map) and
//!   [`map_async`](Staged::map_async) persist each result before moving on
//! - **Ordered collections** - outputs follow input order, whatever the order on disk
//! - **In-memory combinators** - join, filter, flat_map, sort, limit, rekey, rekey_and_group
//! - **Two codecs** - schema-checked JSON Lines, and an opaque postcard format
//!   (feature `codec-binary`)
//! - **Crash tolerant files** - torn trailing records are ignored and repaired
//! - **Transfers** - upload and download stage files locally or through an injected
//!   object store
//!
//! ## Quick Start
//!
//! ```
//! use stagecache::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
//! struct Row { value: i64 }
//!
//! # fn main() -> stagecache::Result<()> {
//! # let dir = tempfile::tempdir().unwrap();
//! let ctx = Context::new(dir.path());
//!
//! let rows = ctx.init("rows", Codec::Jsonl, || {
//!     (1..=3).map(|i| (format!("row{i}"), Row { value: i }))
//! })?;
//! let incremented = rows.map("increment", Codec::Jsonl, |_, r| Row { value: r.value + 1 })?;
//! let squared = incremented.map("square", Codec::Jsonl, |_, r| Row { value: r.value * r.value })?;
//!
//! assert_eq!(
//!     squared.get(),
//!     vec![Row { value: 4 }, Row { value: 9 }, Row { value: 16 }]
//! );
//! # Ok(())
//! # }
//! ```
//!
//! Running the same program again reads all three stages back from disk without
//! calling any of the closures.
//!
//! ## Core Concepts
//!
//! ### Context
//!
//! A [`Context`] names the root directory that holds one file per stage, the
//! [`Durability`] of appended records, and optionally an
//! [`ObjectStore`](io::cloud::ObjectStore) for `s3://` and `gs://` locations.
//!
//! ### Staged
//!
//! A [`Staged<T>`] is an ordered mapping from string keys to values. Collections are
//! immutable: every operation returns a new one.
//!
//! ### Stages
//!
//! A stage is identified by its name and [`Codec`] and lives at
//! `<root>/<name>.<ext>`. Reusing a name with a differently shaped input reuses the
//! overlapping keys and ignores the rest.
//!
//! ## Module Overview
//!
//! - [`collection`] - the `Staged` type and its resumable maps
//! - [`helpers`] - non-cached combinators
//! - [`context`] - stage creation, loading and download
//! - [`io`] - codecs, the stage store, object storage
//! - [`transfer`] - location parsing
//! - [`testing`] - temporary contexts and assertions for tests

pub mod collection;
pub mod config;
pub mod context;
pub mod error;
pub mod helpers;
pub mod io;
pub mod testing;
pub mod transfer;

pub use collection::{StageValue, Staged};
pub use config::{ContextConfig, Durability};
pub use context::Context;
pub use error::{Result, StageError};
pub use io::{Codec, StageEntry, StageStats, StageStore, StageWriter};
pub use transfer::Location;

pub use ordered_float::OrderedFloat;
