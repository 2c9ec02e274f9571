//! [`Staged`]: an ordered key→value collection with resumable, disk-checkpointed maps.
//!
//! # Resumable maps
//!
//! [`Staged::map`], [`Staged::try_map`] and [`Staged::map_async`] run one stage:
//!
//! 1. Read whatever the stage file already holds and keep only the keys present in
//!    this collection. Stale keys from a differently shaped input are ignored.
//! 2. Walk this collection in order. Keys already persisted are reused without
//!    calling the function. Every other key is computed and its result appended to
//!    the stage file before the next key starts.
//! 3. Close the file on every exit path. If the function fails, the error is returned
//!    and the records written so far stay on disk; running the same stage again
//!    continues from there.
//!
//! The output follows the input's order, not the order of records on disk. Keys are
//! processed one at a time, in both the blocking and the async variant.

use crate::context::Context;
use crate::error::{Result, StageError};
use crate::io::{Codec, StageWriter};
use crate::transfer::{self, Location};
use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use tracing::{debug, info, warn};

/// Values that can be persisted in a stage.
pub trait StageValue: Serialize + DeserializeOwned {}
impl<T> StageValue for T where T: Serialize + DeserializeOwned {}

/// An ordered mapping from string keys to values, tied to a [`Context`].
///
/// Each derived collection owns its values outright; only the context is shared.
#[derive(Clone, Debug)]
pub struct Staged<T> {
    pub(crate) values: IndexMap<String, T>,
    pub(crate) context: Context,
}

impl<T> Staged<T> {
    pub(crate) const fn new(context: Context, values: IndexMap<String, T>) -> Self {
        Self { values, context }
    }

    /// Same context, new values.
    pub(crate) fn derive<O>(&self, values: IndexMap<String, O>) -> Staged<O> {
        Staged::new(self.context.clone(), values)
    }

    #[must_use]
    pub const fn context(&self) -> &Context {
        &self.context
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn value(&self, key: &str) -> Option<&T> {
        self.values.get(key)
    }

    #[must_use]
    pub const fn as_map(&self) -> &IndexMap<String, T> {
        &self.values
    }

    #[must_use]
    pub fn into_map(self) -> IndexMap<String, T> {
        self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<T> {
        self.values.into_values().collect()
    }

    /// The values in iteration order.
    #[must_use]
    pub fn get(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.values.values().cloned().collect()
    }

    /// Keep entries matching `pred`, preserving order.
    #[must_use]
    pub fn filter<F>(self, mut pred: F) -> Self
    where
        F: FnMut(&str, &T) -> bool,
    {
        let Self {
            mut values,
            context,
        } = self;
        values.retain(|k, v| pred(k, v));
        Self { values, context }
    }

    /// Expand each entry into zero or more entries.
    ///
    /// Outputs follow input order, then the order `f` yields them. A key produced
    /// twice keeps its first position and its last value.
    pub fn flat_map<O, I, F>(&self, mut f: F) -> Staged<O>
    where
        I: IntoIterator<Item = (String, O)>,
        F: FnMut(&str, &T) -> I,
    {
        let mut out = IndexMap::new();
        for (key, value) in &self.values {
            out.extend(f(key, value));
        }
        self.derive(out)
    }
}

impl<T: Serialize> Staged<T> {
    /// Write the collection to a local file or object URI.
    ///
    /// Local files are created or truncated; the full collection is written.
    ///
    /// # Errors
    /// Location, encode, IO and transfer errors.
    pub fn upload(&self, dest: &str, codec: Codec) -> Result<&Self> {
        self.upload_to(&Location::parse(dest)?, codec)
    }

    /// [`upload`](Self::upload) with a parsed location.
    ///
    /// # Errors
    /// See [`upload`](Self::upload).
    pub fn upload_to(&self, dest: &Location, codec: Codec) -> Result<&Self> {
        transfer::publish(&self.context, &self.values, dest, codec)?;
        Ok(self)
    }
}

impl<T> Staged<T> {
    /// Resumable map with an infallible function.
    ///
    /// ```
    /// use stagecache::{Codec, Context};
    /// use serde::{Deserialize, Serialize};
    ///
    /// #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    /// struct Row { value: i64 }
    ///
    /// # fn main() -> stagecache::Result<()> {
    /// let dir = tempfile::tempdir().unwrap();
    /// let ctx = Context::new(dir.path());
    /// let rows = ctx.create([("row1".to_string(), Row { value: 3 })]);
    /// let squared = rows.map("square", Codec::Jsonl, |_, r| Row { value: r.value * r.value })?;
    /// assert_eq!(squared.get(), vec![Row { value: 9 }]);
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// Read, encode and IO errors. See the [module docs](self) for the algorithm.
    pub fn map<O, F>(&self, stage: &str, codec: Codec, mut f: F) -> Result<Staged<O>>
    where
        O: StageValue,
        F: FnMut(&str, &T) -> O,
    {
        self.try_map(stage, codec, |k, v| Ok::<_, std::convert::Infallible>(f(k, v)))
    }

    /// Resumable map with a fallible function.
    ///
    /// # Errors
    /// [`StageError::UserFunction`] wrapping the first error returned by `f`; earlier
    /// results are already persisted. Also read, encode and IO errors.
    pub fn try_map<O, E, F>(&self, stage: &str, codec: Codec, mut f: F) -> Result<Staged<O>>
    where
        O: StageValue,
        E: Into<anyhow::Error>,
        F: FnMut(&str, &T) -> Result<O, E>,
    {
        let mut run = StageRun::begin(self, stage, codec)?;
        for (key, value) in &self.values {
            if run.is_done(key) {
                continue;
            }
            let out = f(key, value).map_err(|e| run.fail(key, e.into()))?;
            run.record(key, out)?;
        }
        run.finish(self)
    }

    /// Resumable map whose function suspends, e.g. on a network call.
    ///
    /// Exactly one call is in flight at a time. If the returned future is dropped
    /// midway, the stage file is closed with every finished record intact.
    ///
    /// # Errors
    /// Same as [`try_map`](Self::try_map).
    pub async fn map_async<O, E, Fut, F>(
        &self,
        stage: &str,
        codec: Codec,
        mut f: F,
    ) -> Result<Staged<O>>
    where
        T: Clone,
        O: StageValue,
        E: Into<anyhow::Error>,
        Fut: Future<Output = Result<O, E>>,
        F: FnMut(String, T) -> Fut,
    {
        let mut run = StageRun::begin(self, stage, codec)?;
        for (key, value) in &self.values {
            if run.is_done(key) {
                continue;
            }
            let out = f(key.clone(), value.clone())
                .await
                .map_err(|e| run.fail(key, e.into()))?;
            run.record(key, out)?;
        }
        run.finish(self)
    }
}

/// One execution of a resumable stage.
struct StageRun<'a, O> {
    stage: &'a str,
    cached: IndexMap<String, O>,
    computed: HashMap<String, O>,
    writer: StageWriter<O>,
}

impl<'a, O: StageValue> StageRun<'a, O> {
    fn begin<T>(input: &Staged<T>, stage: &'a str, codec: Codec) -> Result<Self> {
        let store = input.context.store();
        let mut cached = store.read::<O>(stage, codec)?.unwrap_or_default();
        let on_disk = cached.len();
        cached.retain(|k, _| input.values.contains_key(k));
        let stale = on_disk - cached.len();
        if stale > 0 {
            debug!(stage, stale, "ignoring persisted keys missing from the input");
        }
        let writer = store.create_writer::<O>(stage, codec)?;
        info!(
            stage,
            total = input.len(),
            cached = cached.len(),
            "running stage"
        );
        Ok(Self {
            stage,
            cached,
            computed: HashMap::new(),
            writer,
        })
    }

    fn is_done(&self, key: &str) -> bool {
        self.cached.contains_key(key)
    }

    fn record(&mut self, key: &str, value: O) -> Result<()> {
        self.writer.write(key, &value)?;
        self.computed.insert(key.to_string(), value);
        Ok(())
    }

    fn fail(&self, key: &str, source: anyhow::Error) -> StageError {
        warn!(
            stage = self.stage,
            key,
            persisted = self.cached.len() + self.computed.len(),
            error = %source,
            "stage function failed, progress kept"
        );
        StageError::UserFunction {
            stage: self.stage.to_string(),
            key: key.to_string(),
            source,
        }
    }

    fn finish<T>(mut self, input: &Staged<T>) -> Result<Staged<O>> {
        self.writer.close()?;
        info!(
            stage = self.stage,
            computed = self.computed.len(),
            reused = self.cached.len(),
            "stage complete"
        );
        let mut out = IndexMap::with_capacity(input.len());
        for key in input.values.keys() {
            let value = self
                .cached
                .swap_remove(key)
                .or_else(|| self.computed.remove(key));
            if let Some(value) = value {
                out.insert(key.clone(), value);
            }
        }
        Ok(input.derive(out))
    }
}
