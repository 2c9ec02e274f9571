//! Ready-made values for stage tests.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A one-field record, storable with every codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Row {
    pub value: i64,
}

impl Row {
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self { value }
    }
}

/// `row1 => Row(1)`, ..., `rowN => Row(N)`.
///
/// ```
/// use stagecache::testing::numbered_rows;
///
/// let rows = numbered_rows(2);
/// assert_eq!(rows[1].0, "row2");
/// assert_eq!(rows[1].1.value, 2);
/// ```
#[must_use]
pub fn numbered_rows(n: usize) -> Vec<(String, Row)> {
    (1..=n)
        .map(|i| (format!("row{i}"), Row::new(i as i64)))
        .collect()
}

/// Shared call counter for checking how often a stage function ran.
#[derive(Clone, Debug, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one call.
    pub fn tick(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    #[must_use]
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}
