//! Assertions over [`Staged`] collections and stage files.

use crate::collection::Staged;
use crate::error::StageError;
use crate::io::{Codec, StageStats};
use crate::context::Context;
use std::fmt::Debug;

/// Assert that `actual` holds exactly `expected`, in order.
///
/// # Panics
///
/// Panics on any difference in keys, values or order.
///
/// ```
/// use stagecache::Context;
/// use stagecache::testing::assert_staged_eq;
///
/// let ctx = Context::new("unused");
/// let rows = ctx.create([("a".to_string(), 1), ("b".to_string(), 2)]);
/// assert_staged_eq(&rows, &[("a", 1), ("b", 2)]);
/// ```
pub fn assert_staged_eq<T: Debug + PartialEq>(actual: &Staged<T>, expected: &[(&str, T)]) {
    let actual: Vec<(&str, &T)> = actual.iter().collect();
    let expected: Vec<(&str, &T)> = expected.iter().map(|(k, v)| (*k, v)).collect();
    assert_eq!(
        actual.len(),
        expected.len(),
        "Collection length mismatch:\n  Expected: {expected:?}\n  Actual: {actual:?}"
    );
    for (i, (a, e)) in actual.iter().zip(&expected).enumerate() {
        assert_eq!(
            a, e,
            "Collection mismatch at index {i}:\n  Expected: {e:?}\n  Actual: {a:?}\n  Full expected: {expected:?}\n  Full actual: {actual:?}"
        );
    }
}

/// Assert the key order of a collection.
///
/// # Panics
///
/// Panics if the keys differ from `expected`.
pub fn assert_keys<T>(actual: &Staged<T>, expected: &[&str]) {
    let keys: Vec<&str> = actual.keys().collect();
    assert_eq!(keys, expected, "Key order mismatch");
}

/// Record-level stats of a stage file, panicking if it is missing or unreadable.
///
/// # Panics
///
/// Panics if the stage has no backing file or cannot be read.
#[must_use]
pub fn stage_stats(ctx: &Context, stage: &str, codec: Codec) -> StageStats {
    match ctx.store().stat(stage, codec) {
        Ok(Some(stats)) => stats,
        Ok(None) => panic!("stage `{stage}` ({codec}) has no backing file"),
        Err(e) => panic!("cannot stat stage `{stage}` ({codec}): {e}"),
    }
}

/// Assert that a stage file holds exactly `records` complete records.
///
/// # Panics
///
/// Panics if the stage is missing or holds a different number of records.
pub fn assert_persisted(ctx: &Context, stage: &str, codec: Codec, records: usize) {
    let stats = stage_stats(ctx, stage, codec);
    assert_eq!(
        stats.records, records,
        "Stage `{stage}` record count mismatch: {stats:?}"
    );
}

/// Unwrap the error of a failed stage call and return the caller's original error.
///
/// # Panics
///
/// Panics if `result` is `Ok`, is not a [`StageError::UserFunction`], or wraps an
/// error of another type.
pub fn expect_user_error<T: Debug, E>(result: crate::Result<T>) -> E
where
    E: std::error::Error + Send + Sync + 'static,
{
    match result {
        Ok(v) => panic!("expected a user function error, got Ok({v:?})"),
        Err(StageError::UserFunction { source, .. }) => match source.downcast::<E>() {
            Ok(e) => e,
            Err(other) => panic!("user function error has an unexpected type: {other:#}"),
        },
        Err(other) => panic!("expected a user function error, got {other}"),
    }
}
