//! Reordering and truncation.

use crate::collection::Staged;

impl<T> Staged<T> {
    /// Stable sort by a derived key.
    ///
    /// `f` runs once per entry. Wrap float scores in
    /// [`OrderedFloat`](crate::OrderedFloat) to sort by them.
    #[must_use]
    pub fn sort<K, F>(self, mut f: F) -> Self
    where
        K: Ord,
        F: FnMut(&str, &T) -> K,
    {
        let Self { values, context } = self;
        let mut entries: Vec<(String, T)> = values.into_iter().collect();
        entries.sort_by_cached_key(|(k, v)| f(k, v));
        Self::new(context, entries.into_iter().collect())
    }

    /// Keep the first `n` entries.
    #[must_use]
    pub fn limit(self, n: usize) -> Self {
        let Self {
            mut values,
            context,
        } = self;
        values.truncate(n);
        Self { values, context }
    }
}
