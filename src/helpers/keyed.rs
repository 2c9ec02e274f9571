//! Rekeying combinators.

use crate::collection::Staged;
use indexmap::IndexMap;
use indexmap::map::Entry;

impl<T> Staged<T> {
    /// Replace every key with `f(key, value)`.
    ///
    /// Meant for one-to-one remappings. When two entries map to the same key the
    /// later value replaces the earlier one, which keeps its position. Use
    /// [`rekey_and_group`](Self::rekey_and_group) to keep both.
    #[must_use]
    pub fn rekey<F>(self, mut f: F) -> Self
    where
        F: FnMut(&str, &T) -> String,
    {
        let Self { values, context } = self;
        let mut out = IndexMap::with_capacity(values.len());
        for (key, value) in values {
            let new_key = f(&key, &value);
            out.insert(new_key, value);
        }
        Self::new(context, out)
    }

    /// Replace every key with `f(key, value)` and collect values sharing a new key.
    ///
    /// Groups appear in the order their key is first produced; values within a group
    /// keep input order.
    ///
    /// ```
    /// use stagecache::Context;
    ///
    /// let ctx = Context::new("unused");
    /// let rows = ctx.create((1..=4).map(|i| (format!("row{i}"), i % 2)));
    /// let grouped = rows.rekey_and_group(|_, v| {
    ///     if *v == 0 { "even".into() } else { "odd".into() }
    /// });
    /// assert_eq!(grouped.keys().collect::<Vec<_>>(), vec!["odd", "even"]);
    /// assert_eq!(grouped.get(), vec![vec![1, 1], vec![0, 0]]);
    /// ```
    pub fn rekey_and_group<F>(self, mut f: F) -> Staged<Vec<T>>
    where
        F: FnMut(&str, &T) -> String,
    {
        let Self { values, context } = self;
        let mut out: IndexMap<String, Vec<T>> = IndexMap::new();
        for (key, value) in values {
            match out.entry(f(&key, &value)) {
                Entry::Occupied(mut group) => group.get_mut().push(value),
                Entry::Vacant(slot) => {
                    slot.insert(vec![value]);
                }
            }
        }
        Staged::new(context, out)
    }
}
