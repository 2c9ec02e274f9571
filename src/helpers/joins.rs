//! Key-based joins between two [`Staged`] collections.

use crate::collection::Staged;
use indexmap::IndexMap;

impl<T> Staged<T> {
    /// Inner join on key.
    ///
    /// The output holds the keys present in both collections, in `self`'s order, with
    /// `f(key, left, right)` as the value.
    ///
    /// ```
    /// use stagecache::Context;
    ///
    /// let ctx = Context::new("unused");
    /// let left = ctx.create([("a".to_string(), 1), ("b".to_string(), 2)]);
    /// let right = ctx.create([("b".to_string(), 10), ("c".to_string(), 20)]);
    /// let joined = left.join(&right, |_, l, r| l + r);
    /// assert_eq!(joined.keys().collect::<Vec<_>>(), vec!["b"]);
    /// assert_eq!(joined.get(), vec![12]);
    /// ```
    pub fn join<U, O, F>(&self, other: &Staged<U>, mut f: F) -> Staged<O>
    where
        F: FnMut(&str, &T, &U) -> O,
    {
        let mut out = IndexMap::new();
        for (key, left) in &self.values {
            if let Some(right) = other.values.get(key) {
                out.insert(key.clone(), f(key, left, right));
            }
        }
        self.derive(out)
    }
}
