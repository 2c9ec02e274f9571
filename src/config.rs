//! Context configuration.

use std::path::PathBuf;

/// How hard each appended record is pushed to storage before `write` returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Durability {
    /// Hand the bytes to the OS. Survives a process crash, not a power loss.
    Flush,
    /// `fsync` the data after every record.
    #[default]
    Sync,
}

/// Configuration for a [`Context`](crate::Context).
///
/// ```
/// use stagecache::{ContextConfig, Durability};
///
/// let config = ContextConfig {
///     root: "./pipeline-stages".into(),
///     durability: Durability::Flush,
/// };
/// assert_eq!(config.root.to_str(), Some("./pipeline-stages"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextConfig {
    /// Directory holding one backing file per stage. Created on first write.
    pub root: PathBuf,
    /// Durability applied to every appended record.
    pub durability: Durability,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./stages"),
            durability: Durability::Sync,
        }
    }
}

impl ContextConfig {
    /// Default configuration rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }
}
