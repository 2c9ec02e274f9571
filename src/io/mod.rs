//! Record codecs and the on-disk stage store.
//!
//! A stage is one file under the context root, named `<stage>.<ext>`, holding a
//! sequence of delimited `(key, value)` records:
//!
//! - [`Codec::Jsonl`]: one `{"key": ..., "value": {...}}` object per line. Values must
//!   serialize to JSON objects (records with named fields).
//! - [`Codec::Binary`] (feature `codec-binary`): postcard-encoded `{key, value}` pairs,
//!   each COBS-framed and terminated by a zero byte. Any serde value works as long
//!   as it does not need a self-describing format.
//!
//! A record only counts once its delimiter is on disk. A trailing record without a
//! delimiter is the remains of an interrupted write: readers ignore it and writers
//! trim it before appending.

#[cfg(feature = "codec-binary")]
pub mod binary;
pub mod cloud;
pub mod jsonl;
mod shape;
pub mod store;

pub use store::{StageEntry, StageStats, StageStore, StageWriter};

use crate::error::{Result, StageError};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shape::Shape;
use std::fmt;
use std::path::Path;

/// Encoding used for a stage's backing file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Schema-checked JSON Lines (`.jsonl`).
    Jsonl,
    /// Opaque postcard records (`.bin`).
    #[cfg(feature = "codec-binary")]
    Binary,
}

impl Codec {
    /// Every codec compiled into this build.
    pub const ALL: &'static [Self] = &[
        Self::Jsonl,
        #[cfg(feature = "codec-binary")]
        Self::Binary,
    ];

    /// File extension of stage files written with this codec (without the dot).
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            #[cfg(feature = "codec-binary")]
            Self::Binary => "bin",
        }
    }

    /// Codec owning the given file extension, if any.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.extension().eq_ignore_ascii_case(ext))
    }

    /// Byte terminating every record.
    pub(crate) const fn delimiter(self) -> u8 {
        match self {
            Self::Jsonl => b'\n',
            #[cfg(feature = "codec-binary")]
            Self::Binary => 0,
        }
    }

    /// Encode one record, delimiter included.
    pub(crate) fn encode<T: Serialize>(self, key: &str, value: &T) -> Result<Vec<u8>> {
        match self {
            Self::Jsonl => jsonl::encode_record(key, value),
            #[cfg(feature = "codec-binary")]
            Self::Binary => binary::encode_record(key, value),
        }
    }

    /// Decode one delimited frame. `record` is the 1-based position, for diagnostics.
    pub(crate) fn decode<T: DeserializeOwned>(
        self,
        frame: &mut [u8],
        path: &Path,
        record: usize,
    ) -> Result<(String, T)> {
        match self {
            Self::Jsonl => jsonl::decode_record(frame, path, record),
            #[cfg(feature = "codec-binary")]
            Self::Binary => binary::decode_record(frame, path, record),
        }
    }

    /// Refuse value types this codec can never store, judging from the type alone.
    ///
    /// Runs before any file is opened, so an unusable type fails without I/O and
    /// without calling any user function.
    ///
    /// # Errors
    /// [`StageError::UnsupportedValueType`] for non-record types with
    /// [`Codec::Jsonl`] and self-describing types with the binary codec.
    pub fn check_value_type<T: DeserializeOwned>(self) -> Result<()> {
        let shape = shape::shape_of::<T>();
        let problem = match (self, shape) {
            (Self::Jsonl, Shape::Other(kind)) => {
                format!("expected a record with named fields, got {kind}")
            }
            #[cfg(feature = "codec-binary")]
            (Self::Binary, Shape::SelfDescribing) => {
                "the type needs a self-describing format (deserialize_any)".to_string()
            }
            _ => return Ok(()),
        };
        Err(StageError::UnsupportedValueType {
            codec: self,
            message: format!("{}: {problem}", std::any::type_name::<T>()),
        })
    }

    /// Frames carrying no record at all (blank JSONL lines).
    pub(crate) fn is_blank(self, frame: &[u8]) -> bool {
        match self {
            Self::Jsonl => frame.iter().all(u8::is_ascii_whitespace),
            #[cfg(feature = "codec-binary")]
            Self::Binary => false,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jsonl => f.write_str("jsonl"),
            #[cfg(feature = "codec-binary")]
            Self::Binary => f.write_str("binary"),
        }
    }
}
