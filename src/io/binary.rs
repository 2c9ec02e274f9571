//! Opaque binary records: postcard-encoded `{key, value}` pairs with COBS framing.
//!
//! COBS removes every zero byte from the payload, so a single `0x00` terminates each
//! record and a torn write is recognizable as a frame with no terminator. Postcard is
//! not self-describing: value types that rely on `deserialize_any` (untagged enums,
//! `serde_json::Value`) are refused with [`StageError::UnsupportedValueType`].

use crate::error::{Result, StageError};
use crate::io::Codec;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Serialize)]
struct RecordRef<'a, T> {
    key: &'a str,
    value: &'a T,
}

#[derive(Deserialize)]
struct Record<T> {
    key: String,
    value: T,
}

const fn unsupported(e: &postcard::Error) -> bool {
    matches!(
        e,
        postcard::Error::WontImplement
            | postcard::Error::NotYetImplemented
            | postcard::Error::SerializeSeqLengthUnknown
    )
}

/// Encode `(key, value)` as one zero-terminated COBS frame.
pub(crate) fn encode_record<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>> {
    postcard::to_allocvec_cobs(&RecordRef { key, value }).map_err(|e| {
        StageError::UnsupportedValueType {
            codec: Codec::Binary,
            message: e.to_string(),
        }
    })
}

/// Decode one frame in place. The frame includes its zero terminator.
pub(crate) fn decode_record<T: DeserializeOwned>(
    frame: &mut [u8],
    path: &Path,
    record: usize,
) -> Result<(String, T)> {
    let decoded: Record<T> = postcard::from_bytes_cobs(frame).map_err(|e| {
        if unsupported(&e) {
            StageError::UnsupportedValueType {
                codec: Codec::Binary,
                message: e.to_string(),
            }
        } else {
            StageError::MalformedRecord {
                path: path.to_path_buf(),
                record,
                message: e.to_string(),
            }
        }
    })?;
    if decoded.key.is_empty() {
        return Err(StageError::MalformedRecord {
            path: path.to_path_buf(),
            record,
            message: "empty key".to_string(),
        });
    }
    Ok((decoded.key, decoded.value))
}
