//! Uploading and downloading stage files.

use anyhow::Result;
use stagecache::io::cloud::*;
use stagecache::testing::*;
use stagecache::{Codec, StageError};
use std::path::Path;
use std::sync::Arc;

fn uri(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[test]
fn local_upload_then_download_moves_the_file() -> Result<()> {
    let exported = tempfile::tempdir()?;
    let file = exported.path().join("rows.jsonl");

    let producer = TestContext::new()?;
    producer
        .create(numbered_rows(3))
        .upload(&uri(&file), Codec::Jsonl)?;
    assert!(file.is_file());

    let consumer = TestContext::new()?;
    let rows = consumer.download::<Row>("rows", &uri(&file), Codec::Jsonl)?;
    assert_keys(&rows, &["row1", "row2", "row3"]);
    assert!(!file.exists());
    assert!(consumer.stage_path("rows", Codec::Jsonl)?.is_file());
    Ok(())
}

#[test]
fn file_scheme_is_local() -> Result<()> {
    let exported = tempfile::tempdir()?;
    let file = exported.path().join("rows.jsonl");
    let t = TestContext::new()?;
    t.create(numbered_rows(1))
        .upload(&format!("file://{}", uri(&file)), Codec::Jsonl)?;
    assert!(file.is_file());
    Ok(())
}

#[test]
fn upload_replaces_previous_contents() -> Result<()> {
    let exported = tempfile::tempdir()?;
    let file = exported.path().join("rows.jsonl");
    let t = TestContext::new()?;
    t.create(numbered_rows(3)).upload(&uri(&file), Codec::Jsonl)?;
    t.create(numbered_rows(1)).upload(&uri(&file), Codec::Jsonl)?;

    let rows = t.download::<Row>("rows", &uri(&file), Codec::Jsonl)?;
    assert_eq!(rows.len(), 1);
    Ok(())
}

#[test]
fn download_prefers_existing_local_stage() -> Result<()> {
    let exported = tempfile::tempdir()?;
    let file = exported.path().join("rows.jsonl");
    let t = TestContext::new()?;
    t.create(numbered_rows(3)).upload(&uri(&file), Codec::Jsonl)?;
    t.init("rows", Codec::Jsonl, || numbered_rows(1))?;

    let rows = t.download::<Row>("rows", &uri(&file), Codec::Jsonl)?;
    assert_eq!(rows.len(), 1);
    assert!(file.is_file());
    Ok(())
}

#[test]
fn download_of_missing_local_file_fails() -> Result<()> {
    let t = TestContext::new()?;
    let missing = t.root().join("elsewhere").join("nope.jsonl");
    let err = t
        .download::<Row>("rows", &uri(&missing), Codec::Jsonl)
        .unwrap_err();
    assert!(matches!(err, StageError::Transfer { .. }), "{err}");
    Ok(())
}

#[test]
fn object_store_round_trip() -> Result<()> {
    let store = Arc::new(FakeObjectStore::new());

    let producer = TestContext::new()?.with_object_store(store.clone());
    let scored = producer
        .create(numbered_rows(2))
        .map("scored", Codec::Jsonl, |_, r| Row::new(r.value + 40))?;
    scored.upload("s3://bucket/exports/scored.jsonl", Codec::Jsonl)?;
    assert!(store.object_exists("bucket", "exports/scored.jsonl")?);
    assert_eq!(store.len(), 1);

    let consumer = TestContext::new()?.with_object_store(store.clone());
    let rows =
        consumer.download::<Row>("scored", "s3://bucket/exports/scored.jsonl", Codec::Jsonl)?;
    assert_staged_eq(&rows, &[("row1", Row::new(41)), ("row2", Row::new(42))]);

    let calls = CallCounter::new();
    let c = calls.clone();
    let resumed = consumer
        .reopen()
        .create(numbered_rows(2))
        .map("scored", Codec::Jsonl, |_, r| {
            c.tick();
            *r
        })?;
    assert_eq!(calls.get(), 0);
    assert_eq!(resumed.get(), rows.get());
    Ok(())
}

#[test]
fn missing_object_is_a_transfer_error() -> Result<()> {
    let t = TestContext::new()?.with_object_store(Arc::new(FakeObjectStore::new()));
    let err = t
        .download::<Row>("rows", "gs://bucket/rows.jsonl", Codec::Jsonl)
        .unwrap_err();
    match err {
        StageError::Transfer {
            source: Some(source),
            ..
        } => assert_eq!(source.kind, ErrorKind::NotFound),
        other => panic!("unexpected error {other}"),
    }
    assert!(t.store().stat("rows", Codec::Jsonl)?.is_none());
    Ok(())
}

/// Reports success without producing anything.
struct SilentStore;

impl ObjectStore for SilentStore {
    fn put_object(&self, _: &str, _: &str, _: &[u8]) -> ObjectStoreResult<()> {
        Ok(())
    }

    fn get_object(&self, _: &str, _: &str) -> ObjectStoreResult<Vec<u8>> {
        Ok(Vec::new())
    }

    fn object_exists(&self, _: &str, _: &str) -> ObjectStoreResult<bool> {
        Ok(true)
    }

    fn delete_object(&self, _: &str, _: &str) -> ObjectStoreResult<()> {
        Ok(())
    }

    fn download_file(&self, _: &str, _: &str, _: &Path) -> ObjectStoreResult<()> {
        Ok(())
    }
}

#[test]
fn download_that_produces_no_file_fails() -> Result<()> {
    let t = TestContext::new()?.with_object_store(Arc::new(SilentStore));
    let err = t
        .download::<Row>("rows", "s3://bucket/rows.jsonl", Codec::Jsonl)
        .unwrap_err();
    assert!(matches!(err, StageError::Transfer { source: None, .. }), "{err}");
    Ok(())
}

/// Writes the first half of the object, then loses the connection.
struct FlakyStore(FakeObjectStore);

impl ObjectStore for FlakyStore {
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> ObjectStoreResult<()> {
        self.0.put_object(bucket, key, data)
    }

    fn get_object(&self, bucket: &str, key: &str) -> ObjectStoreResult<Vec<u8>> {
        self.0.get_object(bucket, key)
    }

    fn object_exists(&self, bucket: &str, key: &str) -> ObjectStoreResult<bool> {
        self.0.object_exists(bucket, key)
    }

    fn delete_object(&self, bucket: &str, key: &str) -> ObjectStoreResult<()> {
        self.0.delete_object(bucket, key)
    }

    fn download_file(&self, bucket: &str, key: &str, path: &Path) -> ObjectStoreResult<()> {
        let data = self.0.get_object(bucket, key)?;
        std::fs::write(path, &data[..data.len() / 2])
            .map_err(|e| ObjectStoreError::new(ErrorKind::Io, e.to_string()))?;
        Err(ObjectStoreError::new(ErrorKind::Network, "connection reset"))
    }
}

#[test]
fn interrupted_download_leaves_no_partial_stage() -> Result<()> {
    let fake = FakeObjectStore::new();
    let producer = TestContext::new()?.with_object_store(Arc::new(fake.clone()));
    producer
        .create(numbered_rows(4))
        .upload("s3://bucket/rows.jsonl", Codec::Jsonl)?;

    let t = TestContext::new()?.with_object_store(Arc::new(FlakyStore(fake)));
    for _ in 0..2 {
        let err = t
            .download::<Row>("rows", "s3://bucket/rows.jsonl", Codec::Jsonl)
            .unwrap_err();
        match err {
            StageError::Transfer {
                source: Some(source),
                ..
            } => assert_eq!(source.kind, ErrorKind::Network),
            other => panic!("unexpected error {other}"),
        }
        assert!(t.store().stat("rows", Codec::Jsonl)?.is_none());
        assert_eq!(std::fs::read_dir(t.root())?.count(), 0);
    }
    Ok(())
}

#[test]
fn object_uri_without_store_fails() -> Result<()> {
    let t = TestContext::new()?;
    let err = t
        .create(numbered_rows(1))
        .upload("s3://bucket/rows.jsonl", Codec::Jsonl)
        .unwrap_err();
    assert!(matches!(err, StageError::Transfer { .. }), "{err}");
    Ok(())
}

#[test]
fn unsupported_scheme_is_rejected_before_any_io() -> Result<()> {
    let t = TestContext::new()?;
    let err = t
        .create(numbered_rows(1))
        .upload("ftp://host/rows.jsonl", Codec::Jsonl)
        .unwrap_err();
    assert!(matches!(err, StageError::UnsupportedScheme { ref scheme, .. } if scheme == "ftp"));

    let err = t
        .download::<Row>("rows", "http://host/rows.jsonl", Codec::Jsonl)
        .unwrap_err();
    assert!(matches!(err, StageError::UnsupportedScheme { .. }));
    assert!(t.stages()?.is_empty());
    Ok(())
}

#[cfg(feature = "codec-binary")]
#[test]
fn binary_upload_through_object_store() -> Result<()> {
    let store = Arc::new(FakeObjectStore::new());
    let t = TestContext::new()?.with_object_store(store.clone());
    t.create(numbered_rows(2))
        .map("values", Codec::Binary, |_, r| r.value)?
        .upload("gs://b/values.bin", Codec::Binary)?;

    let bytes = store.get_object("b", "values.bin")?;
    assert_eq!(bytes.iter().filter(|b| **b == 0).count(), 2);

    let other = TestContext::new()?.with_object_store(store);
    let values = other.download::<i64>("values", "gs://b/values.bin", Codec::Binary)?;
    assert_eq!(values.get(), vec![1, 2]);
    Ok(())
}
