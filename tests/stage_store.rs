//! On-disk stage files: torn tails, duplicates, malformed records, listing.

use anyhow::Result;
use stagecache::testing::*;
use stagecache::{Codec, StageError};
use std::fs;
use std::io::Write;

fn line(key: &str, value: i64) -> String {
    format!("{{\"key\":\"{key}\",\"value\":{{\"value\":{value}}}}}\n")
}

#[test]
fn torn_tail_is_ignored_then_trimmed_before_append() -> Result<()> {
    let t = TestContext::new()?;
    let path = t.stage_path("double", Codec::Jsonl)?;
    fs::write(&path, format!("{}{{\"key\":\"row2\",\"val", line("row1", 2)))?;

    let stats = stage_stats(&t, "double", Codec::Jsonl);
    assert_eq!(stats.records, 1);
    assert!(stats.torn_bytes > 0);
    assert_staged_eq(&t.load::<Row>("double", Codec::Jsonl)?, &[("row1", Row::new(2))]);

    let calls = CallCounter::new();
    let c = calls.clone();
    let doubled = t.create(numbered_rows(3)).map("double", Codec::Jsonl, |_, r| {
        c.tick();
        Row::new(r.value * 2)
    })?;

    assert_eq!(calls.get(), 2);
    assert_eq!(doubled.get(), vec![Row::new(2), Row::new(4), Row::new(6)]);
    let stats = stage_stats(&t, "double", Codec::Jsonl);
    assert_eq!(stats.records, 3);
    assert_eq!(stats.torn_bytes, 0);
    assert_eq!(
        fs::read_to_string(&path)?,
        [line("row1", 2), line("row2", 4), line("row3", 6)].concat()
    );
    Ok(())
}

#[test]
fn first_duplicate_wins_on_read() -> Result<()> {
    let t = TestContext::new()?;
    fs::write(
        t.stage_path("dupes", Codec::Jsonl)?,
        [line("a", 1), line("b", 2), line("a", 99)].concat(),
    )?;
    let loaded = t.load::<Row>("dupes", Codec::Jsonl)?;
    assert_staged_eq(&loaded, &[("a", Row::new(1)), ("b", Row::new(2))]);
    Ok(())
}

#[test]
fn blank_lines_are_skipped() -> Result<()> {
    let t = TestContext::new()?;
    fs::write(
        t.stage_path("gaps", Codec::Jsonl)?,
        format!("{}\n  \n{}", line("a", 1), line("b", 2)),
    )?;
    assert_keys(&t.load::<Row>("gaps", Codec::Jsonl)?, &["a", "b"]);
    Ok(())
}

#[test]
fn complete_garbage_record_is_fatal() -> Result<()> {
    let t = TestContext::new()?;
    fs::write(
        t.stage_path("broken", Codec::Jsonl)?,
        format!("{}not json at all\n", line("a", 1)),
    )?;
    let err = t.load::<Row>("broken", Codec::Jsonl).unwrap_err();
    assert!(matches!(err, StageError::MalformedRecord { record: 2, .. }), "{err}");
    Ok(())
}

#[test]
fn envelope_problems_are_malformed() -> Result<()> {
    let t = TestContext::new()?;
    for (i, bad) in [
        "{\"value\":{\"value\":1}}",
        "{\"key\":\"\",\"value\":{\"value\":1}}",
        "{\"key\":7,\"value\":{\"value\":1}}",
        "{\"key\":\"a\",\"value\":{\"value\":1},\"extra\":true}",
        "[1,2]",
    ]
    .iter()
    .enumerate()
    {
        let stage = format!("bad{i}");
        fs::write(t.stage_path(&stage, Codec::Jsonl)?, format!("{bad}\n"))?;
        let err = t.load::<Row>(&stage, Codec::Jsonl).unwrap_err();
        assert!(matches!(err, StageError::MalformedRecord { .. }), "{bad}: {err}");
    }
    Ok(())
}

#[test]
fn value_with_wrong_fields_is_schema_mismatch() -> Result<()> {
    let t = TestContext::new()?;
    fs::write(
        t.stage_path("other", Codec::Jsonl)?,
        "{\"key\":\"a\",\"value\":{\"score\":0.5}}\n",
    )?;
    let err = t.load::<Row>("other", Codec::Jsonl).unwrap_err();
    assert!(matches!(err, StageError::SchemaMismatch { record: 1, .. }), "{err}");
    Ok(())
}

#[test]
fn jsonl_rejects_plain_values_before_any_work() -> Result<()> {
    let t = TestContext::new()?;
    let calls = CallCounter::new();
    let c = calls.clone();
    let err = t
        .create([("a".to_string(), 5_i64), ("b".to_string(), 6)])
        .map("plain", Codec::Jsonl, |_, v| {
            c.tick();
            *v
        })
        .unwrap_err();
    assert!(
        matches!(err, StageError::UnsupportedValueType { codec: Codec::Jsonl, .. }),
        "{err}"
    );
    assert_eq!(calls.get(), 0);
    assert!(t.store().stat("plain", Codec::Jsonl)?.is_none());

    let err = t.load::<i64>("plain", Codec::Jsonl).unwrap_err();
    assert!(matches!(err, StageError::UnsupportedValueType { .. }), "{err}");
    Ok(())
}

#[test]
fn jsonl_rejects_plain_values_on_init_and_upload() -> Result<()> {
    let t = TestContext::new()?;
    let calls = CallCounter::new();
    let c = calls.clone();
    let err = t
        .init("words", Codec::Jsonl, || {
            c.tick();
            vec![("a".to_string(), "alpha".to_string())]
        })
        .unwrap_err();
    assert!(matches!(err, StageError::UnsupportedValueType { .. }), "{err}");
    assert_eq!(calls.get(), 0);

    let exported = tempfile::tempdir()?;
    let dest = exported.path().join("words.jsonl");
    let err = t
        .create([("a".to_string(), vec![1, 2])])
        .upload(&dest.to_string_lossy(), Codec::Jsonl)
        .unwrap_err();
    assert!(matches!(err, StageError::UnsupportedValueType { .. }), "{err}");
    assert!(!dest.exists());
    assert!(t.stages()?.is_empty());
    Ok(())
}

#[test]
fn writer_rejects_bad_keys_and_writes_after_close() -> Result<()> {
    let t = TestContext::new()?;
    let mut writer = t.store().create_writer::<Row>("manual", Codec::Jsonl)?;
    writer.write("a", &Row::new(1))?;

    let dup = writer.write("a", &Row::new(2)).unwrap_err();
    assert!(matches!(dup, StageError::MalformedRecord { .. }));
    let empty = writer.write("", &Row::new(3)).unwrap_err();
    assert!(matches!(empty, StageError::MalformedRecord { .. }));

    writer.close()?;
    writer.close()?;
    assert!(writer.is_closed());
    let closed = writer.write("b", &Row::new(4)).unwrap_err();
    assert!(matches!(closed, StageError::WriterClosed { .. }));

    assert_eq!(writer.written(), 1);
    assert_persisted(&t, "manual", Codec::Jsonl, 1);
    Ok(())
}

#[test]
fn dropped_writer_keeps_written_records() -> Result<()> {
    let t = TestContext::new()?;
    {
        let mut writer = t.store().create_writer::<Row>("dropped", Codec::Jsonl)?;
        writer.write("a", &Row::new(1))?;
        writer.write("b", &Row::new(2))?;
    }
    let mut file = fs::OpenOptions::new()
        .append(true)
        .open(t.stage_path("dropped", Codec::Jsonl)?)?;
    file.write_all(b"{\"key\":\"c\"")?;

    assert_keys(&t.load::<Row>("dropped", Codec::Jsonl)?, &["a", "b"]);
    Ok(())
}

#[test]
fn invalid_stage_names_are_rejected() -> Result<()> {
    let t = TestContext::new()?;
    for name in ["", "../escape", "a/b", ".hidden", "nul\0byte"] {
        let err = t.load::<Row>(name, Codec::Jsonl).unwrap_err();
        assert!(matches!(err, StageError::InvalidStageName { .. }), "{name:?}");
    }
    assert!(matches!(
        t.stage_path(&"x".repeat(201), Codec::Jsonl),
        Err(StageError::InvalidStageName { .. })
    ));
    Ok(())
}

#[test]
fn stages_lists_files_by_name() -> Result<()> {
    let t = TestContext::new()?;
    assert!(t.stages()?.is_empty());

    t.init("zeta", Codec::Jsonl, || numbered_rows(1))?;
    t.init("alpha", Codec::Jsonl, || numbered_rows(2))?;
    fs::write(t.root().join("notes.txt"), "not a stage")?;

    let names: Vec<_> = t.stages()?.into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["alpha", "zeta"]);
    Ok(())
}

#[test]
fn torn_tail_longer_than_a_read_chunk_is_trimmed() -> Result<()> {
    let t = TestContext::new()?;
    let path = t.stage_path("long", Codec::Jsonl)?;
    fs::write(&path, format!("{}{}", line("row1", 1), "x".repeat(100_000)))?;

    let mut writer = t.store().create_writer::<Row>("long", Codec::Jsonl)?;
    writer.write("row2", &Row::new(2))?;
    writer.close()?;

    assert_eq!(
        fs::read_to_string(&path)?,
        [line("row1", 1), line("row2", 2)].concat()
    );
    Ok(())
}

#[test]
fn stat_of_missing_stage_is_none() -> Result<()> {
    let t = TestContext::new()?;
    assert!(t.store().stat("missing", Codec::Jsonl)?.is_none());
    Ok(())
}

#[test]
fn codec_extensions() {
    assert_eq!(Codec::Jsonl.extension(), "jsonl");
    assert_eq!(Codec::from_extension("JSONL"), Some(Codec::Jsonl));
    assert_eq!(Codec::from_extension("csv"), None);
}

#[cfg(feature = "codec-binary")]
mod binary {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum Label {
        Spam,
        Ham { confidence: f64 },
    }

    #[test]
    fn opaque_values_round_trip_through_a_stage() -> Result<()> {
        let t = TestContext::new()?;
        let rows = t.create(numbered_rows(3));
        let labels = rows.map("labels", Codec::Binary, |_, r| {
            let mut m = BTreeMap::new();
            m.insert(
                r.value,
                if r.value % 2 == 0 {
                    Label::Spam
                } else {
                    Label::Ham { confidence: 0.5 }
                },
            );
            m
        })?;

        let loaded = t.reopen().load::<BTreeMap<i64, Label>>("labels", Codec::Binary)?;
        assert_eq!(loaded.as_map(), labels.as_map());
        assert_eq!(Codec::from_extension("bin"), Some(Codec::Binary));
        Ok(())
    }

    #[test]
    fn binary_torn_tail_is_trimmed() -> Result<()> {
        let t = TestContext::new()?;
        let rows = t.create(numbered_rows(2));
        rows.map("bin", Codec::Binary, |_, r| r.value)?;

        let path = t.stage_path("bin", Codec::Binary)?;
        let mut file = fs::OpenOptions::new().append(true).open(&path)?;
        file.write_all(&[3, 1, 2])?;
        drop(file);
        assert_eq!(stage_stats(&t, "bin", Codec::Binary).torn_bytes, 3);

        let calls = CallCounter::new();
        let c = calls.clone();
        let out = t.create(numbered_rows(3)).map("bin", Codec::Binary, |_, r| {
            c.tick();
            r.value
        })?;
        assert_eq!(calls.get(), 1);
        assert_eq!(out.get(), vec![1, 2, 3]);
        let stats = stage_stats(&t, "bin", Codec::Binary);
        assert_eq!((stats.records, stats.torn_bytes), (3, 0));
        Ok(())
    }

    #[test]
    fn self_describing_values_are_unsupported() -> Result<()> {
        let t = TestContext::new()?;
        let mut writer = t.store().create_writer::<i64>("n", Codec::Binary)?;
        writer.write("a", &1)?;
        writer.close()?;

        let err = t.load::<serde_json::Value>("n", Codec::Binary).unwrap_err();
        assert!(
            matches!(err, StageError::UnsupportedValueType { .. }),
            "{err}"
        );

        let calls = CallCounter::new();
        let c = calls.clone();
        let err = t
            .create(numbered_rows(2))
            .map("json", Codec::Binary, |_, r| {
                c.tick();
                serde_json::json!({ "value": r.value })
            })
            .unwrap_err();
        assert!(
            matches!(err, StageError::UnsupportedValueType { .. }),
            "{err}"
        );
        assert_eq!(calls.get(), 0);
        assert!(t.store().stat("json", Codec::Binary)?.is_none());
        Ok(())
    }
}
