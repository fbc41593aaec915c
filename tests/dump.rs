//! Integration tests for dump conversion, rotation and read-back.

use anyhow::{Result, anyhow};
use std::fs;
use std::path::PathBuf;
use tsvdump::io::compression::codec_by_name;
use tsvdump::testing::*;
use tsvdump::varint::{MAX_VARINT32_LEN, encode_varint32};
use tsvdump::*;

/// Uncompressed dumps rotated on framed bytes, so file boundaries are exact.
fn plain_config() -> DumpConfig {
    DumpConfig {
        codec: Some("none".to_string()),
        size_basis: SizeBasis::Uncompressed,
        ..DumpConfig::default()
    }
}

fn framed_len(len: u32) -> u64 {
    let mut buf = [0u8; MAX_VARINT32_LEN];
    (encode_varint32(len, &mut buf) as u64) + u64::from(len)
}

fn event_columns(events: &[SampleEvent]) -> Vec<Columns> {
    events
        .iter()
        .map(|e| Columns(e.to_tsv().split('\t').map(str::to_string).collect()))
        .collect()
}

/// Test record whose behavior is driven by the first field of the row.
#[derive(Clone, Debug, Default, PartialEq)]
struct Scripted {
    bytes: Vec<u8>,
    lengthless: bool,
    unencodable: bool,
}

impl Record for Scripted {
    fn encoded_len(&self) -> Option<usize> {
        (!self.lengthless).then_some(self.bytes.len())
    }

    fn encode(&self, buf: &mut [u8]) -> Result<()> {
        if self.unencodable {
            return Err(anyhow!("record refuses to encode"));
        }
        buf.copy_from_slice(&self.bytes);
        Ok(())
    }

    fn decode(&mut self, bytes: &[u8]) -> Result<()> {
        self.bytes = bytes.to_vec();
        Ok(())
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

fn scripted_mapper(row: &mut Row<'_>, record: &mut Scripted) -> bool {
    match row.next_field::<&str>() {
        Ok("reject") => false,
        Ok("unsized") => {
            record.lengthless = true;
            true
        }
        Ok("unencodable") => {
            record.bytes = b"never written".to_vec();
            record.unencodable = true;
            true
        }
        Ok(text) => {
            record.bytes.extend_from_slice(text.as_bytes());
            true
        }
        // Blank line: leave the record empty.
        Err(_) => true,
    }
}

fn scripted(text: &str) -> Scripted {
    Scripted {
        bytes: text.as_bytes().to_vec(),
        ..Scripted::default()
    }
}

#[test]
fn test_three_field_mapper_scenario() -> Result<()> {
    let dir = TempDirPath::new()?;
    let input = write_tsv(dir.path(), "abc.tsv", &["a\tb\tc", "a\tb"])?;

    let schema = Schema::<Columns>::new()
        .required("first", |c, v: String| c.0.push(v))
        .required("second", |c, v: String| c.0.push(v))
        .required("third", |c, v: String| c.0.push(v));
    let result = convert(&DumpRequest::new(&input, "gz", 1 << 20), schema)?;

    assert_eq!(result.total_count, 2);
    assert_eq!(result.parsed_count, 1);
    assert_eq!(result.rejected_count, 1);
    assert_eq!(result.dump_files, vec![dir.file_path("abc.00.gz")]);

    let records: Vec<Columns> = read_dump(&result.dump_files)?;
    assert_eq!(
        records,
        vec![Columns(vec!["a".into(), "b".into(), "c".into()])]
    );
    Ok(())
}

#[test]
fn test_round_trip_sample_events() -> Result<()> {
    let dir = TempDirPath::new()?;
    let input = write_tsv(dir.path(), "events.tsv", &sample_event_lines())?;

    let written = convert(&DumpRequest::new(&input, "bgz", 1 << 20), sample_event_schema())?;
    assert_eq!(written.parsed_count, 5);
    assert_eq!(written.skipped_count(), 0);
    assert_eq!(written.total_read, fs::metadata(&input)?.len());

    assert_dump_equals(&written.dump_files, &sample_records());

    let read = for_each(&written.dump_files, |_: &Postcard<SampleEvent>| {})?;
    assert_eq!(read.read_count, 5);
    assert_eq!(read.read_files, written.dump_files);
    Ok(())
}

#[test]
fn test_counters_partition_rows() -> Result<()> {
    let dir = TempDirPath::new()?;
    let lines = [
        "alpha", "reject", "", "unsized", "beta", "unencodable", "reject", "gamma\tx",
    ];
    let input = write_tsv(dir.path(), "scripted.tsv", &lines)?;

    let result = convert(
        &DumpRequest::new(&input, "dump", 1 << 20).with_config(plain_config()),
        scripted_mapper,
    )?;

    assert_eq!(result.total_count, 8);
    assert_eq!(result.parsed_count, 3);
    assert_eq!(result.zero_length_count, 1);
    assert_eq!(result.invalid_length_count, 2);
    assert_eq!(result.rejected_count, 2);
    assert_eq!(
        result.total_count,
        result.parsed_count + result.skipped_count()
    );

    let records: Vec<Scripted> = read_dump_with(&result.dump_files, &plain_config())?;
    assert_eq!(records, vec![scripted("alpha"), scripted("beta"), scripted("gamma")]);
    Ok(())
}

#[test]
fn test_rotation_never_splits_frames() -> Result<()> {
    let dir = TempDirPath::new()?;
    let events = generated_events(300);
    let lines: Vec<String> = events.iter().map(SampleEvent::to_tsv).collect();
    let input = write_tsv(dir.path(), "clicks.tsv", &lines)?;
    let threshold = 400;

    let result = convert(
        &DumpRequest::new(&input, "dump", threshold).with_config(plain_config()),
        Columns::map_all,
    )?;
    assert_eq!(result.parsed_count, 300);
    assert!(result.dump_files.len() > 5, "{:?}", result.dump_files);
    assert_eq!(find_dump_files(dir.file_path("clicks"), "dump"), result.dump_files);

    let last = result.dump_files.len() - 1;
    for (i, path) in result.dump_files.iter().enumerate() {
        assert_eq!(*path, dump_file_path(dir.file_path("clicks"), i, "dump"));

        let lengths = frame_lengths(&fs::read(path)?)?;
        assert_eq!(lengths.last(), Some(&0), "{} lacks a sentinel", path.display());
        assert_eq!(lengths.iter().filter(|&&l| l == 0).count(), 1);

        let frames = &lengths[..lengths.len() - 1];
        let size: u64 = frames.iter().map(|&l| framed_len(l)).sum();
        if i < last {
            // Closed right after the frame that crossed the threshold.
            let before_last = size - frames.last().map_or(0, |&l| framed_len(l));
            assert!(size > threshold, "file {i} rotated early at {size} bytes");
            assert!(before_last <= threshold, "file {i} rotated late at {size} bytes");
        } else {
            assert!(size <= threshold, "last file holds {size} bytes");
        }
    }

    let records: Vec<Columns> = read_dump_with(&result.dump_files, &plain_config())?;
    assert_eq!(records, event_columns(&events));
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn test_gzip_rotation_round_trip() -> Result<()> {
    let dir = TempDirPath::new()?;
    let events = generated_events(500);
    let lines: Vec<String> = events.iter().map(SampleEvent::to_tsv).collect();
    let input = write_tsv(dir.path(), "clicks.tsv", &lines)?;

    let config = DumpConfig {
        size_basis: SizeBasis::Uncompressed,
        ..DumpConfig::default()
    };
    let result = convert(
        &DumpRequest::new(&input, "gz", 2048).with_config(config),
        Columns::map_all,
    )?;
    assert!(result.dump_files.len() > 1);

    for path in &result.dump_files {
        let bytes = decompress_file(path)?;
        let lengths = frame_lengths(&bytes)?;
        assert_eq!(lengths.last(), Some(&0));
        assert_eq!(lengths.iter().filter(|&&l| l == 0).count(), 1);
    }

    let records: Vec<Columns> = read_dump(&result.dump_files)?;
    assert_eq!(records, event_columns(&events));
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn test_compressed_size_basis_round_trip() -> Result<()> {
    let dir = TempDirPath::new()?;
    let events = generated_events(2000);
    let lines: Vec<String> = events.iter().map(SampleEvent::to_tsv).collect();
    let input = write_tsv(dir.path(), "clicks.tsv", &lines)?;

    let config = DumpConfig {
        size_basis: SizeBasis::Compressed,
        ..DumpConfig::default()
    };
    let result = convert(
        &DumpRequest::new(&input, "gz", 1024).with_config(config),
        Columns::map_all,
    )?;
    assert!(!result.dump_files.is_empty());

    let records: Vec<Columns> = read_dump(&result.dump_files)?;
    assert_eq!(records, event_columns(&events));
    Ok(())
}

#[test]
fn test_uncompressed_dump_starting_like_gzip_reads_back() -> Result<()> {
    let dir = TempDirPath::new()?;
    let name = "x".repeat(28);
    let input = write_tsv(dir.path(), "pairs.tsv", &[format!("-70\t{name}")])?;

    let schema = Schema::<Postcard<(i64, String)>>::new()
        .required("id", |r, v: i64| r.0.0 = v)
        .required("name", |r, v: String| r.0.1 = v);
    let result = convert(
        &DumpRequest::new(&input, "dump", 1 << 20).with_config(plain_config()),
        schema,
    )?;
    assert_eq!(result.parsed_count, 1);

    // A 31 byte frame whose payload opens with zigzag(-70): the gzip magic.
    let stored = fs::read(&result.dump_files[0])?;
    assert_eq!(stored[..3], [0x1f, 0x8b, 0x01]);

    let records: Vec<Postcard<(i64, String)>> =
        read_dump_with(&result.dump_files, &plain_config())?;
    assert_eq!(records, vec![Postcard((-70, name))]);
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn test_reader_fails_when_first_frame_length_is_unreadable() -> Result<()> {
    let dir = TempDirPath::new()?;
    // Plain bytes under a suffix that selects gzip.
    let file = write_bytes(dir.path(), "w.00.gz", &[1, b'a', 0])?;
    let err = for_each(&[&file], |_: &Scripted| {}).unwrap_err();
    assert!(format!("{err:#}").contains("first frame length"), "{err:#}");
    Ok(())
}

#[test]
fn test_map_all_rejects_rows_that_are_not_utf8() -> Result<()> {
    let dir = TempDirPath::new()?;
    let input = write_bytes(dir.path(), "mixed.tsv", b"ok\tfine\nbad\t\xff\xfe\nlast\n")?;

    let result = convert(
        &DumpRequest::new(&input, "dump", 1 << 20).with_config(plain_config()),
        Columns::map_all,
    )?;
    assert_eq!(result.total_count, 3);
    assert_eq!(result.parsed_count, 2);
    assert_eq!(result.rejected_count, 1);

    let records: Vec<Columns> = read_dump_with(&result.dump_files, &plain_config())?;
    assert_eq!(
        records,
        vec![
            Columns(vec!["ok".into(), "fine".into()]),
            Columns(vec!["last".into()])
        ]
    );
    Ok(())
}

#[test]
fn test_writer_trailing_file_holds_only_sentinel() -> Result<()> {
    let dir = TempDirPath::new()?;
    let codec = codec_by_name("none").ok_or_else(|| anyhow!("none codec missing"))?;
    let mut writer = DumpWriter::create(dir.file_path("raw"), "bin", 0, codec, SizeBasis::Uncompressed)?;

    writer.write_frame(b"x")?;
    assert_eq!(writer.files().len(), 2);
    assert!(writer.write_frame(b"").is_err());

    let files = writer.finish()?;
    assert_eq!(files, vec![dir.file_path("raw.00.bin"), dir.file_path("raw.01.bin")]);
    assert_eq!(fs::read(&files[0])?, vec![1, b'x', 0]);
    assert_eq!(fs::read(&files[1])?, vec![0]);

    let records: Vec<Scripted> = read_dump_with(&files, &plain_config())?;
    assert_eq!(records, vec![scripted("x")]);
    Ok(())
}

#[test]
fn test_writer_creates_missing_directories() -> Result<()> {
    let dir = TempDirPath::new()?;
    let codec = codec_by_name("none").ok_or_else(|| anyhow!("none codec missing"))?;
    let prefix = dir.path().join("nested").join("deeper").join("out");
    let writer = DumpWriter::create(&prefix, "bin", 1 << 20, codec, SizeBasis::Uncompressed)?;
    let files = writer.finish()?;
    assert_eq!(files, vec![dump_file_path(&prefix, 0, "bin")]);
    assert_eq!(fs::read(&files[0])?, vec![0]);
    Ok(())
}

#[test]
fn test_discovery_stops_at_first_gap() -> Result<()> {
    let dir = TempDirPath::new()?;
    for i in [0, 1, 3] {
        write_bytes(dir.path(), &format!("log.{i:02}.pb"), &[0])?;
    }
    // Different suffix and different prefix are not part of the family.
    write_bytes(dir.path(), "log.02.gz", &[0])?;
    write_bytes(dir.path(), "logs.02.pb", &[0])?;

    let prefix = dir.file_path("log");
    assert_eq!(
        find_dump_files(&prefix, "pb"),
        vec![dir.file_path("log.00.pb"), dir.file_path("log.01.pb")]
    );
    assert!(find_dump_files(dir.file_path("missing"), "pb").is_empty());
    Ok(())
}

#[test]
fn test_reader_fails_on_missing_file() -> Result<()> {
    let dir = TempDirPath::new()?;
    let present = write_bytes(dir.path(), "a.00.bin", &[1, b'a', 0])?;
    let files = vec![present, dir.file_path("a.01.bin")];

    let mut seen = Vec::new();
    let err = for_each_with_config(&files, &plain_config(), |p: &Scripted| seen.push(p.clone()))
        .unwrap_err();
    assert!(format!("{err:#}").contains("a.01.bin"));
    assert_eq!(seen, vec![scripted("a")]);
    Ok(())
}

#[test]
fn test_reader_ends_file_at_eof_or_bad_length() -> Result<()> {
    let dir = TempDirPath::new()?;
    let files: Vec<PathBuf> = vec![
        // No sentinel: the end of the stream ends the file.
        write_bytes(dir.path(), "r.00.bin", &[1, b'a'])?,
        // Varint that overflows 32 bits ends the file.
        write_bytes(dir.path(), "r.01.bin", &[1, b'b', 0xff, 0xff, 0xff, 0xff, 0x7f])?,
        // Bytes after the sentinel are never read.
        write_bytes(dir.path(), "r.02.bin", &[1, b'c', 0, 1, b'z'])?,
    ];

    let config = plain_config();
    let mut seen = Vec::new();
    let result = for_each_with_config(&files, &config, |p: &Scripted| seen.push(p.clone()))?;
    assert_eq!(seen, vec![scripted("a"), scripted("b"), scripted("c")]);
    assert_eq!(result.read_count, 3);
    assert_eq!(result.read_files, files);
    Ok(())
}

#[test]
fn test_reader_fails_on_truncated_payload() -> Result<()> {
    let dir = TempDirPath::new()?;
    let file = write_bytes(dir.path(), "t.00.bin", &[5, b'a', b'b'])?;
    let err = for_each_with_config(&[file], &plain_config(), |_: &Scripted| {}).unwrap_err();
    assert!(format!("{err:#}").contains("5 byte frame"), "{err:#}");
    Ok(())
}

#[test]
fn test_pull_reader_reuses_record() -> Result<()> {
    let dir = TempDirPath::new()?;
    let files = vec![
        write_bytes(dir.path(), "p.00.bin", &[3, b'o', b'n', b'e', 0])?,
        write_bytes(dir.path(), "p.01.bin", &[0])?,
        write_bytes(dir.path(), "p.02.bin", &[2, b'n', b'o', 0])?,
    ];
    let codec = codec_by_name("none").ok_or_else(|| anyhow!("none codec missing"))?;
    let mut reader = DumpReader::<Scripted>::new(&files).with_codec(codec);

    assert_eq!(reader.next_record()?, Some(&scripted("one")));
    // A shorter payload fully replaces the previous record.
    assert_eq!(reader.next_record()?, Some(&scripted("no")));
    assert_eq!(reader.next_record()?, None);
    assert_eq!(reader.read_count(), 2);
    assert_eq!(reader.read_files(), files.as_slice());
    Ok(())
}

#[test]
fn test_convert_fails_on_line_too_long() -> Result<()> {
    let dir = TempDirPath::new()?;
    let input = write_tsv(dir.path(), "wide.tsv", &["ok", "this line is far too wide"])?;
    let config = DumpConfig {
        buffer_capacity: 8,
        ..plain_config()
    };
    let err = convert(
        &DumpRequest::new(&input, "dump", 1 << 20).with_config(config),
        Columns::map_all,
    )
    .unwrap_err();
    let parse = err.downcast_ref::<ParseError>();
    assert!(
        matches!(parse, Some(ParseError::LineTooLong { line: 2, capacity: 8 })),
        "{err:#}"
    );
    Ok(())
}

#[test]
fn test_convert_fails_on_missing_input() -> Result<()> {
    let dir = TempDirPath::new()?;
    let request = DumpRequest::new(dir.file_path("absent.tsv"), "gz", 1 << 20);
    assert!(convert(&request, Columns::map_all).is_err());
    assert!(find_dump_files(dir.file_path("absent"), "gz").is_empty());
    Ok(())
}

#[test]
fn test_result_json_export() -> Result<()> {
    let dir = TempDirPath::new()?;
    let input = write_tsv(dir.path(), "events.tsv", &sample_event_lines())?;
    let result = convert(&DumpRequest::new(&input, "gz", 1 << 20), sample_event_schema())?;

    let json = result.to_json()?;
    assert_eq!(json["total_count"], 5);
    assert_eq!(json["parsed_count"], 5);

    let path = dir.file_path("result.json");
    result.save_to_file(&path)?;
    let loaded: DumpResult = serde_json::from_str(&fs::read_to_string(&path)?)?;
    assert_eq!(loaded, result);
    Ok(())
}
