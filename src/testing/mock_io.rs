//! File helpers for dump tests.
//!
//! Inputs are written into temporary directories; produced dumps can be read
//! back whole, decompressed, or split into raw frame lengths to check the file
//! layout.

use crate::config::DumpConfig;
use crate::io::compression::resolve_codec;
use crate::io::reader::{for_each, for_each_with_config};
use crate::record::Record;
use crate::varint::read_varint32;
use anyhow::{Context, Result, ensure};
use std::fmt::Debug;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary directory that is removed when dropped.
pub struct TempDirPath {
    temp_dir: TempDir,
}

impl TempDirPath {
    /// Create a new temporary directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Path of `filename` inside the directory. The file is not created.
    #[must_use]
    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.temp_dir.path().join(filename)
    }
}

/// Write `lines` to `dir/name`, each followed by `\n`.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_tsv<S: AsRef<str>>(dir: &Path, name: &str, lines: &[S]) -> io::Result<PathBuf> {
    let mut text = String::new();
    for line in lines {
        text.push_str(line.as_ref());
        text.push('\n');
    }
    write_bytes(dir, name, text.as_bytes())
}

/// Write `bytes` verbatim to `dir/name`.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_bytes(dir: &Path, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
    let path = dir.join(name);
    let mut f = File::create(&path)?;
    f.write_all(bytes)?;
    f.flush()?;
    Ok(path)
}

/// Every record of `files`, cloned out of the reader's reused instance.
///
/// # Errors
///
/// Returns an error if any file cannot be read or decoded.
pub fn read_dump<R, P>(files: &[P]) -> Result<Vec<R>>
where
    R: Record + Clone,
    P: AsRef<Path>,
{
    let mut records = Vec::new();
    for_each(files, |r: &R| records.push(r.clone()))?;
    Ok(records)
}

/// [`read_dump`] for dumps written with `config`, so a codec chosen by name
/// is used for reading too.
///
/// # Errors
///
/// Returns an error if any file cannot be read or decoded.
pub fn read_dump_with<R, P>(files: &[P], config: &DumpConfig) -> Result<Vec<R>>
where
    R: Record + Clone,
    P: AsRef<Path>,
{
    let mut records = Vec::new();
    for_each_with_config(files, config, |r: &R| records.push(r.clone()))?;
    Ok(records)
}

/// Decompressed contents of one dump file, using the codec its extension
/// selects.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or decompressed.
pub fn decompress_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let codec = resolve_codec(None, path)?;
    let mut bytes = Vec::new();
    codec
        .wrap_reader_dyn(Box::new(f))
        .with_context(|| format!("wrap reader with {} codec", codec.name()))?
        .read_to_end(&mut bytes)
        .with_context(|| format!("decompress {}", path.display()))?;
    Ok(bytes)
}

/// Length prefixes of every frame in decompressed dump bytes, the sentinel
/// included, in order.
///
/// # Errors
///
/// Returns an error if a prefix is malformed or a payload is truncated.
pub fn frame_lengths(mut bytes: &[u8]) -> Result<Vec<u32>> {
    let mut lengths = Vec::new();
    while let Some(len) = read_varint32(&mut bytes).context("frame length")? {
        ensure!(
            len as usize <= bytes.len(),
            "frame of {len} bytes overruns the {} remaining",
            bytes.len()
        );
        bytes = &bytes[len as usize..];
        lengths.push(len);
    }
    Ok(lengths)
}

/// Assert that `files` decode to exactly `expected`, in order.
///
/// # Panics
///
/// Panics if the dump cannot be read or differs from `expected`.
pub fn assert_dump_equals<R, P>(files: &[P], expected: &[R])
where
    R: Record + Clone + Debug + PartialEq,
    P: AsRef<Path>,
{
    let actual: Vec<R> = match read_dump(files) {
        Ok(records) => records,
        Err(e) => panic!("failed to read dump: {e:#}"),
    };

    assert_eq!(
        actual.len(),
        expected.len(),
        "dump record count mismatch:\n  Expected: {} records\n  Actual: {} records",
        expected.len(),
        actual.len()
    );

    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert_eq!(a, e, "dump record mismatch at index {i}:\n  Expected: {e:?}\n  Actual: {a:?}");
    }
}
