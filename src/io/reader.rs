//! Sequential reader for dump families.
//!
//! Files are opened one at a time in the order given, decompressed, and split
//! back into frames. A zero-length frame, or the end of the stream, ends a file.
//! Each file's codec is resolved the way the writer picks it, never guessed
//! from content.
//! Every frame is decoded into a single reused record, which is lent to the
//! caller until the next frame is read.

use crate::config::DumpConfig;
use crate::io::compression::{CompressionCodec, resolve_codec};
use crate::record::Record;
use crate::varint::read_varint32;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counters and inputs of one [`for_each`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeachResult {
    /// Records delivered to the consumer.
    pub read_count: u64,
    /// Wall time of the whole call.
    pub elapsed: Duration,
    /// Files opened, in order.
    pub read_files: Vec<PathBuf>,
}

struct OpenStream {
    path: PathBuf,
    reader: BufReader<Box<dyn Read>>,
    frames: u64,
}

/// Pull-style reader over a list of dump files.
///
/// ```no_run
/// use tsvdump::io::naming::find_dump_files;
/// use tsvdump::io::reader::DumpReader;
/// use tsvdump::record::Postcard;
///
/// let files = find_dump_files("events", "bgz");
/// let mut reader = DumpReader::<Postcard<(i64, String)>>::new(&files);
/// while let Some(rec) = reader.next_record()? {
///     let (id, kind) = &rec.0;
///     println!("{id} {kind}");
/// }
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct DumpReader<R> {
    files: Vec<PathBuf>,
    next_file: usize,
    codec: Option<Arc<dyn CompressionCodec>>,
    current: Option<OpenStream>,
    record: R,
    scratch: Vec<u8>,
    read_count: u64,
    read_files: Vec<PathBuf>,
}

impl<R: Record> DumpReader<R> {
    /// Read `files` in order, picking each file's codec from its extension,
    /// or [`DEFAULT_CODEC`](crate::io::compression::DEFAULT_CODEC) when the
    /// extension names none.
    pub fn new<P: AsRef<Path>>(files: impl IntoIterator<Item = P>) -> Self {
        Self {
            files: files.into_iter().map(|p| p.as_ref().to_path_buf()).collect(),
            next_file: 0,
            codec: None,
            current: None,
            record: R::default(),
            scratch: Vec::new(),
            read_count: 0,
            read_files: Vec::new(),
        }
    }

    /// Decompress every file with `codec` instead of resolving it per file.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn CompressionCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    fn open_next(&mut self) -> Result<bool> {
        let Some(path) = self.files.get(self.next_file).cloned() else {
            return Ok(false);
        };
        self.next_file += 1;
        let f = File::open(&path).with_context(|| format!("open {}", path.display()))?;
        let codec = match &self.codec {
            Some(codec) => Arc::clone(codec),
            None => resolve_codec(None, &path)?,
        };
        let reader = codec
            .wrap_reader_dyn(Box::new(f))
            .with_context(|| format!("wrap reader with {} codec", codec.name()))?;
        log::debug!("reading dump file {} ({})", path.display(), codec.name());
        self.read_files.push(path.clone());
        self.current = Some(OpenStream {
            path,
            reader: BufReader::new(reader),
            frames: 0,
        });
        Ok(true)
    }

    /// Decode the next record, moving on to the next file as each one ends.
    ///
    /// Returns `Ok(None)` once every file is exhausted.
    ///
    /// # Errors
    /// Returns an error if a file cannot be opened, its first frame length
    /// cannot be read, a payload is truncated, or the record type rejects a
    /// payload.
    pub fn next_record(&mut self) -> Result<Option<&R>> {
        loop {
            if self.current.is_none() && !self.open_next()? {
                return Ok(None);
            }
            let Some(stream) = self.current.as_mut() else {
                continue;
            };

            let len = match read_varint32(&mut stream.reader) {
                Ok(Some(len)) if len > 0 => len,
                Ok(_) => {
                    self.current = None;
                    continue;
                }
                Err(e) if stream.frames == 0 => {
                    return Err(e).with_context(|| {
                        format!("read first frame length from {}", stream.path.display())
                    });
                }
                Err(e) => {
                    log::warn!(
                        "ending {} early: unreadable frame length: {e}",
                        stream.path.display()
                    );
                    self.current = None;
                    continue;
                }
            };

            self.scratch.resize(len as usize, 0);
            stream
                .reader
                .read_exact(&mut self.scratch)
                .with_context(|| format!("read {len} byte frame from {}", stream.path.display()))?;
            self.record.clear();
            self.record
                .decode(&self.scratch)
                .with_context(|| format!("decode frame from {}", stream.path.display()))?;
            stream.frames += 1;
            self.read_count += 1;
            return Ok(Some(&self.record));
        }
    }

    /// Records decoded so far.
    #[must_use]
    pub fn read_count(&self) -> u64 {
        self.read_count
    }

    /// Files opened so far, in order.
    #[must_use]
    pub fn read_files(&self) -> &[PathBuf] {
        &self.read_files
    }
}

/// Decode every record of `files`, in order, and hand each to `consumer`.
///
/// The record passed to `consumer` is reused for the next frame.
///
/// # Errors
/// Returns an error as soon as a file cannot be opened or a frame cannot be
/// decoded; records already delivered stay delivered.
pub fn for_each<R, P, F>(files: &[P], consumer: F) -> Result<ForeachResult>
where
    R: Record,
    P: AsRef<Path>,
    F: FnMut(&R),
{
    drain(DumpReader::new(files), consumer)
}

/// [`for_each`] honoring `config.codec`: when set, every file is decompressed
/// with that codec instead of the one its extension selects.
///
/// # Errors
/// As [`for_each`], plus an unknown codec name.
pub fn for_each_with_config<R, P, F>(
    files: &[P],
    config: &DumpConfig,
    consumer: F,
) -> Result<ForeachResult>
where
    R: Record,
    P: AsRef<Path>,
    F: FnMut(&R),
{
    let mut reader = DumpReader::new(files);
    if let Some(name) = config.codec.as_deref() {
        reader = reader.with_codec(resolve_codec(Some(name), "")?);
    }
    drain(reader, consumer)
}

fn drain<R, F>(mut reader: DumpReader<R>, mut consumer: F) -> Result<ForeachResult>
where
    R: Record,
    F: FnMut(&R),
{
    let started = Instant::now();
    while let Some(record) = reader.next_record()? {
        consumer(record);
    }
    let result = ForeachResult {
        read_count: reader.read_count,
        elapsed: started.elapsed(),
        read_files: reader.read_files,
    };
    log::info!(
        "read {} records from {} file(s) in {:?}",
        result.read_count,
        result.read_files.len(),
        result.elapsed
    );
    Ok(result)
}
