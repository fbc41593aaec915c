//! Chunked, compressed, size-rotated dump writer.
//!
//! [`convert`] streams a delimited text file through a [`RowMapper`] and writes
//! every produced record as one frame:
//!
//! ```text
//! [varint32 length][length bytes of encoded record]
//! ```
//!
//! Frames go into the current dump file's compression stream. Once the file
//! grows past the request's threshold it is closed with a zero-length sentinel
//! frame and the next file of the family is opened, so a frame never spans two
//! files. [`DumpWriter`] is the rotation layer on its own, for callers that
//! produce payloads some other way.

use crate::config::{DumpConfig, SizeBasis};
use crate::io::compression::{CompressionCodec, FinishWrite, resolve_codec};
use crate::io::naming::{dump_file_path, dump_prefix};
use crate::parser::FieldParser;
use crate::record::Record;
use crate::schema::RowMapper;
use crate::varint::write_varint32;
use anyhow::{Context, Result, anyhow, ensure};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::Cell;
use std::fs::{File, create_dir_all};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One conversion job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DumpRequest {
    /// Delimited text file to convert.
    pub input: PathBuf,
    /// Suffix of the produced files (`<input-stem>.<NN>.<suffix>`).
    pub suffix: String,
    /// A file is rotated once its size exceeds this many bytes.
    pub max_file_size: u64,
    pub config: DumpConfig,
}

impl DumpRequest {
    /// A request with the default [`DumpConfig`].
    pub fn new(input: impl Into<PathBuf>, suffix: impl Into<String>, max_file_size: u64) -> Self {
        Self {
            input: input.into(),
            suffix: suffix.into(),
            max_file_size,
            config: DumpConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: DumpConfig) -> Self {
        self.config = config;
        self
    }
}

/// Counters and outputs of one [`convert`] call.
///
/// Every row lands in exactly one bucket:
/// `total_count == parsed_count + zero_length_count + invalid_length_count + rejected_count`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpResult {
    /// Rows read from the input.
    pub total_count: u64,
    /// Records written.
    pub parsed_count: u64,
    /// Rows whose record encoded to zero bytes.
    pub zero_length_count: u64,
    /// Rows whose record had no valid encoded length.
    pub invalid_length_count: u64,
    /// Rows the mapper declined.
    pub rejected_count: u64,
    /// Bytes pulled from the input source.
    pub total_read: u64,
    /// Wall time of the whole call.
    pub elapsed: Duration,
    /// Produced files, in index order.
    pub dump_files: Vec<PathBuf>,
}

impl DumpResult {
    /// Rows that did not produce a record, for any reason.
    #[must_use]
    pub fn skipped_count(&self) -> u64 {
        self.zero_length_count + self.invalid_length_count + self.rejected_count
    }

    /// The result as a JSON object.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Write the result to `path` as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written to.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let mut w = BufWriter::new(f);
        serde_json::to_writer_pretty(&mut w, self)
            .with_context(|| format!("serialize dump result to {}", path.display()))?;
        w.flush()?;
        Ok(())
    }
}

/// Counts bytes the compressor hands to the file.
struct CountingWriter<W> {
    inner: W,
    count: Rc<Cell<u64>>,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count.set(self.count.get() + n as u64);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct OpenDump {
    sink: Box<dyn FinishWrite>,
    file_bytes: Rc<Cell<u64>>,
    framed_bytes: u64,
    frames: u64,
}

fn last_path(files: &[PathBuf]) -> &Path {
    files.last().map_or(Path::new(""), PathBuf::as_path)
}

/// Writes length-prefixed frames into a rotating family of compressed files.
///
/// Each file ends with exactly one zero-length sentinel frame. Dropping a
/// `DumpWriter` without calling [`finish`](Self::finish) leaves the last file
/// without its sentinel.
pub struct DumpWriter {
    prefix: PathBuf,
    suffix: String,
    max_file_size: u64,
    basis: SizeBasis,
    codec: Arc<dyn CompressionCodec>,
    files: Vec<PathBuf>,
    current: Option<OpenDump>,
}

impl DumpWriter {
    /// Start a dump family and create its first file.
    ///
    /// # Errors
    /// Returns an error if the first file cannot be created.
    pub fn create(
        prefix: impl Into<PathBuf>,
        suffix: impl Into<String>,
        max_file_size: u64,
        codec: Arc<dyn CompressionCodec>,
        basis: SizeBasis,
    ) -> Result<Self> {
        let mut writer = Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
            max_file_size,
            basis,
            codec,
            files: Vec::new(),
            current: None,
        };
        writer.open_next()?;
        Ok(writer)
    }

    fn open_next(&mut self) -> Result<()> {
        let path = dump_file_path(&self.prefix, self.files.len(), &self.suffix);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
        }
        let f = File::create(&path).with_context(|| format!("create {}", path.display()))?;
        let file_bytes = Rc::new(Cell::new(0));
        let counted = CountingWriter {
            inner: BufWriter::new(f),
            count: Rc::clone(&file_bytes),
        };
        let sink = self
            .codec
            .wrap_writer_dyn(Box::new(counted))
            .with_context(|| format!("setup {} compression for {}", self.codec.name(), path.display()))?;
        log::debug!("opened dump file {} ({})", path.display(), self.codec.name());
        self.files.push(path);
        self.current = Some(OpenDump {
            sink,
            file_bytes,
            framed_bytes: 0,
            frames: 0,
        });
        Ok(())
    }

    /// Write one frame, rotating afterwards if the file is over the threshold.
    ///
    /// # Errors
    /// Returns an error if `payload` is empty or longer than `u32::MAX`, if
    /// writing fails, or if the next file cannot be created.
    pub fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        ensure!(!payload.is_empty(), "empty frames are reserved for the end-of-file sentinel");
        let len = u32::try_from(payload.len())
            .map_err(|_| anyhow!("frame of {} bytes exceeds the varint32 length prefix", payload.len()))?;
        let dump = self
            .current
            .as_mut()
            .ok_or_else(|| anyhow!("dump writer is closed"))?;
        let prefix_len = write_varint32(&mut dump.sink, len)
            .and_then(|n| dump.sink.write_all(payload).map(|()| n))
            .with_context(|| format!("write frame to {}", last_path(&self.files).display()))?;
        dump.framed_bytes += (prefix_len + payload.len()) as u64;
        dump.frames += 1;

        let size = match self.basis {
            SizeBasis::Compressed => dump.file_bytes.get(),
            SizeBasis::Uncompressed => dump.framed_bytes,
        };
        if size > self.max_file_size {
            self.close_current()?;
            self.open_next()?;
        }
        Ok(())
    }

    /// Write the sentinel and finish the open file's compression stream.
    fn close_current(&mut self) -> Result<()> {
        let Some(mut dump) = self.current.take() else {
            return Ok(());
        };
        let path = last_path(&self.files);
        write_varint32(&mut dump.sink, 0)
            .and_then(|_| dump.sink.finish())
            .with_context(|| format!("finish {}", path.display()))?;
        log::debug!(
            "closed dump file {} ({} records, {} framed bytes, {} file bytes)",
            path.display(),
            dump.frames,
            dump.framed_bytes,
            dump.file_bytes.get()
        );
        Ok(())
    }

    /// Files created so far, in index order.
    #[must_use]
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Close the last file and return every file of the family.
    ///
    /// # Errors
    /// Returns an error if the last file cannot be completed.
    pub fn finish(mut self) -> Result<Vec<PathBuf>> {
        self.close_current()?;
        Ok(std::mem::take(&mut self.files))
    }
}

/// Convert the delimited text file `request.input` into a dump family.
///
/// Each row is offered to `mapper` with a cleared record. Rows that are
/// declined, encode to zero bytes, or have no valid encoded length are counted
/// and skipped; they never fail the call. Files are named
/// `<input-stem>.<NN>.<suffix>` next to the input.
///
/// ```no_run
/// use serde::{Deserialize, Serialize};
/// use tsvdump::io::writer::{convert, DumpRequest};
/// use tsvdump::record::Postcard;
/// use tsvdump::schema::Schema;
///
/// #[derive(Default, Serialize, Deserialize)]
/// struct Event { id: i64, kind: String }
///
/// let schema = Schema::<Postcard<Event>>::new()
///     .required("id", |e, v: i64| e.id = v)
///     .required("kind", |e, v: String| e.kind = v);
///
/// let result = convert(&DumpRequest::new("events.tsv", "bgz", 64 << 20), schema)?;
/// println!("{} of {} rows written to {:?}", result.parsed_count, result.total_count, result.dump_files);
/// # Ok::<(), anyhow::Error>(())
/// ```
///
/// # Errors
/// Returns an error if the config is invalid, the input cannot be opened or
/// read (including a line longer than the parser buffer), or any dump file
/// cannot be created or written.
pub fn convert<R, M>(request: &DumpRequest, mut mapper: M) -> Result<DumpResult>
where
    R: Record,
    M: RowMapper<R>,
{
    let started = Instant::now();
    let input = &request.input;
    let mut parser = FieldParser::open(input, request.config.parser_config()?)?;

    let prefix = dump_prefix(input);
    let codec = resolve_codec(
        request.config.codec.as_deref(),
        dump_file_path(&prefix, 0, &request.suffix),
    )?;
    let mut writer = DumpWriter::create(
        prefix,
        request.suffix.as_str(),
        request.max_file_size,
        codec,
        request.config.size_basis,
    )?;

    let mut result = DumpResult::default();
    let mut record = R::default();
    let mut scratch = Vec::new();

    while parser
        .advance_line()
        .with_context(|| format!("read {}", input.display()))?
    {
        result.total_count += 1;
        record.clear();
        if !mapper.map_row(&mut parser.row(), &mut record) {
            result.rejected_count += 1;
            continue;
        }

        let len = match record.encoded_len() {
            Some(0) => {
                result.zero_length_count += 1;
                continue;
            }
            Some(len) if u32::try_from(len).is_ok() => len,
            _ => {
                result.invalid_length_count += 1;
                continue;
            }
        };

        scratch.resize(len, 0);
        if let Err(e) = record.encode(&mut scratch) {
            log::warn!("line {}: record encoding failed: {e:#}", parser.line_number());
            result.invalid_length_count += 1;
            continue;
        }
        writer.write_frame(&scratch)?;
        result.parsed_count += 1;
    }

    result.dump_files = writer.finish()?;
    result.total_read = parser.bytes_read();
    result.elapsed = started.elapsed();

    log::info!(
        "converted {}: {} rows, {} written, {} zero-length, {} invalid, {} rejected, {} file(s) in {:?}",
        input.display(),
        result.total_count,
        result.parsed_count,
        result.zero_length_count,
        result.invalid_length_count,
        result.rejected_count,
        result.dump_files.len(),
        result.elapsed
    );
    Ok(result)
}
