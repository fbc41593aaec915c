//! Pluggable compression for dump files and text inputs.
//!
//! Every dump file is one compressed stream. The codec used for writing is
//! chosen by name, or detected from the dump suffix, and dump readers resolve
//! it the same way. Only text inputs are sniffed for magic bytes, and only a
//! complete stream header counts as a match.
//!
//! ## Built-in Codecs
//!
//! - **None** (`none`) - passthrough, always available
//! - **Gzip** (`.gz`, `.gzip`, `.bgz`) - via `flate2` (feature: `compression-gzip`)
//! - **Zstd** (`.zst`) - via `zstd` (feature: `compression-zstd`)
//! - **Bzip2** (`.bz2`) - via `bzip2` (feature: `compression-bzip2`)
//! - **Xz** (`.xz`) - via `xz2` (feature: `compression-xz`)
//!
//! ## Custom codecs
//!
//! ```
//! use std::io::{Read, Write};
//! use std::sync::Arc;
//! use tsvdump::io::compression::{codec_by_name, register_codec, CompressionCodec, FinishWrite};
//!
//! struct Plain;
//!
//! impl CompressionCodec for Plain {
//!     fn name(&self) -> &str { "plain" }
//!     fn extensions(&self) -> &[&str] { &[".plain"] }
//!     fn magic_bytes(&self) -> Option<&[u8]> { None }
//!     fn wrap_reader_dyn(&self, r: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> { Ok(r) }
//!     fn wrap_writer_dyn(&self, w: Box<dyn Write>) -> std::io::Result<Box<dyn FinishWrite>> {
//!         Ok(Box::new(std::io::BufWriter::new(w)))
//!     }
//! }
//!
//! register_codec(Arc::new(Plain));
//! assert!(codec_by_name("plain").is_some());
//! ```
//!
//! ## Finishing streams
//!
//! Compressed formats carry trailers, so writers are [`FinishWrite`]: dropping
//! one without [`FinishWrite::finish`] may leave a truncated file.

use anyhow::{Context, Result, anyhow};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

/// Global codec registry for pluggable compression support.
static CODEC_REGISTRY: RwLock<Option<Vec<Arc<dyn CompressionCodec>>>> = RwLock::new(None);

/// Codec used when neither a name nor a recognized suffix selects one.
#[cfg(feature = "compression-gzip")]
pub const DEFAULT_CODEC: &str = "gzip";
#[cfg(not(feature = "compression-gzip"))]
pub const DEFAULT_CODEC: &str = "none";

fn init_registry() -> Vec<Arc<dyn CompressionCodec>> {
    vec![
        Arc::new(NoneCodec),
        #[cfg(feature = "compression-gzip")]
        Arc::new(GzipCodec),
        #[cfg(feature = "compression-zstd")]
        Arc::new(ZstdCodec),
        #[cfg(feature = "compression-bzip2")]
        Arc::new(Bzip2Codec),
        #[cfg(feature = "compression-xz")]
        Arc::new(XzCodec),
    ]
}

fn get_registry() -> Vec<Arc<dyn CompressionCodec>> {
    let mut lock = CODEC_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(init_registry).clone()
}

/// Register a custom compression codec globally.
///
/// Later registrations are consulted after the built-in codecs.
pub fn register_codec(codec: Arc<dyn CompressionCodec>) {
    let mut lock = CODEC_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(init_registry).push(codec);
}

/// A writer whose stream must be explicitly completed.
pub trait FinishWrite: Write {
    /// Write any trailer, flush everything down to the underlying writer and
    /// release it.
    ///
    /// # Errors
    /// Propagates failures from the compressor or the underlying writer.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

impl<W: Write> FinishWrite for BufWriter<W> {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.flush()
    }
}

/// Pluggable compression codec trait.
///
/// Implementations must be `Send + Sync` as they're stored in a global
/// registry.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip", "zstd").
    fn name(&self) -> &str;

    /// File extensions associated with this codec (e.g., `&[".gz", ".gzip"]`).
    ///
    /// Extensions should include the leading dot and be lowercase.
    fn extensions(&self) -> &[&str];

    /// Optional magic byte signature for content-based detection.
    fn magic_bytes(&self) -> Option<&[u8]>;

    /// Whether `head`, the first bytes of a stream, starts with this codec's
    /// header. Defaults to a prefix match on [`magic_bytes`](Self::magic_bytes).
    fn matches_magic(&self, head: &[u8]) -> bool {
        self.magic_bytes().is_some_and(|magic| head.starts_with(magic))
    }

    /// Wrap a reader with decompression.
    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>>;

    /// Wrap a writer with compression.
    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> io::Result<Box<dyn FinishWrite>>;
}

/// Look up a registered codec by name (case-insensitive).
#[must_use]
pub fn codec_by_name(name: &str) -> Option<Arc<dyn CompressionCodec>> {
    get_registry()
        .into_iter()
        .find(|codec| codec.name().eq_ignore_ascii_case(name))
}

/// Detect compression codec from file path extension.
///
/// Matching is case-insensitive and handles multiple extensions (e.g., `.tsv.gz`).
#[must_use]
pub fn detect_from_extension(path: impl AsRef<Path>) -> Option<Arc<dyn CompressionCodec>> {
    let path_str = path.as_ref().to_string_lossy().to_lowercase();
    get_registry().into_iter().find(|codec| {
        codec
            .extensions()
            .iter()
            .any(|ext| path_str.ends_with(ext))
    })
}

/// Peek at the start of `reader` for a registered magic number.
fn detect_from_magic<R: BufRead>(reader: &mut R) -> Option<Arc<dyn CompressionCodec>> {
    let buf = reader.fill_buf().ok()?;
    if buf.is_empty() {
        return None;
    }
    get_registry().into_iter().find(|codec| codec.matches_magic(buf))
}

/// Pick the codec of a dump file: by `name` when given, otherwise by the
/// extension of `path_hint`, otherwise [`DEFAULT_CODEC`].
///
/// Writers and readers both resolve through here, so a dump written without
/// a codec name reads back without one.
///
/// # Errors
/// Returns an error if `name` is not a registered codec.
pub fn resolve_codec(
    name: Option<&str>,
    path_hint: impl AsRef<Path>,
) -> Result<Arc<dyn CompressionCodec>> {
    if let Some(name) = name {
        return codec_by_name(name).ok_or_else(|| anyhow!("unknown compression codec: {name}"));
    }
    if let Some(codec) = detect_from_extension(&path_hint) {
        return Ok(codec);
    }
    codec_by_name(DEFAULT_CODEC).ok_or_else(|| anyhow!("default codec {DEFAULT_CODEC} is not registered"))
}

/// Automatically detect and wrap a text input with decompression if needed.
///
/// Detection strategy:
/// 1. Check file path extension
/// 2. Fall back to magic byte detection
/// 3. Return the buffered reader as-is if no compression is detected
///
/// # Errors
/// Returns an error if the detected codec fails to initialize.
pub fn auto_detect_reader<R: Read + 'static>(
    reader: R,
    path_hint: impl AsRef<Path>,
) -> Result<Box<dyn Read>> {
    if let Some(codec) = detect_from_extension(&path_hint) {
        return codec
            .wrap_reader_dyn(Box::new(reader))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }

    let mut buf_reader = BufReader::new(reader);
    if let Some(codec) = detect_from_magic(&mut buf_reader) {
        return codec
            .wrap_reader_dyn(Box::new(buf_reader))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }

    Ok(Box::new(buf_reader))
}

// ============================================================================
// Built-in Codec Implementations
// ============================================================================

struct NoneCodec;

impl CompressionCodec for NoneCodec {
    fn name(&self) -> &str {
        "none"
    }

    fn extensions(&self) -> &[&str] {
        &[]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        None
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>> {
        Ok(reader)
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> io::Result<Box<dyn FinishWrite>> {
        Ok(Box::new(BufWriter::new(writer)))
    }
}

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl FinishWrite for flate2::write::GzEncoder<Box<dyn Write>> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        flate2::write::GzEncoder::finish(*self)?.flush()
    }
}

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip", ".bgz"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        // ID1 ID2 and CM=deflate, the only method gzip defines.
        Some(&[0x1f, 0x8b, 0x08])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>> {
        use flate2::read::MultiGzDecoder;
        Ok(Box::new(MultiGzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> io::Result<Box<dyn FinishWrite>> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        Ok(Box::new(GzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl FinishWrite for zstd::stream::write::Encoder<'static, Box<dyn Write>> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        zstd::stream::write::Encoder::finish(*self)?.flush()
    }
}

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read>)
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> io::Result<Box<dyn FinishWrite>> {
        zstd::stream::write::Encoder::new(writer, 3).map(|e| Box::new(e) as Box<dyn FinishWrite>)
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl FinishWrite for bzip2::write::BzEncoder<Box<dyn Write>> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        bzip2::write::BzEncoder::finish(*self)?.flush()
    }
}

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &str {
        "bzip2"
    }

    fn extensions(&self) -> &[&str] {
        &[".bz2", ".bzip2"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&b"BZh"[..])
    }

    /// `BZh`, a block size digit, then a block or end-of-stream signature.
    fn matches_magic(&self, head: &[u8]) -> bool {
        const BLOCK: &[u8] = &[0x31, 0x41, 0x59, 0x26, 0x53, 0x59];
        const END_OF_STREAM: &[u8] = &[0x17, 0x72, 0x45, 0x38, 0x50, 0x90];
        match head {
            [b'B', b'Z', b'h', b'1'..=b'9', signature @ ..] => {
                signature.starts_with(BLOCK) || signature.starts_with(END_OF_STREAM)
            }
            _ => false,
        }
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>> {
        use bzip2::read::BzDecoder;
        Ok(Box::new(BzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> io::Result<Box<dyn FinishWrite>> {
        use bzip2::Compression;
        use bzip2::write::BzEncoder;
        Ok(Box::new(BzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl FinishWrite for xz2::write::XzEncoder<Box<dyn Write>> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        xz2::write::XzEncoder::finish(*self)?.flush()
    }
}

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &str {
        "xz"
    }

    fn extensions(&self) -> &[&str] {
        &[".xz"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> io::Result<Box<dyn Read>> {
        use xz2::read::XzDecoder;
        Ok(Box::new(XzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> io::Result<Box<dyn FinishWrite>> {
        use xz2::write::XzEncoder;
        Ok(Box::new(XzEncoder::new(writer, 6)))
    }
}
