//! Configuration for dump conversion.
//!
//! [`DumpConfig`] carries the knobs that are not part of a single request:
//! parser delimiter and buffer size, compression codec, and how the rotation
//! threshold is measured. It deserializes from JSON with every field optional:
//!
//! ```
//! use tsvdump::config::{DumpConfig, SizeBasis};
//!
//! let cfg: DumpConfig = serde_json::from_str(r#"{ "delimiter": ",", "size_basis": "compressed" }"#)?;
//! assert_eq!(cfg.delimiter, ',');
//! assert_eq!(cfg.size_basis, SizeBasis::Compressed);
//! assert_eq!(cfg.codec, None);
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::parser::{DEFAULT_BUFFER_CAPACITY, ParserConfig};
use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// What the per-file size threshold is compared against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeBasis {
    /// Framed bytes handed to the compressor (length prefixes plus payloads).
    #[default]
    Uncompressed,
    /// Bytes the compressor has emitted into the file so far. Compressors
    /// buffer internally, so files overshoot the threshold by up to one
    /// compressor block.
    Compressed,
}

/// Conversion settings shared across requests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpConfig {
    /// Field delimiter; must be a single ASCII character.
    pub delimiter: char,
    /// Parser buffer size in bytes, which bounds the longest accepted line.
    pub buffer_capacity: usize,
    /// Compression codec name. `None` picks one from the dump suffix and falls
    /// back to gzip.
    pub codec: Option<String>,
    /// How the rotation threshold is measured.
    pub size_basis: SizeBasis,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            delimiter: '\t',
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            codec: None,
            size_basis: SizeBasis::default(),
        }
    }
}

impl DumpConfig {
    /// Load from a JSON file; missing fields take their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid JSON for
    /// this struct.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        serde_json::from_reader(BufReader::new(f))
            .with_context(|| format!("parse dump config {}", path.display()))
    }

    /// Parser settings derived from this config.
    ///
    /// # Errors
    /// Returns an error if the delimiter is not ASCII or is a newline, or the
    /// buffer capacity is zero.
    pub fn parser_config(&self) -> Result<ParserConfig> {
        ensure!(
            self.delimiter.is_ascii() && self.delimiter != '\n',
            "delimiter must be a single ASCII character other than newline, got {:?}",
            self.delimiter
        );
        ensure!(self.buffer_capacity > 0, "buffer_capacity must be positive");
        Ok(ParserConfig {
            delimiter: self.delimiter as u8,
            buffer_capacity: self.buffer_capacity,
        })
    }
}
