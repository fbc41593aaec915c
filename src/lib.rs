//! # tsvdump
//!
//! Streams very large delimited text files (TSV by default) into compact,
//! length-framed binary record dumps, split across a family of compressed files
//! of bounded size, and reads those dumps back record by record.
//!
//! ## Key Features
//!
//! - **Zero-copy field parser** - a fixed buffer, refilled in place; fields are
//!   borrowed slices of the current line
//! - **Typed fields** - integers, floats, booleans, strings and enum tables via
//!   [`FromField`] and [`Schema`]
//! - **Framed dumps** - `[varint32 length][payload]` frames terminated by a
//!   zero-length sentinel in every file
//! - **Size rotation** - a new `<prefix>.<NN>.<suffix>` file once the current one
//!   passes the threshold
//! - **Pluggable compression** - gzip, zstd, bzip2 and xz behind feature flags
//!
//! ## Quick Start
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use tsvdump::*;
//!
//! #[derive(Default, Serialize, Deserialize)]
//! struct Visit { user: String, hits: u32 }
//!
//! # fn main() -> anyhow::Result<()> {
//! let schema = Schema::<Postcard<Visit>>::new()
//!     .required("user", |v, x: String| v.user = x)
//!     .required("hits", |v, x: u32| v.hits = x);
//!
//! // visits.tsv -> visits.00.bgz, visits.01.bgz, ...
//! let written = convert(&DumpRequest::new("visits.tsv", "bgz", 256 << 20), schema)?;
//!
//! let files = find_dump_files("visits", "bgz");
//! let read = for_each(&files, |rec: &Postcard<Visit>| {
//!     println!("{} {}", rec.user, rec.hits);
//! })?;
//! assert_eq!(read.read_count, written.parsed_count);
//! # Ok(())
//! # }
//! ```
//!
//! ## Dump Layout
//!
//! ```text
//! file := frame* sentinel
//! frame := varint32(len > 0) payload[len]
//! sentinel := varint32(0)
//! ```
//!
//! The whole byte stream of a file is wrapped by the selected compression codec.
//! A frame never spans two files.
//!
//! ## Feature Flags
//!
//! - `compression-gzip`, `compression-zstd`, `compression-bzip2`, `compression-xz`
//!   (all on by default)
//! - `diagnostics` - log the raw text of every row a [`Schema`] rejects
//!
//! ## Module Overview
//!
//! - [`parser`] - buffered line and field tokenizer
//! - [`schema`] - declarative row to record mapping
//! - [`record`] - the binary record contract
//! - [`io`] - dump writer, reader, naming and compression
//! - [`varint`] - LEB128 length prefixes
//! - [`config`] - conversion settings
//! - [`testing`] - fixtures for tests

pub mod config;
pub mod error;
pub mod io;
pub mod parser;
pub mod record;
pub mod schema;
pub mod testing;
pub mod varint;

pub use config::{DumpConfig, SizeBasis};
pub use error::{FieldError, ParseError};
pub use io::compression::{CompressionCodec, codec_by_name, register_codec};
pub use io::naming::{dump_file_path, dump_prefix, find_dump_files};
pub use io::reader::{DumpReader, ForeachResult, for_each, for_each_with_config};
pub use io::writer::{DumpRequest, DumpResult, DumpWriter, convert};
pub use parser::{FieldParser, FromField, ParserConfig, Row};
pub use record::{Columns, Postcard, Record};
pub use schema::{EnumTable, Rejection, RowMapper, Schema};
