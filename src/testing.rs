//! Testing utilities for dump conversion.
//!
//! - [`fixtures`] - a small typed dataset with its TSV rendering and schema
//! - [`mock_io`] - temporary directories, input files and dump inspection
//!
//! ```
//! use tsvdump::*;
//! use tsvdump::testing::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let dir = TempDirPath::new()?;
//! let input = write_tsv(dir.path(), "events.tsv", &sample_event_lines())?;
//!
//! let result = convert(&DumpRequest::new(&input, "gz", 1 << 20), sample_event_schema())?;
//! assert_eq!(result.parsed_count, sample_events().len() as u64);
//!
//! assert_dump_equals(&result.dump_files, &sample_records());
//! # Ok(())
//! # }
//! ```

pub mod fixtures;
pub mod mock_io;

pub use fixtures::*;
pub use mock_io::*;
