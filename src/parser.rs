//! Buffered, incremental line and field parser for delimited text.
//!
//! [`FieldParser`] reads its source through one fixed-size buffer, so memory use
//! is bounded by [`ParserConfig::buffer_capacity`] no matter how large the
//! input is. Lines are exposed one at a time; within a line, fields are pulled
//! left to right and converted on demand through [`FromField`].
//!
//! ```
//! use tsvdump::parser::{FieldParser, ParserConfig};
//!
//! let text: &[u8] = b"alice\t31\ttrue\nbob\t27\tfalse\n";
//! let mut p = FieldParser::new(text, ParserConfig::default());
//!
//! assert!(p.advance_line()?);
//! assert_eq!(p.next_field::<&str>()?, "alice");
//! assert_eq!(p.next_field::<i32>()?, 31);
//! assert!(p.next_field::<bool>()?);
//! assert!(!p.has_more_fields());
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! # Buffer management
//!
//! When the current buffer holds no complete line, the unconsumed tail is moved
//! to the front and the rest of the buffer is refilled from the source. A line
//! is therefore always contiguous before it is handed out, regardless of where
//! the physical reads were split. A line that cannot fit in the buffer at all is
//! reported as [`ParseError::LineTooLong`].
//!
//! # View validity
//!
//! Borrowed field values (`&str`, `&[u8]`) and [`Row`] views point into the
//! parser's buffer. They borrow the parser, so the compiler rejects any use
//! after the next [`FieldParser::advance_line`].

use crate::error::{FieldError, ParseError};
use crate::io::compression::auto_detect_reader;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// Default buffer size in bytes; also the longest line the parser accepts.
pub const DEFAULT_BUFFER_CAPACITY: usize = (1 << 14) - 1;

/// Tunables for [`FieldParser`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParserConfig {
    /// Byte separating fields within a line.
    pub delimiter: u8,
    /// Size of the read buffer in bytes.
    pub buffer_capacity: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            delimiter: b'\t',
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

/// Streams lines and fields out of a [`Read`] source from a bounded buffer.
pub struct FieldParser<R> {
    source: R,
    buf: Box<[u8]>,
    /// Start of the unconsumed region.
    head: usize,
    /// End of valid data in `buf`.
    tail: usize,
    line_start: usize,
    line_end: usize,
    /// Field cursor, relative to `line_start`.
    field: usize,
    delimiter: u8,
    bytes_read: u64,
    line_number: u64,
    eof: bool,
}

impl FieldParser<Box<dyn Read>> {
    /// Open a text file for parsing.
    ///
    /// **Compression**: compressed inputs (`.gz`, `.zst`, `.bz2`, `.xz`, or a
    /// complete stream header) are decompressed transparently, and
    /// [`bytes_read`](Self::bytes_read) then counts decompressed bytes.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or its decompressor cannot
    /// be set up.
    pub fn open(path: impl AsRef<Path>, config: ParserConfig) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let source = auto_detect_reader(f, path)
            .with_context(|| format!("setup decompression for {}", path.display()))?;
        Ok(Self::new(source, config))
    }
}

impl<R: Read> FieldParser<R> {
    /// Wrap an arbitrary reader. A zero `buffer_capacity` is raised to one byte.
    pub fn new(source: R, config: ParserConfig) -> Self {
        let capacity = config.buffer_capacity.max(1);
        Self {
            source,
            buf: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            line_start: 0,
            line_end: 0,
            field: 0,
            delimiter: config.delimiter,
            bytes_read: 0,
            line_number: 0,
            eof: false,
        }
    }

    /// Move to the next line. Returns `Ok(false)` once the source is exhausted.
    ///
    /// A final line without a trailing newline is still returned.
    ///
    /// # Errors
    /// Returns [`ParseError::Io`] if the source fails, or
    /// [`ParseError::LineTooLong`] if a line does not fit in the buffer.
    pub fn advance_line(&mut self) -> Result<bool, ParseError> {
        self.line_start = 0;
        self.line_end = 0;
        self.field = 0;

        let mut scan = self.head;
        loop {
            if let Some(offset) = self.buf[scan..self.tail]
                .iter()
                .position(|&b| b == b'\n')
            {
                let end = scan + offset;
                self.expose_line(end);
                self.head = end + 1;
                return Ok(true);
            }

            if self.eof {
                if self.head < self.tail {
                    let end = self.tail;
                    self.expose_line(end);
                    self.head = end;
                    return Ok(true);
                }
                return Ok(false);
            }

            // Everything between head and tail has been scanned already.
            let scanned = self.tail - self.head;
            self.refill()?;
            scan = self.head + scanned;
        }
    }

    fn expose_line(&mut self, end: usize) {
        self.line_start = self.head;
        self.line_end = end;
        self.field = 0;
        self.line_number += 1;
    }

    /// Compact the unconsumed tail to the front and read more data after it.
    fn refill(&mut self) -> Result<(), ParseError> {
        if self.head > 0 {
            self.buf.copy_within(self.head..self.tail, 0);
            self.tail -= self.head;
            self.head = 0;
        }
        if self.tail == self.buf.len() {
            return Err(ParseError::LineTooLong {
                line: self.line_number + 1,
                capacity: self.buf.len(),
            });
        }
        let n = loop {
            match self.source.read(&mut self.buf[self.tail..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        };
        if n == 0 {
            self.eof = true;
        } else {
            self.tail += n;
            self.bytes_read += n as u64;
        }
        Ok(())
    }

    /// Borrow the current line as a [`Row`] sharing this parser's field cursor.
    pub fn row(&mut self) -> Row<'_> {
        Row {
            line: &self.buf[self.line_start..self.line_end],
            cursor: &mut self.field,
            delimiter: self.delimiter,
            number: self.line_number,
        }
    }

    /// True while unconsumed bytes remain in the current line.
    #[must_use]
    pub fn has_more_fields(&self) -> bool {
        self.line_start + self.field < self.line_end
    }

    /// Convert the next field of the current line.
    ///
    /// # Errors
    /// [`FieldError::Missing`] if the line has no fields left,
    /// [`FieldError::Invalid`] if the text does not convert to `T`.
    pub fn next_field<'s, T: FromField<'s>>(&'s mut self) -> Result<T, FieldError> {
        self.row().next_field()
    }

    /// Advance past one field without converting it. Returns `false` if there
    /// was none.
    pub fn skip_field(&mut self) -> bool {
        self.row().skip_field()
    }

    /// Raw bytes of the current line, without the terminator.
    #[must_use]
    pub fn line(&self) -> &[u8] {
        &self.buf[self.line_start..self.line_end]
    }

    /// One-based number of the current line (zero before the first advance).
    #[must_use]
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    /// Cumulative bytes pulled from the source.
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Buffer capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

/// Zero-copy view of the current line with a field cursor.
///
/// A `Row` borrows its [`FieldParser`], so neither it nor any borrowed field
/// value can be kept across the next line advance.
pub struct Row<'a> {
    line: &'a [u8],
    cursor: &'a mut usize,
    delimiter: u8,
    number: u64,
}

impl<'a> Row<'a> {
    /// True while unconsumed bytes remain in the line.
    #[must_use]
    pub fn has_more_fields(&self) -> bool {
        *self.cursor < self.line.len()
    }

    /// Return the next field's raw bytes and move past its delimiter.
    pub fn next_raw(&mut self) -> Option<&'a [u8]> {
        let line = self.line;
        let rest = &line[*self.cursor..];
        if rest.is_empty() {
            return None;
        }
        match rest.iter().position(|&b| b == self.delimiter) {
            Some(i) => {
                *self.cursor += i + 1;
                Some(&rest[..i])
            }
            None => {
                *self.cursor = line.len();
                Some(rest)
            }
        }
    }

    /// Convert the next field.
    ///
    /// # Errors
    /// [`FieldError::Missing`] if no field is left, [`FieldError::Invalid`] if
    /// the conversion fails. A failed conversion still consumes the field.
    pub fn next_field<T: FromField<'a>>(&mut self) -> Result<T, FieldError> {
        let raw = self.next_raw().ok_or(FieldError::Missing)?;
        T::from_field(raw)
    }

    /// Advance past one field. Returns `false` if there was none.
    pub fn skip_field(&mut self) -> bool {
        self.next_raw().is_some()
    }

    /// Unconsumed remainder of the line, delimiters included.
    #[must_use]
    pub fn rest(&self) -> &'a [u8] {
        &self.line[*self.cursor..]
    }

    /// The whole line, regardless of how many fields were consumed.
    #[must_use]
    pub fn line(&self) -> &'a [u8] {
        self.line
    }

    /// One-based line number within the source.
    #[must_use]
    pub fn line_number(&self) -> u64 {
        self.number
    }
}

/// Conversion from a raw field slice to a typed value.
///
/// The set of implementations is closed: strings (owned and borrowed), raw
/// bytes, `bool`, 32/64-bit integers, and 32/64-bit floats.
pub trait FromField<'a>: Sized {
    /// Convert `raw`, which excludes any delimiter.
    ///
    /// # Errors
    /// Returns [`FieldError::Invalid`] when `raw` is not a valid `Self`.
    fn from_field(raw: &'a [u8]) -> Result<Self, FieldError>;
}

impl<'a> FromField<'a> for &'a [u8] {
    fn from_field(raw: &'a [u8]) -> Result<Self, FieldError> {
        Ok(raw)
    }
}

impl<'a> FromField<'a> for &'a str {
    fn from_field(raw: &'a [u8]) -> Result<Self, FieldError> {
        std::str::from_utf8(raw).map_err(|_| FieldError::invalid("utf-8 string", raw))
    }
}

impl FromField<'_> for String {
    fn from_field(raw: &[u8]) -> Result<Self, FieldError> {
        <&str>::from_field(raw).map(str::to_owned)
    }
}

/// Only the exact text `true` is true; anything else is false.
impl FromField<'_> for bool {
    fn from_field(raw: &[u8]) -> Result<Self, FieldError> {
        Ok(raw == b"true")
    }
}

macro_rules! numeric_from_field {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromField<'_> for $ty {
                fn from_field(raw: &[u8]) -> Result<Self, FieldError> {
                    std::str::from_utf8(raw.trim_ascii())
                        .ok()
                        .and_then(|s| s.parse::<$ty>().ok())
                        .ok_or_else(|| FieldError::invalid(stringify!($ty), raw))
                }
            }
        )*
    };
}

numeric_from_field!(i32, i64, u32, u64, f32, f64);
