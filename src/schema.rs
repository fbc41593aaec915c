//! Row-to-record mapping.
//!
//! A [`RowMapper`] fills a record from the current [`Row`] and reports whether
//! the row produced one. Any `FnMut(&mut Row<'_>, &mut R) -> bool` closure is a
//! mapper; [`Schema`] builds one declaratively from field descriptors:
//!
//! ```
//! use std::sync::LazyLock;
//! use tsvdump::parser::{FieldParser, ParserConfig};
//! use tsvdump::schema::{EnumTable, RowMapper, Schema};
//!
//! #[derive(Clone, Copy, Debug, Default, PartialEq)]
//! enum Method { #[default] Get, Post }
//!
//! static METHODS: LazyLock<EnumTable<Method>> =
//!     LazyLock::new(|| EnumTable::new([("GET", Method::Get), ("POST", Method::Post)]));
//!
//! #[derive(Default)]
//! struct Hit { path: String, method: Method, status: i32, referer: Option<String> }
//!
//! let mut schema = Schema::<Hit>::new()
//!     .required("path", |h, v: String| h.path = v)
//!     .required_enum("method", &METHODS, |h, v| h.method = v)
//!     .skip("client_ip")
//!     .required("status", |h, v: i32| h.status = v)
//!     .optional("referer", |h, v: String| h.referer = Some(v));
//!
//! let mut p = FieldParser::new(&b"/a\tPOST\t10.0.0.1\t201\n/b\tGET\n"[..], ParserConfig::default());
//! let mut hit = Hit::default();
//!
//! assert!(p.advance_line()?);
//! assert!(schema.map_row(&mut p.row(), &mut hit));
//! assert_eq!((hit.method, hit.status, hit.referer.as_deref()), (Method::Post, 201, None));
//!
//! assert!(p.advance_line()?);
//! assert!(!schema.map_row(&mut p.row(), &mut Hit::default())); // no status
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::error::FieldError;
use crate::parser::{FromField, Row};
use std::collections::HashMap;

/// Populates a record from one row.
pub trait RowMapper<R> {
    /// Fill `record` from `row`. Returns `false` if the row does not produce a
    /// record; the row is then skipped.
    fn map_row(&mut self, row: &mut Row<'_>, record: &mut R) -> bool;
}

impl<R, F> RowMapper<R> for F
where
    F: FnMut(&mut Row<'_>, &mut R) -> bool,
{
    fn map_row(&mut self, row: &mut Row<'_>, record: &mut R) -> bool {
        self(row, record)
    }
}

/// Whether a schema field must be present.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presence {
    /// Absence or a conversion failure rejects the row.
    Required,
    /// Absence leaves the record untouched; a conversion failure is ignored.
    Optional,
    /// The field is consumed and discarded.
    Ignored,
}

/// Why a [`Schema`] rejected a row.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("field `{field}` rejected: {reason}")]
pub struct Rejection {
    /// Name of the schema field that failed.
    pub field: &'static str,
    /// The underlying field error.
    pub reason: FieldError,
}

type Extract<R> = Box<dyn Fn(&mut Row<'_>, &mut R) -> Result<(), FieldError>>;

struct FieldSpec<R> {
    name: &'static str,
    presence: Presence,
    extract: Extract<R>,
}

/// Ordered list of field descriptors, evaluated left to right against a row.
///
/// Fields after the last descriptor are ignored.
pub struct Schema<R> {
    fields: Vec<FieldSpec<R>>,
}

impl<R: 'static> Default for Schema<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: 'static> Schema<R> {
    #[must_use]
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    fn field<T, F>(mut self, name: &'static str, presence: Presence, set: F) -> Self
    where
        T: for<'a> FromField<'a> + 'static,
        F: Fn(&mut R, T) + 'static,
    {
        self.fields.push(FieldSpec {
            name,
            presence,
            extract: Box::new(move |row, record| {
                set(record, row.next_field::<T>()?);
                Ok(())
            }),
        });
        self
    }

    /// A field that must be present and convert to `T`.
    #[must_use]
    pub fn required<T, F>(self, name: &'static str, set: F) -> Self
    where
        T: for<'a> FromField<'a> + 'static,
        F: Fn(&mut R, T) + 'static,
    {
        self.field(name, Presence::Required, set)
    }

    /// A field that is applied only when present and convertible.
    #[must_use]
    pub fn optional<T, F>(self, name: &'static str, set: F) -> Self
    where
        T: for<'a> FromField<'a> + 'static,
        F: Fn(&mut R, T) + 'static,
    {
        self.field(name, Presence::Optional, set)
    }

    /// A field that is consumed without conversion.
    #[must_use]
    pub fn skip(mut self, name: &'static str) -> Self {
        self.fields.push(FieldSpec {
            name,
            presence: Presence::Ignored,
            extract: Box::new(|row, _| {
                row.skip_field();
                Ok(())
            }),
        });
        self
    }

    fn enum_field<T, F>(
        mut self,
        name: &'static str,
        presence: Presence,
        table: &'static EnumTable<T>,
        set: F,
    ) -> Self
    where
        T: Copy + 'static,
        F: Fn(&mut R, T) + 'static,
    {
        self.fields.push(FieldSpec {
            name,
            presence,
            extract: Box::new(move |row, record| {
                let raw = row.next_field::<&str>()?;
                let value = table
                    .get(raw)
                    .ok_or_else(|| FieldError::invalid("enum value", raw.as_bytes()))?;
                set(record, value);
                Ok(())
            }),
        });
        self
    }

    /// A required field whose text is looked up in `table`. Unknown text
    /// rejects the row.
    #[must_use]
    pub fn required_enum<T, F>(self, name: &'static str, table: &'static EnumTable<T>, set: F) -> Self
    where
        T: Copy + 'static,
        F: Fn(&mut R, T) + 'static,
    {
        self.enum_field(name, Presence::Required, table, set)
    }

    /// An optional field whose text is looked up in `table`.
    #[must_use]
    pub fn optional_enum<T, F>(self, name: &'static str, table: &'static EnumTable<T>, set: F) -> Self
    where
        T: Copy + 'static,
        F: Fn(&mut R, T) + 'static,
    {
        self.enum_field(name, Presence::Optional, table, set)
    }

    /// Number of field descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Descriptor names and presence, in order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, Presence)> + '_ {
        self.fields.iter().map(|f| (f.name, f.presence))
    }

    /// Apply every descriptor to `row`, writing into `record`.
    ///
    /// # Errors
    /// Returns the first [`Rejection`]: a required field that is absent or does
    /// not convert. `record` may be partially filled in that case.
    pub fn decode(&self, row: &mut Row<'_>, record: &mut R) -> Result<(), Rejection> {
        for spec in &self.fields {
            match spec.presence {
                Presence::Required => {
                    if !row.has_more_fields() {
                        return Err(Rejection {
                            field: spec.name,
                            reason: FieldError::Missing,
                        });
                    }
                    (spec.extract)(row, record).map_err(|reason| Rejection {
                        field: spec.name,
                        reason,
                    })?;
                }
                Presence::Optional => {
                    if !row.has_more_fields() {
                        continue;
                    }
                    if let Err(reason) = (spec.extract)(row, record) {
                        log::trace!(
                            "line {}: optional field `{}` ignored: {reason}",
                            row.line_number(),
                            spec.name
                        );
                    }
                }
                Presence::Ignored => {
                    (spec.extract)(row, record)
                        .map_err(|reason| Rejection { field: spec.name, reason })?;
                }
            }
        }
        Ok(())
    }

    fn apply(&self, row: &mut Row<'_>, record: &mut R) -> bool {
        match self.decode(row, record) {
            Ok(()) => true,
            Err(rejection) => {
                report_rejection(row, &rejection);
                false
            }
        }
    }
}

#[cfg(feature = "diagnostics")]
fn report_rejection(row: &Row<'_>, rejection: &Rejection) {
    log::warn!(
        "line {}: {rejection}: {}",
        row.line_number(),
        String::from_utf8_lossy(row.line())
    );
}

#[cfg(not(feature = "diagnostics"))]
fn report_rejection(row: &Row<'_>, rejection: &Rejection) {
    log::trace!("line {}: {rejection}", row.line_number());
}

impl<R: 'static> RowMapper<R> for Schema<R> {
    fn map_row(&mut self, row: &mut Row<'_>, record: &mut R) -> bool {
        self.apply(row, record)
    }
}

impl<R: 'static> RowMapper<R> for &Schema<R> {
    fn map_row(&mut self, row: &mut Row<'_>, record: &mut R) -> bool {
        self.apply(row, record)
    }
}

/// Immutable lookup from field text to an enumerated value.
///
/// Build it once, typically in a `static` [`LazyLock`](std::sync::LazyLock),
/// from an explicit list of pairs. Numeric codes are keyed by their text.
#[derive(Clone, Debug)]
pub struct EnumTable<T> {
    entries: HashMap<&'static str, T>,
}

impl<T: Copy> EnumTable<T> {
    /// Build from `(text, value)` pairs. A repeated text keeps the last value.
    pub fn new(pairs: impl IntoIterator<Item = (&'static str, T)>) -> Self {
        Self {
            entries: pairs.into_iter().collect(),
        }
    }

    /// Value for `text`, if listed.
    #[must_use]
    pub fn get(&self, text: &str) -> Option<T> {
        self.entries.get(text).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
