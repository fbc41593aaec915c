//! The binary record contract used by the dump writer and reader.
//!
//! A [`Record`] is a reusable, mutable value: the writer fills one instance per
//! row and serializes it, the reader decodes every frame into one instance and
//! lends it to the consumer. Any schema-typed binary format fits as long as it
//! can report its encoded length up front.
//!
//! [`Postcard`] adapts any serde type to the contract using `postcard`;
//! [`Columns`] keeps a row's fields as plain strings.

use crate::parser::Row;
use crate::varint::{MAX_VARINT32_LEN, encode_varint32, read_varint32, write_varint32};
use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::ops::{Deref, DerefMut};

/// A reusable binary record.
pub trait Record: Default {
    /// Length in bytes of the current encoding.
    ///
    /// `Some(0)` means there is nothing to write and the row is skipped.
    /// `None` means the length cannot be computed (the record is invalid) and
    /// the row is skipped as well.
    fn encoded_len(&self) -> Option<usize>;

    /// Serialize into `buf`, which is exactly [`encoded_len`](Self::encoded_len)
    /// bytes long.
    ///
    /// # Errors
    /// Returns an error if the record cannot be serialized.
    fn encode(&self, buf: &mut [u8]) -> Result<()>;

    /// Replace the contents of `self` with the record encoded in `bytes`.
    ///
    /// # Errors
    /// Returns an error if `bytes` is not a valid encoding.
    fn decode(&mut self, bytes: &[u8]) -> Result<()>;

    /// Reset to the empty state for reuse.
    fn clear(&mut self);
}

/// [`Record`] adapter for serde types, encoded with `postcard`.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use tsvdump::record::{Postcard, Record};
///
/// #[derive(Default, Serialize, Deserialize, Debug, PartialEq)]
/// struct Visit { user: String, hits: u32 }
///
/// let mut rec = Postcard(Visit { user: "ann".into(), hits: 3 });
/// let mut buf = vec![0u8; rec.encoded_len().unwrap()];
/// rec.encode(&mut buf)?;
///
/// let mut back = Postcard::<Visit>::default();
/// back.decode(&buf)?;
/// assert_eq!(back.0, rec.0);
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Postcard<T>(pub T);

impl<T> Deref for Postcard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Postcard<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T> Record for Postcard<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    fn encoded_len(&self) -> Option<usize> {
        postcard::serialize_with_flavor(&self.0, postcard::ser_flavors::Size::default()).ok()
    }

    fn encode(&self, buf: &mut [u8]) -> Result<()> {
        let frame_len = buf.len();
        let written = postcard::to_slice(&self.0, buf).context("postcard encode")?;
        anyhow::ensure!(
            written.len() == frame_len,
            "postcard wrote {} bytes into a {frame_len} byte frame",
            written.len()
        );
        Ok(())
    }

    fn decode(&mut self, bytes: &[u8]) -> Result<()> {
        self.0 = postcard::from_bytes(bytes).context("postcard decode")?;
        Ok(())
    }

    fn clear(&mut self) {
        self.0 = T::default();
    }
}

/// A record holding every field of a row as text.
///
/// Each column is encoded as a varint length followed by its UTF-8 bytes. A
/// record with no columns encodes to zero bytes, so blank rows are skipped by
/// the writer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Columns(pub Vec<String>);

impl Columns {
    /// Row mapper that takes every field of the row.
    ///
    /// Declines rows holding a field that is not valid UTF-8, so they are
    /// counted as rejected instead of being stored altered.
    pub fn map_all(row: &mut Row<'_>, record: &mut Self) -> bool {
        while let Some(raw) = row.next_raw() {
            match std::str::from_utf8(raw) {
                Ok(text) => record.0.push(text.to_owned()),
                Err(e) => {
                    log::debug!("column {} is not utf-8: {e}", record.0.len());
                    return false;
                }
            }
        }
        true
    }
}

impl Record for Columns {
    fn encoded_len(&self) -> Option<usize> {
        let mut prefix = [0u8; MAX_VARINT32_LEN];
        self.0.iter().try_fold(0usize, |acc, col| {
            let len = u32::try_from(col.len()).ok()?;
            acc.checked_add(encode_varint32(len, &mut prefix) + col.len())
        })
    }

    fn encode(&self, mut buf: &mut [u8]) -> Result<()> {
        for col in &self.0 {
            let len = u32::try_from(col.len()).context("column longer than u32::MAX")?;
            write_varint32(&mut buf, len).context("column does not fit in frame")?;
            buf.write_all(col.as_bytes())
                .context("column does not fit in frame")?;
        }
        anyhow::ensure!(buf.is_empty(), "{} unused bytes after encoding", buf.len());
        Ok(())
    }

    fn decode(&mut self, mut bytes: &[u8]) -> Result<()> {
        self.0.clear();
        while let Some(len) = read_varint32(&mut bytes).context("column length")? {
            let len = len as usize;
            anyhow::ensure!(len <= bytes.len(), "column of {len} bytes overruns the frame");
            let (col, rest) = bytes.split_at(len);
            self.0.push(String::from_utf8(col.to_vec()).context("column is not utf-8")?);
            bytes = rest;
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}
