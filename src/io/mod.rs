//! Dump file I/O: compression codecs, naming and discovery, and the rotating
//! writer and sequential reader.

pub mod compression;
pub mod naming;
pub mod reader;
pub mod writer;
