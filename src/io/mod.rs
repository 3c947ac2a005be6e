//! I/O module: compression detection, codec dispatch, and stream adapters
//!
//! The pieces compose in one direction: a [`DataSource`] or [`DataSink`]
//! names where bytes live; [`Format`] detection decides how they are
//! encoded; [`CompressedReader`] / [`CompressedWriter`] install the
//! matching codec; and the [`text`] adapters put line-oriented character
//! access on top.

pub mod bgzf;
pub mod compression;
pub mod format;
pub mod source;
pub mod text;

pub use compression::{CompressedReader, CompressedWriter};
pub use format::Format;
pub use source::{DataSink, DataSource, MMAP_THRESHOLD};
pub use text::{LineReader, LineWriter, TextEncoding, TextSource};
