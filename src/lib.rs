//! biostream: transparent compressed stream I/O for bioinformatics pipelines
//!
//! # Overview
//!
//! Sequencing data arrives in whatever container the upstream tool chose:
//! plain text, gzip, block-gzip (BGZF), bzip2, xz, or zstd — frequently
//! with a filename that disagrees with the content. biostream resolves the
//! actual format from the stream itself and hands back ordinary `Read`,
//! `Write`, and line-iterator handles, so pipeline code never branches on
//! compression.
//!
//! ## Key features
//!
//! - **Content-first detection**: magic-byte sniffing over a bounded,
//!   fully-replayed prefix; filenames are only advisory
//! - **BGZF aware**: distinguishes block-gzip from plain gzip via the
//!   gzip extra-field "BC" subfield, and decodes/encodes blocks in
//!   bounded parallel batches
//! - **Uniform entry points**: file paths, path strings, already-open
//!   streams, and `-`/absent for the standard streams
//! - **Restartable text access**: [`TextSource`] re-runs detection on
//!   every open, so the same value can be read twice
//!
//! ## Quick start
//!
//! ```no_run
//! use biostream::{DataSource, LineReader};
//!
//! # fn main() -> biostream::Result<()> {
//! // Format is detected from content; .gz, .bgz, .bz2, .xz, .zst and
//! // plain files all take this same path.
//! let reader = LineReader::new(DataSource::from_path("variants.vcf.gz"))?;
//!
//! for line in reader {
//!     let line = line?;
//!     // process one line at a time
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module organization
//!
//! - [`io::format`]: format enumeration, magic numbers, suffix table,
//!   and the sniffing machinery
//! - [`io::compression`]: the [`CompressedReader`] / [`CompressedWriter`]
//!   gateway and codec dispatch
//! - [`io::bgzf`]: the BGZF block codec
//! - [`io::source`]: input sources and output sinks
//! - [`io::text`]: line-oriented character adapters
//! - [`error`]: the crate error taxonomy

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod io;

pub use error::{BiostreamError, Result};
pub use io::{
    CompressedReader, CompressedWriter, DataSink, DataSource, Format, LineReader, LineWriter,
    TextEncoding, TextSource,
};
