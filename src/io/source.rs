//! Input sources and output sinks
//!
//! [`DataSource`] and [`DataSink`] resolve the caller's notion of "where"
//! (a path, a path string, or the `-` standard-stream marker) into an open
//! byte stream, without deciding anything about compression — format
//! resolution belongs to the open path in
//! [`compression`](crate::io::compression).
//!
//! Local files above [`MMAP_THRESHOLD`] are opened memory-mapped with
//! sequential-access hints; smaller files go through a plain `BufReader`,
//! which avoids the mmap setup overhead.

use crate::error::Result;
use crate::io::Format;
use memmap2::Mmap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Memory-mapped file threshold (50 MB)
///
/// Below this size the page-table setup costs more than it saves; above it
/// sequential mmap reads beat buffered `read(2)` on the platforms we care
/// about.
pub const MMAP_THRESHOLD: u64 = 50 * 1024 * 1024;

/// Input source for streaming reads
///
/// Abstracts over local files and standard input so open paths can be
/// source-agnostic. Cloning a `DataSource` clones the *description* only;
/// each [`open`](DataSource::open) allocates fresh transport state, which
/// is what makes factories like [`TextSource`](crate::io::TextSource)
/// restartable.
#[derive(Debug, Clone)]
pub enum DataSource {
    /// Local file path
    Local(PathBuf),

    /// The process's standard input
    Stdin,
}

impl DataSource {
    /// Create a source from a file path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        DataSource::Local(path.as_ref().to_path_buf())
    }

    /// Create a source for standard input
    pub fn stdin() -> Self {
        DataSource::Stdin
    }

    /// Resolve a command-line style argument
    ///
    /// `None` and the literal `-` denote standard input; anything else is
    /// a file path.
    ///
    /// # Example
    ///
    /// ```
    /// use biostream::DataSource;
    ///
    /// assert!(matches!(DataSource::from_arg(None), DataSource::Stdin));
    /// assert!(matches!(DataSource::from_arg(Some("-")), DataSource::Stdin));
    /// assert!(matches!(DataSource::from_arg(Some("in.gz")), DataSource::Local(_)));
    /// ```
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            None | Some("-") => DataSource::Stdin,
            Some(path) => DataSource::from_path(path),
        }
    }

    /// Filename-derived format hint, if this source has a name
    ///
    /// Standard input has no name and always hints [`Format::None`].
    pub(crate) fn format_hint(&self) -> Format {
        match self {
            DataSource::Local(path) => Format::from_path(path),
            DataSource::Stdin => Format::None,
        }
    }

    /// Open the source and return a buffered reader over its raw bytes
    ///
    /// A missing or unreadable file surfaces as an I/O error here, at open
    /// time. No decompression happens at this layer.
    pub fn open(&self) -> Result<Box<dyn BufRead + Send>> {
        match self {
            DataSource::Local(path) => open_local_file(path),
            DataSource::Stdin => Ok(Box::new(BufReader::new(io::stdin()))),
        }
    }
}

/// Open a local file, choosing the I/O method by size
fn open_local_file(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let metadata = std::fs::metadata(path)?;
    if metadata.len() >= MMAP_THRESHOLD {
        open_mmap_file(path)
    } else {
        let file = File::open(path)?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Memory-map a file with sequential-access hints where the platform has them
#[cfg(target_os = "macos")]
fn open_mmap_file(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    use libc::{madvise, MADV_SEQUENTIAL, MADV_WILLNEED};

    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };

    unsafe {
        madvise(
            mmap.as_ptr() as *mut _,
            mmap.len(),
            MADV_SEQUENTIAL | MADV_WILLNEED,
        );
    }

    Ok(Box::new(io::Cursor::new(mmap)))
}

#[cfg(not(target_os = "macos"))]
fn open_mmap_file(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(Box::new(io::Cursor::new(mmap)))
}

/// Output destination for streaming writes
///
/// The write-side counterpart to [`DataSource`]. Compression for file
/// sinks is chosen from the filename suffix alone — there is no existing
/// content to sniff, so the caller's naming intent is authoritative.
#[derive(Debug, Clone)]
pub enum DataSink {
    /// Write to a local file path
    Local(PathBuf),

    /// Write to standard output
    Stdout,
}

impl DataSink {
    /// Create a sink from a file path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        DataSink::Local(path.as_ref().to_path_buf())
    }

    /// Create a sink for standard output
    pub fn stdout() -> Self {
        DataSink::Stdout
    }

    /// Resolve a command-line style argument
    ///
    /// `None` and the literal `-` denote standard output; anything else is
    /// a file path. A missing destination is never an error on the write
    /// side — it just means stdout.
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            None | Some("-") => DataSink::Stdout,
            Some(path) => DataSink::from_path(path),
        }
    }

    /// Filename-derived format, used to pick the encoder
    ///
    /// Standard output has no name and is written uncompressed.
    pub(crate) fn format_hint(&self) -> Format {
        match self {
            DataSink::Local(path) => Format::from_path(path),
            DataSink::Stdout => Format::None,
        }
    }

    /// Check whether this sink's name implies a compressed encoding
    pub fn is_compressed(&self) -> bool {
        self.format_hint() != Format::None
    }

    /// Open the destination and return its raw byte writer
    ///
    /// `append` preserves an existing file's contents and writes after
    /// them; it is meaningful for file sinks only and ignored for standard
    /// output. Creation and truncation failures (permissions, missing
    /// parent directory) surface as I/O errors here, at open time.
    pub(crate) fn open(&self, append: bool) -> Result<Box<dyn Write + Send>> {
        match self {
            DataSink::Local(path) => {
                let file = if append {
                    OpenOptions::new().create(true).append(true).open(path)?
                } else {
                    File::create(path)?
                };
                Ok(Box::new(file))
            }
            DataSink::Stdout => Ok(Box::new(io::stdout())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_from_arg() {
        assert!(matches!(DataSource::from_arg(None), DataSource::Stdin));
        assert!(matches!(DataSource::from_arg(Some("-")), DataSource::Stdin));
        match DataSource::from_arg(Some("reads.fq.gz")) {
            DataSource::Local(p) => assert_eq!(p, PathBuf::from("reads.fq.gz")),
            _ => panic!("Expected Local variant"),
        }
    }

    #[test]
    fn test_sink_from_arg() {
        assert!(matches!(DataSink::from_arg(None), DataSink::Stdout));
        assert!(matches!(DataSink::from_arg(Some("-")), DataSink::Stdout));
        assert!(matches!(DataSink::from_arg(Some("out.vcf.gz")), DataSink::Local(_)));
    }

    #[test]
    fn test_format_hints() {
        assert_eq!(DataSource::from_path("a.bz2").format_hint(), Format::Bzip2);
        assert_eq!(DataSource::stdin().format_hint(), Format::None);
        assert_eq!(DataSink::from_path("a.zst").format_hint(), Format::Zstd);
        assert_eq!(DataSink::stdout().format_hint(), Format::None);
    }

    #[test]
    fn test_is_compressed() {
        assert!(DataSink::from_path("out.gz").is_compressed());
        assert!(DataSink::from_path("out.bgz").is_compressed());
        assert!(DataSink::from_path("out.xz").is_compressed());
        assert!(!DataSink::from_path("out.txt").is_compressed());
        assert!(!DataSink::stdout().is_compressed());
    }

    #[test]
    fn test_open_missing_file_is_io_error() {
        let source = DataSource::from_path("/nonexistent/definitely/missing.gz");
        assert!(source.open().is_err());
    }
}
