//! Line-oriented character streams over compressed byte streams
//!
//! [`LineReader`] and [`LineWriter`] layer text on top of the
//! format-transparent byte streams from
//! [`compression`](crate::io::compression). [`TextSource`] is the
//! restartable factory: it holds a source description (no I/O at
//! construction) and every [`open`](TextSource::open) call re-runs format
//! detection and hands back an independent reader — open once to count
//! lines, open again to process them, without re-specifying anything.

use crate::error::{BiostreamError, Result};
use crate::io::{CompressedReader, CompressedWriter, DataSink, DataSource, Format};
use std::io::{self, BufRead, Read, Write};
use std::path::Path;

/// Text encoding applied when turning decoded bytes into lines
///
/// The default is strict UTF-8 (which covers ASCII, and with it every
/// tab-separated bioinformatics format this crate gets pointed at).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    /// Strict UTF-8; invalid sequences are an error
    #[default]
    Utf8,
    /// UTF-8 with invalid sequences replaced by U+FFFD
    Utf8Lossy,
}

impl TextEncoding {
    /// Resolve a caller-supplied encoding label
    ///
    /// Unrecognized labels are an invalid-argument error, reported here
    /// and never deferred to read time.
    ///
    /// # Example
    ///
    /// ```
    /// use biostream::TextEncoding;
    ///
    /// assert_eq!(TextEncoding::from_label("UTF-8").unwrap(), TextEncoding::Utf8);
    /// assert!(TextEncoding::from_label("shift-jis").is_err());
    /// ```
    pub fn from_label(label: &str) -> Result<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "utf-8-lossy" | "utf8-lossy" => Ok(TextEncoding::Utf8Lossy),
            other => Err(BiostreamError::InvalidArgument(format!(
                "unsupported text encoding: {other:?}"
            ))),
        }
    }
}

/// Line-oriented reader over a format-transparent byte stream
///
/// Yields lines with the terminator (`\n` or `\r\n`) stripped. Also usable
/// as an iterator of `Result<String>`.
///
/// # Example
///
/// ```no_run
/// use biostream::{DataSource, LineReader};
///
/// # fn main() -> biostream::Result<()> {
/// let mut reader = LineReader::new(DataSource::from_path("annotations.gtf.gz"))?;
/// while let Some(line) = reader.read_line()? {
///     if line.starts_with('#') {
///         continue;
///     }
///     // parse the record
/// }
/// # Ok(())
/// # }
/// ```
pub struct LineReader {
    inner: CompressedReader,
    encoding: TextEncoding,
    /// Raw bytes of the current line, reused across calls
    line: Vec<u8>,
    line_number: usize,
}

impl LineReader {
    /// Open a source with full format detection
    pub fn new(source: DataSource) -> Result<Self> {
        Ok(Self::from_compressed(CompressedReader::new(source)?))
    }

    /// Open a file path with full format detection
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(DataSource::from_path(path))
    }

    /// Wrap an already-opened compressed reader
    pub fn from_compressed(inner: CompressedReader) -> Self {
        Self {
            inner,
            encoding: TextEncoding::default(),
            line: Vec::with_capacity(256),
            line_number: 0,
        }
    }

    /// Replace the text encoding (builder style)
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// The compression format resolved at open time
    pub fn format(&self) -> Format {
        self.inner.format()
    }

    /// Number of lines read so far
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Read the next line, or `None` at end of stream
    ///
    /// The line terminator is stripped; a final line without one is still
    /// returned. Decode errors from the underlying stream and invalid
    /// UTF-8 (in strict mode) both surface as errors.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        self.line.clear();
        let n = self
            .inner
            .read_until(b'\n', &mut self.line)
            .map_err(|e| self.classify_read_error(e))?;
        if n == 0 {
            return Ok(None);
        }
        self.line_number += 1;

        if self.line.last() == Some(&b'\n') {
            self.line.pop();
            if self.line.last() == Some(&b'\r') {
                self.line.pop();
            }
        }

        let text = match self.encoding {
            TextEncoding::Utf8 => String::from_utf8(self.line.clone()).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("line {} is not valid UTF-8", self.line_number),
                )
            })?,
            TextEncoding::Utf8Lossy => String::from_utf8_lossy(&self.line).into_owned(),
        };
        Ok(Some(text))
    }

    /// Separate malformed-content failures from transport failures
    ///
    /// Decoders report malformed input as `InvalidData`; once a format has
    /// been committed that is a decode error of that format, not an I/O
    /// problem with the source.
    fn classify_read_error(&self, e: io::Error) -> BiostreamError {
        if e.kind() == io::ErrorKind::InvalidData && self.format() != Format::None {
            BiostreamError::Decode {
                format: self.format(),
                msg: e.to_string(),
            }
        } else {
            BiostreamError::Io(e)
        }
    }
}

impl Iterator for LineReader {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_line().transpose()
    }
}

/// Line-oriented writer over a format-transparent byte stream
///
/// Call [`finish`](LineWriter::finish) when done so encoder epilogues are
/// written and errors are visible.
pub struct LineWriter {
    inner: CompressedWriter,
}

impl LineWriter {
    /// Open a sink, choosing the encoder from its filename suffix
    pub fn new(sink: DataSink) -> Result<Self> {
        Ok(Self::from_compressed(CompressedWriter::new(sink)?))
    }

    /// Open a sink in append mode
    pub fn append(sink: DataSink) -> Result<Self> {
        Ok(Self::from_compressed(CompressedWriter::with_options(
            sink, true,
        )?))
    }

    /// Wrap an already-opened compressed writer
    pub fn from_compressed(inner: CompressedWriter) -> Self {
        Self { inner }
    }

    /// The format this writer encodes
    pub fn format(&self) -> Format {
        self.inner.format()
    }

    /// Write one line, terminated with `\n`
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.inner.write_all(line.as_bytes())?;
        self.inner.write_all(b"\n")
    }

    /// Flush buffered output without finalizing the stream
    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    /// Finalize the stream and release every layer
    pub fn finish(self) -> io::Result<()> {
        self.inner.finish()
    }
}

impl Write for LineWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Where a [`TextSource`] gets its bytes from on each open
enum SourceKind {
    Data(DataSource),
    /// Byte-stream factory for sources this crate has no name for
    Stream(Box<dyn Fn() -> io::Result<Box<dyn Read + Send>> + Send + Sync>),
}

/// Restartable factory for line readers
///
/// A `TextSource` is a value, not a stream: construction performs no I/O,
/// and every [`open`](TextSource::open) runs a fresh sniff-and-wrap cycle
/// and returns an independent [`LineReader`] with its own decoder state.
/// Closing (dropping) one opened reader has no effect on the others.
///
/// # Example
///
/// ```no_run
/// use biostream::{DataSource, TextSource};
///
/// # fn main() -> biostream::Result<()> {
/// let source = TextSource::new(DataSource::from_path("sites.vcf.gz"));
///
/// // First pass: count.
/// let total = source.open()?.count();
///
/// // Second pass: process, format re-detected automatically.
/// for line in source.open()? {
///     let line = line?;
///     // ...
/// }
/// # let _ = total;
/// # Ok(())
/// # }
/// ```
pub struct TextSource {
    kind: SourceKind,
    encoding: TextEncoding,
}

impl TextSource {
    /// Create a factory over a named source (file path or stdin)
    pub fn new(source: DataSource) -> Self {
        Self {
            kind: SourceKind::Data(source),
            encoding: TextEncoding::default(),
        }
    }

    /// Create a factory over a byte-stream producer
    ///
    /// The closure is invoked once per [`open`](TextSource::open); each
    /// returned stream is sniffed independently. Detection is sniff-only,
    /// since there is no filename to consult.
    pub fn from_fn<F>(producer: F) -> Self
    where
        F: Fn() -> io::Result<Box<dyn Read + Send>> + Send + Sync + 'static,
    {
        Self {
            kind: SourceKind::Stream(Box::new(producer)),
            encoding: TextEncoding::default(),
        }
    }

    /// Replace the text encoding (builder style)
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// The encoding every opened reader will use
    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Open an independent line reader, re-running format detection
    pub fn open(&self) -> Result<LineReader> {
        let reader = match &self.kind {
            SourceKind::Data(source) => CompressedReader::new(source.clone())?,
            SourceKind::Stream(producer) => CompressedReader::from_reader(producer()?)?,
        };
        Ok(LineReader::from_compressed(reader).with_encoding(self.encoding))
    }
}
