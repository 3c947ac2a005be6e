//! Format-transparent compressed readers and writers
//!
//! This is the crate's entry surface. [`CompressedReader`] resolves a
//! source's compression format and installs the matching decoder;
//! [`CompressedWriter`] does the same for encoders on the write side.
//!
//! # Format resolution
//!
//! On the **read** side, content sniffing is authoritative: the first bytes
//! of the stream are probed (and replayed, so the decoder sees them again)
//! and the filename is consulted only to break one specific tie — a `.bgz`
//! or `.bgzf` name when the stream looks like gzip but was too short for
//! the BGZF sub-check to complete. A completed sniff always wins over the
//! extension, because names are advisory metadata and content is not.
//!
//! On the **write** side there is no content yet, so the filename suffix
//! is authoritative; standard output is written uncompressed.
//!
//! Once a format is chosen for an open it is never revisited: there is no
//! mid-stream codec switching and no downgrade-to-plain on decode failure.
//! Mismatched content surfaces as an error — at open time for decoders
//! that validate eagerly, or on first read for the incremental ones.

use crate::error::Result;
use crate::io::bgzf::{BgzfReader, BgzfWriter};
use crate::io::format::{Detection, RewindReader};
use crate::io::{DataSink, DataSource, Format};
use bzip2::read::MultiBzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::debug;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;
use zstd::stream::read::Decoder as ZstdDecoder;
use zstd::stream::write::Encoder as ZstdEncoder;

/// XZ encoder preset (matches `xz(1)`'s default)
const XZ_PRESET: u32 = 6;

/// Apply the read-side precedence rule to one sniff outcome
///
/// The filename hint only matters when the sniffer saw gzip magic but
/// could not finish the BGZF sub-check inside its window; an explicit
/// `.bgz`/`.bgzf` name then settles the ambiguity in favor of BGZF.
fn resolve_format(detection: Detection, hint: Format) -> Format {
    if detection.format == Format::Gzip && detection.bgzf_probe_truncated && hint == Format::Bgzf {
        debug!("bgzf probe truncated; trusting filename hint");
        return Format::Bgzf;
    }
    detection.format
}

/// Look up and install the decoder for a format
///
/// The returned stream yields decoded bytes; [`Format::None`] installs a
/// buffered pass-through. The enumeration is closed, so lookup is total.
fn decode_stream<R: Read + Send + 'static>(
    format: Format,
    reader: R,
) -> Result<Box<dyn BufRead + Send>> {
    Ok(match format {
        Format::None => Box::new(BufReader::new(reader)),
        Format::Gzip => Box::new(BufReader::new(MultiGzDecoder::new(reader))),
        Format::Bgzf => Box::new(BufReader::new(BgzfReader::new(BufReader::new(reader)))),
        Format::Bzip2 => Box::new(BufReader::new(MultiBzDecoder::new(reader))),
        Format::Xz => Box::new(BufReader::new(XzDecoder::new_multi_decoder(reader))),
        Format::Zstd => Box::new(BufReader::new(ZstdDecoder::new(reader)?)),
    })
}

/// Byte reader with transparent decompression
///
/// Owns its transport and decoder state exclusively; dropping the reader
/// releases every layer, innermost first. Each open allocates fresh state,
/// so distinct readers never share buffers and may be driven from separate
/// threads independently.
///
/// # Example
///
/// ```no_run
/// use biostream::{CompressedReader, DataSource};
/// use std::io::Read;
///
/// # fn main() -> biostream::Result<()> {
/// // Works identically for plain, gzip, BGZF, bzip2, xz, and zstd input.
/// let mut reader = CompressedReader::new(DataSource::from_path("reads.fq.gz"))?;
/// let mut data = Vec::new();
/// reader.read_to_end(&mut data)?;
/// # Ok(())
/// # }
/// ```
pub struct CompressedReader {
    inner: Box<dyn BufRead + Send>,
    format: Format,
}

impl CompressedReader {
    /// Open a source with full format detection
    ///
    /// Sniffs the stream's leading bytes, applies the precedence rule
    /// described at the [module level](self), and installs the resulting
    /// decoder (or a pass-through for unrecognized content).
    pub fn new(source: DataSource) -> Result<Self> {
        let hint = source.format_hint();
        let reader = source.open()?;
        Self::sniff_and_wrap(reader, hint)
    }

    /// Open a file path with full format detection
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(DataSource::from_path(path))
    }

    /// Detect and wrap an already-open byte stream
    ///
    /// No filename is available, so detection is sniff-only.
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Result<Self> {
        Self::sniff_and_wrap(reader, Format::None)
    }

    /// Install a specific decoder, bypassing detection entirely
    ///
    /// If the stream is not actually in `format`, the decoder reports a
    /// decode error — possibly on first read rather than here, since some
    /// decoders validate incrementally.
    pub fn with_format<R: Read + Send + 'static>(format: Format, reader: R) -> Result<Self> {
        debug!(format = format.name(), "installing explicit decoder");
        Ok(Self {
            inner: decode_stream(format, reader)?,
            format,
        })
    }

    fn sniff_and_wrap<R: Read + Send + 'static>(reader: R, hint: Format) -> Result<Self> {
        let (detection, rewound) = RewindReader::sniff(reader)?;
        let format = resolve_format(detection, hint);
        debug!(format = format.name(), "detected stream format");
        Ok(Self {
            inner: decode_stream(format, rewound)?,
            format,
        })
    }

    /// The format this reader committed to at open time
    pub fn format(&self) -> Format {
        self.format
    }

    /// Unwrap into the decoded byte stream
    pub fn into_inner(self) -> Box<dyn BufRead + Send> {
        self.inner
    }
}

impl Read for CompressedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl BufRead for CompressedReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt)
    }
}

/// Byte writer with transparent compression
///
/// The encoder is chosen from the sink's filename suffix (or requested
/// explicitly via [`with_format`](CompressedWriter::with_format)); standard
/// output is written uncompressed. Call
/// [`finish`](CompressedWriter::finish) when done: it finalizes the encoder
/// and flushes every layer, innermost first, with errors visible. `Drop`
/// only flushes best-effort and cannot write format epilogues.
///
/// # Example
///
/// ```no_run
/// use biostream::{CompressedWriter, DataSink};
/// use std::io::Write;
///
/// # fn main() -> biostream::Result<()> {
/// let mut writer = CompressedWriter::new(DataSink::from_path("out.txt.zst"))?;
/// writer.write_all(b"compressed transparently\n")?;
/// writer.finish()?;
/// # Ok(())
/// # }
/// ```
pub enum CompressedWriter {
    /// Uncompressed, buffered pass-through
    Plain(Option<BufWriter<Box<dyn Write + Send>>>),
    /// Gzip (single stream, default level)
    Gzip(Option<GzEncoder<BufWriter<Box<dyn Write + Send>>>>),
    /// BGZF (block-structured, batch-parallel)
    Bgzf(Option<BgzfWriter<BufWriter<Box<dyn Write + Send>>>>),
    /// Bzip2
    Bzip2(Option<BzEncoder<BufWriter<Box<dyn Write + Send>>>>),
    /// XZ
    Xz(Option<XzEncoder<BufWriter<Box<dyn Write + Send>>>>),
    /// Zstandard
    Zstd(Option<ZstdEncoder<'static, BufWriter<Box<dyn Write + Send>>>>),
}

impl CompressedWriter {
    /// Open a sink, truncating an existing file
    pub fn new(sink: DataSink) -> Result<Self> {
        Self::with_options(sink, false)
    }

    /// Open a sink; `append` preserves an existing file's contents
    ///
    /// `append` is meaningful for file sinks only and ignored for standard
    /// output. Appending to a compressed file starts a new compressed
    /// stream after the existing one, which every installed decoder reads
    /// back as concatenated members.
    pub fn with_options(sink: DataSink, append: bool) -> Result<Self> {
        let format = sink.format_hint();
        debug!(format = format.name(), append, "opening sink");
        let writer = sink.open(append)?;
        Self::with_format(format, writer)
    }

    /// Install a specific encoder over an already-open byte sink
    pub fn with_format<W: Write + Send + 'static>(format: Format, writer: W) -> Result<Self> {
        let writer: BufWriter<Box<dyn Write + Send>> = BufWriter::new(Box::new(writer));
        Ok(match format {
            Format::None => Self::Plain(Some(writer)),
            Format::Gzip => Self::Gzip(Some(GzEncoder::new(writer, Compression::default()))),
            Format::Bgzf => Self::Bgzf(Some(BgzfWriter::new(writer))),
            Format::Bzip2 => Self::Bzip2(Some(BzEncoder::new(writer, bzip2::Compression::default()))),
            Format::Xz => Self::Xz(Some(XzEncoder::new(writer, XZ_PRESET))),
            Format::Zstd => Self::Zstd(Some(ZstdEncoder::new(
                writer,
                zstd::DEFAULT_COMPRESSION_LEVEL,
            )?)),
        })
    }

    /// The format this writer encodes
    pub fn format(&self) -> Format {
        match self {
            Self::Plain(_) => Format::None,
            Self::Gzip(_) => Format::Gzip,
            Self::Bgzf(_) => Format::Bgzf,
            Self::Bzip2(_) => Format::Bzip2,
            Self::Xz(_) => Format::Xz,
            Self::Zstd(_) => Format::Zstd,
        }
    }

    /// Flush buffered compressed output to the underlying sink
    ///
    /// Does not finalize the stream; use [`finish`](CompressedWriter::finish)
    /// to write format epilogues and EOF markers.
    pub fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(Some(w)) => w.flush(),
            Self::Gzip(Some(w)) => w.flush(),
            Self::Bgzf(Some(w)) => w.flush(),
            Self::Bzip2(Some(w)) => w.flush(),
            Self::Xz(Some(w)) => w.flush(),
            Self::Zstd(Some(w)) => w.flush(),
            _ => Ok(()), // already finished
        }
    }

    /// Finalize the stream and release every layer, innermost first
    ///
    /// Each encoder writes its epilogue (gzip trailer, BGZF EOF marker, xz
    /// stream footer, zstd frame end) into the transport, which is then
    /// flushed. Errors surface here; if an inner layer fails, outer layers
    /// are still released when their buffers drop.
    pub fn finish(mut self) -> io::Result<()> {
        match &mut self {
            Self::Plain(w) => {
                if let Some(mut writer) = w.take() {
                    writer.flush()?;
                }
            }
            Self::Gzip(w) => {
                if let Some(encoder) = w.take() {
                    encoder.finish()?.flush()?;
                }
            }
            Self::Bgzf(w) => {
                if let Some(encoder) = w.take() {
                    encoder.finish()?.flush()?;
                }
            }
            Self::Bzip2(w) => {
                if let Some(encoder) = w.take() {
                    encoder.finish()?.flush()?;
                }
            }
            Self::Xz(w) => {
                if let Some(encoder) = w.take() {
                    encoder.finish()?.flush()?;
                }
            }
            Self::Zstd(w) => {
                if let Some(encoder) = w.take() {
                    encoder.finish()?.flush()?;
                }
            }
        }
        Ok(())
    }
}

impl Write for CompressedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(Some(w)) => w.write(buf),
            Self::Gzip(Some(w)) => w.write(buf),
            Self::Bgzf(Some(w)) => w.write(buf),
            Self::Bzip2(Some(w)) => w.write(buf),
            Self::Xz(Some(w)) => w.write(buf),
            Self::Zstd(Some(w)) => w.write(buf),
            _ => Err(io::Error::new(
                io::ErrorKind::Other,
                "cannot write to finished writer",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        CompressedWriter::flush(self)
    }
}

impl Drop for CompressedWriter {
    fn drop(&mut self) {
        // Best-effort; finish() is the error-visible path.
        let _ = self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    const SAMPLE: &[u8] = b"line one\nline two\nline three\nline four\nline five\n";

    fn encode(format: Format, data: &[u8]) -> Vec<u8> {
        let shared = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = SharedVec(shared.clone());
        let mut writer = CompressedWriter::with_format(format, sink).unwrap();
        writer.write_all(data).unwrap();
        writer.finish().unwrap();
        let out = shared.lock().unwrap().clone();
        out
    }

    /// Vec sink that can be observed after the writer consumes it
    struct SharedVec(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl Write for SharedVec {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_detects_every_format_from_content() {
        for format in [
            Format::Gzip,
            Format::Bgzf,
            Format::Bzip2,
            Format::Xz,
            Format::Zstd,
        ] {
            let encoded = encode(format, SAMPLE);
            let mut reader = CompressedReader::from_reader(io::Cursor::new(encoded)).unwrap();
            assert_eq!(reader.format(), format, "sniffing {format}");

            let mut out = Vec::new();
            reader.read_to_end(&mut out).unwrap();
            assert_eq!(out, SAMPLE, "roundtrip via {format}");
        }
    }

    #[test]
    fn test_plain_content_passes_through() {
        let mut reader = CompressedReader::from_reader(io::Cursor::new(SAMPLE.to_vec())).unwrap();
        assert_eq!(reader.format(), Format::None);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, SAMPLE);
    }

    #[test]
    fn test_empty_stream_is_plain_and_empty() {
        let mut reader = CompressedReader::from_reader(io::Cursor::new(Vec::new())).unwrap();
        assert_eq!(reader.format(), Format::None);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_content_beats_gz_extension() {
        // BGZF blocks saved under a .gz name: the sniffer finds the BC
        // subfield and installs the block-aware decoder anyway.
        let file = NamedTempFile::with_suffix(".gz").unwrap();
        std::fs::write(file.path(), encode(Format::Bgzf, SAMPLE)).unwrap();

        let mut reader = CompressedReader::from_path(file.path()).unwrap();
        assert_eq!(reader.format(), Format::Bgzf);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, SAMPLE);
    }

    #[test]
    fn test_content_beats_bgz_extension() {
        // Plain gzip saved under a .bgz name: the completed sub-check says
        // gzip, and the completed sniff wins over the name.
        let file = NamedTempFile::with_suffix(".bgz").unwrap();
        std::fs::write(file.path(), encode(Format::Gzip, SAMPLE)).unwrap();

        let mut reader = CompressedReader::from_path(file.path()).unwrap();
        assert_eq!(reader.format(), Format::Gzip);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, SAMPLE);
    }

    #[test]
    fn test_content_beats_unrelated_extension() {
        // bzip2 bytes under an .xz name: content wins on the read path.
        let file = NamedTempFile::with_suffix(".xz").unwrap();
        std::fs::write(file.path(), encode(Format::Bzip2, SAMPLE)).unwrap();

        let mut reader = CompressedReader::from_path(file.path()).unwrap();
        assert_eq!(reader.format(), Format::Bzip2);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, SAMPLE);
    }

    #[test]
    fn test_truncated_gzip_probe_defers_to_bgz_extension() {
        // Gzip magic + FEXTRA, but the stream ends before the subfield:
        // the sub-check is inconclusive and an explicit .bgz name decides.
        let stub = [0x1f, 0x8b, 8, 4, 0, 0, 0, 0, 0, 255, 6, 0];

        let file = NamedTempFile::with_suffix(".bgz").unwrap();
        std::fs::write(file.path(), stub).unwrap();
        let reader = CompressedReader::from_path(file.path()).unwrap();
        assert_eq!(reader.format(), Format::Bgzf);

        // The same bytes with no filename stay gzip.
        let reader = CompressedReader::from_reader(io::Cursor::new(stub.to_vec())).unwrap();
        assert_eq!(reader.format(), Format::Gzip);

        // And a .gz name does not hint BGZF either.
        let file = NamedTempFile::with_suffix(".gz").unwrap();
        std::fs::write(file.path(), stub).unwrap();
        let reader = CompressedReader::from_path(file.path()).unwrap();
        assert_eq!(reader.format(), Format::Gzip);
    }

    #[test]
    fn test_explicit_format_mismatch_is_decode_error() {
        let gzipped = encode(Format::Gzip, SAMPLE);

        for wrong in [Format::Bzip2, Format::Xz, Format::Zstd, Format::Bgzf] {
            let mut reader =
                CompressedReader::with_format(wrong, io::Cursor::new(gzipped.clone())).unwrap();
            let mut out = Vec::new();
            let result = reader.read_to_end(&mut out);
            assert!(result.is_err(), "{wrong} decoder accepted gzip input");
        }
    }

    #[test]
    fn test_explicit_format_matching_content_decodes() {
        for format in [
            Format::Gzip,
            Format::Bgzf,
            Format::Bzip2,
            Format::Xz,
            Format::Zstd,
        ] {
            let encoded = encode(format, SAMPLE);
            let mut reader =
                CompressedReader::with_format(format, io::Cursor::new(encoded)).unwrap();
            let mut out = Vec::new();
            reader.read_to_end(&mut out).unwrap();
            assert_eq!(out, SAMPLE);
        }
    }

    #[test]
    fn test_writer_dispatches_on_extension() {
        let cases = [
            (".gz", Format::Gzip),
            (".bgz", Format::Bgzf),
            (".bz2", Format::Bzip2),
            (".xz", Format::Xz),
            (".zst", Format::Zstd),
            (".txt", Format::None),
        ];
        for (suffix, expected) in cases {
            let file = NamedTempFile::with_suffix(suffix).unwrap();
            let writer = CompressedWriter::new(DataSink::from_path(file.path())).unwrap();
            assert_eq!(writer.format(), expected, "suffix {suffix}");
        }
    }

    #[test]
    fn test_file_roundtrip_all_suffixes() {
        for suffix in [".txt", ".gz", ".bgz", ".bgzf", ".bz2", ".xz", ".zst", ".zstd"] {
            let file = NamedTempFile::with_suffix(suffix).unwrap();

            let mut writer = CompressedWriter::new(DataSink::from_path(file.path())).unwrap();
            writer.write_all(SAMPLE).unwrap();
            writer.finish().unwrap();

            let mut reader = CompressedReader::from_path(file.path()).unwrap();
            let mut out = Vec::new();
            reader.read_to_end(&mut out).unwrap();
            assert_eq!(out, SAMPLE, "roundtrip for {suffix}");
        }
    }

    #[test]
    fn test_append_to_plain_file() {
        let file = NamedTempFile::with_suffix(".txt").unwrap();
        let sink = DataSink::from_path(file.path());

        let mut writer = CompressedWriter::new(sink.clone()).unwrap();
        writer.write_all(b"first\n").unwrap();
        writer.finish().unwrap();

        let mut writer = CompressedWriter::with_options(sink, true).unwrap();
        writer.write_all(b"second\n").unwrap();
        writer.finish().unwrap();

        let content = std::fs::read(file.path()).unwrap();
        assert_eq!(content, b"first\nsecond\n");
    }

    #[test]
    fn test_append_to_gzip_file_reads_as_concatenated_members() {
        let file = NamedTempFile::with_suffix(".gz").unwrap();
        let sink = DataSink::from_path(file.path());

        let mut writer = CompressedWriter::new(sink.clone()).unwrap();
        writer.write_all(b"first\n").unwrap();
        writer.finish().unwrap();

        let mut writer = CompressedWriter::with_options(sink, true).unwrap();
        writer.write_all(b"second\n").unwrap();
        writer.finish().unwrap();

        let mut reader = CompressedReader::from_path(file.path()).unwrap();
        assert_eq!(reader.format(), Format::Gzip);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"first\nsecond\n");
    }

    #[test]
    fn test_truncate_replaces_existing_content() {
        let file = NamedTempFile::with_suffix(".txt").unwrap();
        let sink = DataSink::from_path(file.path());

        let mut writer = CompressedWriter::new(sink.clone()).unwrap();
        writer.write_all(b"old content that should vanish\n").unwrap();
        writer.finish().unwrap();

        let mut writer = CompressedWriter::new(sink).unwrap();
        writer.write_all(b"new\n").unwrap();
        writer.finish().unwrap();

        let content = std::fs::read(file.path()).unwrap();
        assert_eq!(content, b"new\n");
    }

    #[test]
    fn test_missing_file_errors_at_open() {
        let result = CompressedReader::from_path("/nonexistent/missing.gz");
        assert!(result.is_err());
    }

    #[test]
    fn test_stdout_sink_is_plain() {
        let writer = CompressedWriter::new(DataSink::stdout()).unwrap();
        assert_eq!(writer.format(), Format::None);
        drop(writer);
    }

    #[test]
    fn test_gzip_written_bytes_carry_magic() {
        let encoded = encode(Format::Gzip, SAMPLE);
        assert_eq!(encoded[0], 0x1f);
        assert_eq!(encoded[1], 0x8b);
    }

    #[test]
    fn test_bgzf_written_bytes_carry_bc_subfield() {
        let encoded = encode(Format::Bgzf, SAMPLE);
        assert_eq!(encoded[0], 0x1f);
        assert_eq!(encoded[1], 0x8b);
        assert_eq!(encoded[3] & 0x04, 0x04, "FEXTRA set");
        assert_eq!(encoded[12], 66, "SI1='B'");
        assert_eq!(encoded[13], 67, "SI2='C'");
    }
}
