//! Compression format detection
//!
//! Two independent classifiers feed the open path:
//!
//! - **Magic-byte sniffing** ([`Format::from_magic`]): inspects a bounded
//!   prefix of the stream itself. This is the authoritative signal on the
//!   read side, because file names routinely lie (`.gz` files carrying BGZF
//!   blocks are everywhere in sequencing archives).
//! - **Filename classification** ([`Format::from_path`]): pure suffix
//!   matching. Authoritative on the write side, where there is no content
//!   to sniff yet.
//!
//! Sniffing never consumes bytes for good: [`RewindReader`] owns the probed
//! prefix and replays it, so the decoder that gets installed sees the stream
//! from its first byte.

use std::fmt;
use std::io::{self, Read};
use std::path::Path;

/// Gzip member magic (RFC 1952 § 2.3.1), shared by plain gzip and BGZF
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Bzip2 stream magic: "BZ" plus the 'h' (Huffman) version marker
pub const BZIP2_MAGIC: [u8; 3] = [0x42, 0x5a, 0x68];

/// XZ stream magic
pub const XZ_MAGIC: [u8; 6] = [0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00];

/// Zstandard frame magic
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// BGZF extra-subfield identifier: SI1='B' (66), SI2='C' (67), SLEN=2
pub(crate) const BGZF_SI1: u8 = 66;
pub(crate) const BGZF_SI2: u8 = 67;
pub(crate) const BGZF_SLEN: u16 = 2;

/// Longest prefix the sniffer ever needs:
/// gzip header (10) + XLEN (2) + first subfield header (4) + BSIZE (2).
///
/// The look-ahead buffer is capped here so memory use stays bounded no
/// matter what the source hands us.
pub(crate) const SNIFF_LEN: usize = 18;

/// Compression format of a byte stream
///
/// Closed enumeration: every decoder and encoder this crate can install is
/// named here, so codec lookup is total and there is no "unknown format"
/// arm to defend against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Uncompressed; reads and writes pass through unchanged
    None,
    /// Plain gzip (RFC 1952), possibly multiple concatenated members
    Gzip,
    /// Blocked gzip (BGZF): independent ≤64 KB gzip members with a "BC"
    /// extra subfield carrying the compressed block size
    Bgzf,
    /// Bzip2
    Bzip2,
    /// XZ (LZMA2 container)
    Xz,
    /// Zstandard
    Zstd,
}

impl Format {
    /// Classify a filename by suffix, case-insensitively
    ///
    /// Never inspects content and never fails; an unrecognized or missing
    /// suffix yields [`Format::None`]. A `.gz` answer is provisional on the
    /// read side: content sniffing at open time may upgrade it to BGZF.
    ///
    /// # Example
    ///
    /// ```
    /// use biostream::Format;
    ///
    /// assert_eq!(Format::from_path("reads.fq.gz"), Format::Gzip);
    /// assert_eq!(Format::from_path("calls.vcf.BGZ"), Format::Bgzf);
    /// assert_eq!(Format::from_path("notes.txt"), Format::None);
    /// ```
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let ext = match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_ascii_lowercase(),
            None => return Format::None,
        };
        match ext.as_str() {
            "bgz" | "bgzf" => Format::Bgzf,
            "gz" => Format::Gzip,
            "bz2" => Format::Bzip2,
            "xz" => Format::Xz,
            "zst" | "zstd" => Format::Zstd,
            _ => Format::None,
        }
    }

    /// Classify the leading bytes of a stream by magic number
    ///
    /// `prefix` may be shorter than the full sniff window (including empty);
    /// missing bytes are treated as non-matching, so this never fails — an
    /// unrecognized prefix is simply [`Format::None`].
    ///
    /// # Example
    ///
    /// ```
    /// use biostream::Format;
    ///
    /// assert_eq!(Format::from_magic(&[0x42, 0x5a, 0x68, 0x39]), Format::Bzip2);
    /// assert_eq!(Format::from_magic(b"plain text"), Format::None);
    /// assert_eq!(Format::from_magic(&[]), Format::None);
    /// ```
    pub fn from_magic(prefix: &[u8]) -> Self {
        classify(prefix).format
    }

    /// Human-readable name (for diagnostics only — never parsed)
    pub fn name(&self) -> &'static str {
        match self {
            Format::None => "plain",
            Format::Gzip => "gzip",
            Format::Bgzf => "bgzf",
            Format::Bzip2 => "bzip2",
            Format::Xz => "xz",
            Format::Zstd => "zstd",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one sniff attempt
#[derive(Debug, Clone, Copy)]
pub(crate) struct Detection {
    /// Detected format
    pub format: Format,
    /// Gzip magic matched but the prefix ended before the first extra
    /// subfield could be examined, so the BGZF sub-check was inconclusive.
    /// The gateway uses this to let an explicit `.bgz` extension break the
    /// tie; a completed negative sub-check stays gzip regardless.
    pub bgzf_probe_truncated: bool,
}

/// Classify a sniffed prefix, in fixed precedence order
///
/// Gzip is checked last among the byte magics because its 2-byte signature
/// is a strict prefix condition shared with BGZF; the BGZF sub-check then
/// examines the first extra subfield without ever looking past the sniff
/// window.
pub(crate) fn classify(prefix: &[u8]) -> Detection {
    let found = |format| Detection {
        format,
        bgzf_probe_truncated: false,
    };

    if prefix.starts_with(&ZSTD_MAGIC) {
        return found(Format::Zstd);
    }
    if prefix.starts_with(&XZ_MAGIC) {
        return found(Format::Xz);
    }
    if prefix.starts_with(&BZIP2_MAGIC) {
        return found(Format::Bzip2);
    }
    if !prefix.starts_with(&GZIP_MAGIC) {
        return found(Format::None);
    }

    // Gzip magic matched. BGZF additionally requires CM=8 (deflate), the
    // FEXTRA flag, and a first extra subfield of "BC" with SLEN=2.
    if prefix.len() < 4 {
        // Can't even see CM/FLG.
        return Detection {
            format: Format::Gzip,
            bgzf_probe_truncated: true,
        };
    }
    if prefix[2] != 8 || prefix[3] & 0x04 == 0 {
        // Not deflate, or no extra field: definitively plain gzip.
        return found(Format::Gzip);
    }
    if prefix.len() < SNIFF_LEN {
        // FEXTRA is set but the subfield lies beyond what we could read.
        return Detection {
            format: Format::Gzip,
            bgzf_probe_truncated: true,
        };
    }
    let xlen = u16::from_le_bytes([prefix[10], prefix[11]]);
    let slen = u16::from_le_bytes([prefix[14], prefix[15]]);
    if xlen >= 6 && prefix[12] == BGZF_SI1 && prefix[13] == BGZF_SI2 && slen == BGZF_SLEN {
        return found(Format::Bgzf);
    }
    found(Format::Gzip)
}

/// Reader that replays a sniffed prefix before delegating to the source
///
/// This is the look-ahead-and-restore primitive: a small owned buffer plus
/// an unread capability layered directly on the raw byte source, rather
/// than a seek capability the source might not have (pipes, stdin). The
/// buffer is allocated by one open call, fully drained by the installed
/// decoder, and freed as soon as replay completes.
pub(crate) struct RewindReader<R> {
    prefix: Vec<u8>,
    pos: usize,
    inner: R,
}

impl<R: Read> RewindReader<R> {
    /// Read up to [`SNIFF_LEN`] bytes from `inner`, classify them, and
    /// return the detection together with a reader that yields the stream
    /// from byte zero.
    ///
    /// I/O failures while filling the window propagate; short reads (an
    /// empty or tiny stream) do not — they classify as far as the bytes
    /// allow.
    pub(crate) fn sniff(mut inner: R) -> io::Result<(Detection, Self)> {
        let mut prefix = vec![0u8; SNIFF_LEN];
        let mut filled = 0;
        while filled < SNIFF_LEN {
            match inner.read(&mut prefix[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        prefix.truncate(filled);
        let detection = classify(&prefix);
        Ok((
            detection,
            Self {
                prefix,
                pos: 0,
                inner,
            },
        ))
    }
}

impl<R: Read> Read for RewindReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos < self.prefix.len() {
            let n = (self.prefix.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.prefix[self.pos..self.pos + n]);
            self.pos += n;
            if self.pos == self.prefix.len() {
                // Replay complete; the look-ahead buffer is never needed again.
                self.prefix = Vec::new();
                self.pos = 0;
            }
            return Ok(n);
        }
        self.inner.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_table() {
        assert_eq!(Format::from_path("a.bgz"), Format::Bgzf);
        assert_eq!(Format::from_path("a.bgzf"), Format::Bgzf);
        assert_eq!(Format::from_path("a.gz"), Format::Gzip);
        assert_eq!(Format::from_path("a.bz2"), Format::Bzip2);
        assert_eq!(Format::from_path("a.xz"), Format::Xz);
        assert_eq!(Format::from_path("a.zst"), Format::Zstd);
        assert_eq!(Format::from_path("a.zstd"), Format::Zstd);
        assert_eq!(Format::from_path("a.txt"), Format::None);
        assert_eq!(Format::from_path("a"), Format::None);
    }

    #[test]
    fn test_extension_case_insensitive() {
        assert_eq!(Format::from_path("A.GZ"), Format::Gzip);
        assert_eq!(Format::from_path("A.BgZf"), Format::Bgzf);
        assert_eq!(Format::from_path("A.ZST"), Format::Zstd);
    }

    #[test]
    fn test_only_last_suffix_counts() {
        assert_eq!(Format::from_path("reads.fq.gz"), Format::Gzip);
        assert_eq!(Format::from_path("reads.gz.txt"), Format::None);
    }

    #[test]
    fn test_magic_precedence() {
        assert_eq!(Format::from_magic(&ZSTD_MAGIC), Format::Zstd);
        assert_eq!(Format::from_magic(&XZ_MAGIC), Format::Xz);
        assert_eq!(Format::from_magic(&BZIP2_MAGIC), Format::Bzip2);
        assert_eq!(Format::from_magic(&GZIP_MAGIC), Format::Gzip);
        assert_eq!(Format::from_magic(b"random bytes here"), Format::None);
    }

    #[test]
    fn test_short_and_empty_prefixes() {
        assert_eq!(Format::from_magic(&[]), Format::None);
        assert_eq!(Format::from_magic(&[0x1f]), Format::None);
        assert_eq!(Format::from_magic(&[0x42, 0x5a]), Format::None);
        // Full bzip2 magic is enough even without the level digit.
        assert_eq!(Format::from_magic(&[0x42, 0x5a, 0x68]), Format::Bzip2);
    }

    /// A minimal BGZF block header: gzip header with FEXTRA, XLEN=6, and
    /// the "BC" subfield carrying BSIZE.
    fn bgzf_header(bsize: u16) -> [u8; 18] {
        let bs = bsize.to_le_bytes();
        [
            31, 139, 8, 4, 0, 0, 0, 0, 0, 255, // gzip header, FLG=FEXTRA
            6, 0, // XLEN=6
            66, 67, 2, 0, // SI1='B', SI2='C', SLEN=2
            bs[0], bs[1],
        ]
    }

    #[test]
    fn test_bgzf_detected_over_gzip() {
        let header = bgzf_header(27);
        let d = classify(&header);
        assert_eq!(d.format, Format::Bgzf);
        assert!(!d.bgzf_probe_truncated);
    }

    #[test]
    fn test_gzip_without_fextra_is_gzip() {
        // FLG=0: definitively plain gzip, probe complete.
        let header = [31u8, 139, 8, 0, 0, 0, 0, 0, 0, 255];
        let d = classify(&header);
        assert_eq!(d.format, Format::Gzip);
        assert!(!d.bgzf_probe_truncated);
    }

    #[test]
    fn test_gzip_with_foreign_subfield_is_gzip() {
        let mut header = bgzf_header(27);
        header[12] = b'R';
        header[13] = b'A';
        let d = classify(&header);
        assert_eq!(d.format, Format::Gzip);
        assert!(!d.bgzf_probe_truncated);
    }

    #[test]
    fn test_truncated_bgzf_probe_falls_back_to_gzip() {
        // FEXTRA is set but the window ends before the subfield.
        let header = bgzf_header(27);
        let d = classify(&header[..12]);
        assert_eq!(d.format, Format::Gzip);
        assert!(d.bgzf_probe_truncated);

        // Two magic bytes alone are also inconclusive.
        let d = classify(&header[..2]);
        assert_eq!(d.format, Format::Gzip);
        assert!(d.bgzf_probe_truncated);
    }

    #[test]
    fn test_rewind_reader_replays_prefix() {
        let data = b"only a few bytes";
        let (d, mut reader) = RewindReader::sniff(&data[..]).unwrap();
        assert_eq!(d.format, Format::None);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_rewind_reader_replays_long_stream() {
        // Stream longer than the sniff window: replayed prefix must splice
        // seamlessly onto the remaining bytes.
        let data: Vec<u8> = (0u8..=255).cycle().take(1000).collect();
        let (_, mut reader) = RewindReader::sniff(&data[..]).unwrap();

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_rewind_reader_empty_stream() {
        let (d, mut reader) = RewindReader::sniff(&b""[..]).unwrap();
        assert_eq!(d.format, Format::None);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_sniff_same_prefix_twice_is_stable() {
        let header = bgzf_header(27);
        assert_eq!(Format::from_magic(&header), Format::from_magic(&header));
    }
}
