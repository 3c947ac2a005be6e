//! BGZF block codec
//!
//! BGZF is a restriction of gzip: the stream is a series of independent
//! gzip members, each at most 64 KB uncompressed, each carrying its own
//! compressed size in a "BC" extra subfield so a reader can find block
//! boundaries without inflating anything. Independence of blocks is what
//! makes batch-parallel decompression possible here.
//!
//! # Block layout
//!
//! - Bytes 0-1: gzip magic (31, 139)
//! - Byte 2: CM=8 (deflate); byte 3: FLG with FEXTRA (0x04) set
//! - Bytes 4-9: MTIME/XFL/OS (ignored)
//! - Bytes 10-11: XLEN, little-endian
//! - Bytes 12..12+XLEN: extra subfields; the BGZF subfield is
//!   SI1='B' (66), SI2='C' (67), SLEN=2, BSIZE = total block size - 1
//! - Deflate payload, then CRC32 and ISIZE (4 bytes each)
//!
//! A stream ends with a fixed 28-byte empty block ([`BGZF_EOF`]).
//!
//! The reader here is strict: a block missing the magic, deflate method,
//! FEXTRA flag, or BC subfield is an error, never silently reinterpreted
//! as plain gzip. Format selection happens before a decoder is installed;
//! once this decoder is committed, non-BGZF input must surface as a decode
//! error.

use crate::io::format::{BGZF_SI1, BGZF_SI2, BGZF_SLEN, GZIP_MAGIC};
use flate2::read::GzDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use rayon::prelude::*;
use std::io::{self, BufRead, Read, Write};

/// Fixed size of the block preamble the reader inspects up front:
/// gzip header (10) + XLEN (2) + first subfield header (4) + BSIZE (2).
const BLOCK_PREAMBLE: usize = 18;

/// Gzip member trailer: CRC32 (4) + ISIZE (4)
const BLOCK_TRAILER: usize = 8;

/// Uncompressed payload per written block (60 KB)
///
/// The format caps a block at 64 KB total; 60 KB of input leaves headroom
/// for deflate expansion on incompressible data so BSIZE always fits.
const BGZF_BLOCK_SIZE: usize = 60 * 1024;

/// Number of blocks compressed or decompressed per parallel batch
///
/// Memory per batch stays bounded at roughly 2 × 8 × 64 KB = ~1 MB,
/// regardless of stream size.
const PARALLEL_BLOCK_COUNT: usize = 8;

/// The 28-byte empty block that terminates every BGZF stream
pub const BGZF_EOF: [u8; 28] = [
    31, 139, 8, 4, 0, 0, 0, 0, 0, 255, // gzip header, FLG=FEXTRA
    6, 0, 66, 67, 2, 0, 27, 0, // XLEN=6, BC subfield, BSIZE=27
    3, 0, // empty deflate block
    0, 0, 0, 0, // CRC32
    0, 0, 0, 0, // ISIZE
];

/// One compressed block, boundary-delimited but not yet inflated
#[derive(Debug, Clone)]
struct BgzfBlock {
    data: Vec<u8>,
}

/// Inflate one block; each block is a complete gzip member
fn decompress_block(block: &BgzfBlock) -> io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(&block.data[..]);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Fill `buf` completely, or return how many bytes were available
///
/// Distinguishes a clean end of stream (0 bytes) from a truncated block
/// header (1..len bytes), which `read_exact` cannot.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Streaming BGZF decoder with bounded batch-parallel inflation
///
/// Reads up to [`PARALLEL_BLOCK_COUNT`] blocks at a time, inflates the
/// batch in parallel, and serves the concatenated output through `Read`.
/// Concatenated blocks (including a trailing [`BGZF_EOF`] marker, which
/// inflates to nothing) are handled as the format requires.
///
/// # Example
///
/// ```no_run
/// use biostream::io::bgzf::BgzfReader;
/// use std::fs::File;
/// use std::io::{BufReader, Read};
///
/// # fn main() -> std::io::Result<()> {
/// let file = File::open("calls.vcf.bgz")?;
/// let mut reader = BgzfReader::new(BufReader::new(file));
/// let mut text = Vec::new();
/// reader.read_to_end(&mut text)?;
/// # Ok(())
/// # }
/// ```
pub struct BgzfReader<R: BufRead> {
    inner: R,
    /// Decompressed bytes ready to serve
    output_buffer: Vec<u8>,
    output_pos: usize,
    eof: bool,
}

impl<R: BufRead> BgzfReader<R> {
    /// Wrap a raw byte source positioned at the first block
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            output_buffer: Vec::new(),
            output_pos: 0,
            eof: false,
        }
    }

    /// Read one boundary-delimited block, or `None` at clean end of stream
    fn read_one_block(&mut self) -> io::Result<Option<BgzfBlock>> {
        let mut preamble = [0u8; BLOCK_PREAMBLE];
        let got = read_fully(&mut self.inner, &mut preamble)?;
        if got == 0 {
            return Ok(None);
        }
        if got < BLOCK_PREAMBLE {
            return Err(invalid(format!(
                "truncated BGZF block header ({} of {} bytes)",
                got, BLOCK_PREAMBLE
            )));
        }

        if preamble[0] != GZIP_MAGIC[0] || preamble[1] != GZIP_MAGIC[1] {
            return Err(invalid(format!(
                "not a BGZF block: bad gzip magic [{}, {}]",
                preamble[0], preamble[1]
            )));
        }
        if preamble[2] != 8 {
            return Err(invalid(format!(
                "not a BGZF block: compression method {} (expected deflate)",
                preamble[2]
            )));
        }
        if preamble[3] & 0x04 == 0 {
            return Err(invalid(
                "not a BGZF block: FEXTRA flag is clear".to_string(),
            ));
        }

        let xlen = u16::from_le_bytes([preamble[10], preamble[11]]) as usize;
        if xlen < 6 {
            return Err(invalid(format!(
                "not a BGZF block: extra field too short ({xlen} bytes)"
            )));
        }

        // The extra field starts at byte 12; its first 6 bytes are already
        // in the preamble. Pull in the rest before scanning subfields.
        let mut extra = Vec::with_capacity(xlen);
        extra.extend_from_slice(&preamble[12..BLOCK_PREAMBLE]);
        if xlen > 6 {
            let mut rest = vec![0u8; xlen - 6];
            self.inner.read_exact(&mut rest)?;
            extra.extend_from_slice(&rest);
        }

        let bsize = match find_bsize(&extra)? {
            Some(b) => b as usize,
            None => {
                return Err(invalid(
                    "not a BGZF block: no BC subfield in extra field".to_string(),
                ))
            }
        };

        let block_size = bsize + 1;
        let already_read = 12 + xlen;
        if block_size < already_read + BLOCK_TRAILER {
            return Err(invalid(format!(
                "invalid BGZF block size {block_size} (header is {already_read} bytes)"
            )));
        }

        let mut data = Vec::with_capacity(block_size);
        data.extend_from_slice(&preamble[..12]);
        data.extend_from_slice(&extra);
        let mut rest = vec![0u8; block_size - already_read];
        self.inner.read_exact(&mut rest)?;
        data.extend_from_slice(&rest);

        Ok(Some(BgzfBlock { data }))
    }

    /// Read and inflate the next batch of blocks in parallel
    fn read_next_batch(&mut self) -> io::Result<()> {
        let mut blocks = Vec::with_capacity(PARALLEL_BLOCK_COUNT);
        for _ in 0..PARALLEL_BLOCK_COUNT {
            match self.read_one_block()? {
                Some(block) => blocks.push(block),
                None => {
                    self.eof = true;
                    break;
                }
            }
        }

        let decompressed: Vec<_> = blocks
            .par_iter()
            .map(decompress_block)
            .collect::<io::Result<Vec<_>>>()?;

        self.output_buffer.clear();
        self.output_pos = 0;
        for block in decompressed {
            self.output_buffer.extend_from_slice(&block);
        }
        Ok(())
    }
}

impl<R: BufRead> Read for BgzfReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // An EOF-marker block inflates to nothing, so a batch can come back
        // empty without the stream being done; keep pulling until data
        // arrives or the source is exhausted.
        while self.output_pos >= self.output_buffer.len() {
            if self.eof {
                return Ok(0);
            }
            self.read_next_batch()?;
        }

        let available = self.output_buffer.len() - self.output_pos;
        let to_copy = available.min(buf.len());
        buf[..to_copy]
            .copy_from_slice(&self.output_buffer[self.output_pos..self.output_pos + to_copy]);
        self.output_pos += to_copy;
        Ok(to_copy)
    }
}

/// Scan gzip extra subfields for the BGZF BC entry; returns its BSIZE
fn find_bsize(extra: &[u8]) -> io::Result<Option<u16>> {
    let mut pos = 0;
    while pos + 4 <= extra.len() {
        let si1 = extra[pos];
        let si2 = extra[pos + 1];
        let slen = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]);

        if si1 == BGZF_SI1 && si2 == BGZF_SI2 && slen == BGZF_SLEN {
            if pos + 6 > extra.len() {
                return Err(invalid("BGZF BC subfield truncated".to_string()));
            }
            return Ok(Some(u16::from_le_bytes([extra[pos + 4], extra[pos + 5]])));
        }
        pos += 4 + slen as usize;
    }
    Ok(None)
}

/// Streaming BGZF encoder with bounded batch-parallel compression
///
/// Mirrors [`BgzfReader`]: input accumulates into 60 KB blocks, batches of
/// [`PARALLEL_BLOCK_COUNT`] blocks are deflated in parallel, and compressed
/// blocks are written out in order. [`finish`](BgzfWriter::finish) writes
/// the trailing [`BGZF_EOF`] marker; call it explicitly so errors are
/// visible — `Drop` cannot report them.
pub struct BgzfWriter<W: Write> {
    writer: W,
    /// Filled blocks waiting for the next parallel batch
    pending_blocks: Vec<Vec<u8>>,
    /// Block currently accumulating input
    current_block: Vec<u8>,
}

impl<W: Write> BgzfWriter<W> {
    /// Wrap a raw byte sink
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            pending_blocks: Vec::with_capacity(PARALLEL_BLOCK_COUNT),
            current_block: Vec::with_capacity(BGZF_BLOCK_SIZE),
        }
    }

    /// Deflate one payload into a complete BGZF block
    fn compress_block(data: &[u8]) -> io::Result<Vec<u8>> {
        let mut deflate = DeflateEncoder::new(Vec::new(), Compression::default());
        deflate.write_all(data)?;
        let deflated = deflate.finish()?;

        let crc = crc32fast::hash(data);
        let isize = data.len() as u32;

        let mut block = Vec::with_capacity(BLOCK_PREAMBLE + deflated.len() + BLOCK_TRAILER);
        block.push(31); // ID1
        block.push(139); // ID2
        block.push(8); // CM (deflate)
        block.push(4); // FLG (FEXTRA)
        block.extend_from_slice(&[0, 0, 0, 0]); // MTIME
        block.push(0); // XFL
        block.push(255); // OS (unknown)
        block.extend_from_slice(&6u16.to_le_bytes()); // XLEN
        block.push(BGZF_SI1);
        block.push(BGZF_SI2);
        block.extend_from_slice(&BGZF_SLEN.to_le_bytes());
        let bsize_pos = block.len();
        block.extend_from_slice(&0u16.to_le_bytes()); // BSIZE, patched below
        block.extend_from_slice(&deflated);
        block.extend_from_slice(&crc.to_le_bytes());
        block.extend_from_slice(&isize.to_le_bytes());

        // BSIZE is (total block size - 1) and must fit in u16; 60 KB of
        // input cannot deflate past that, but check rather than truncate.
        let bsize = u16::try_from(block.len() - 1)
            .map_err(|_| invalid(format!("BGZF block overflow: {} bytes", block.len())))?;
        block[bsize_pos..bsize_pos + 2].copy_from_slice(&bsize.to_le_bytes());

        Ok(block)
    }

    /// Compress every pending block in parallel and write them in order
    fn flush_blocks(&mut self) -> io::Result<()> {
        if self.pending_blocks.is_empty() {
            return Ok(());
        }

        let compressed: Vec<_> = self
            .pending_blocks
            .par_iter()
            .map(|block| Self::compress_block(block))
            .collect::<io::Result<Vec<_>>>()?;

        for block in compressed {
            self.writer.write_all(&block)?;
        }
        self.pending_blocks.clear();
        Ok(())
    }

    /// Finalize the stream: compress everything buffered, write the EOF
    /// marker, flush the sink, and hand the sink back
    pub fn finish(mut self) -> io::Result<W> {
        if !self.current_block.is_empty() {
            let block = std::mem::take(&mut self.current_block);
            self.pending_blocks.push(block);
        }
        self.flush_blocks()?;
        self.writer.write_all(&BGZF_EOF)?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> Write for BgzfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut remaining = buf;
        while !remaining.is_empty() {
            let space = BGZF_BLOCK_SIZE - self.current_block.len();
            let to_copy = remaining.len().min(space);
            self.current_block.extend_from_slice(&remaining[..to_copy]);
            remaining = &remaining[to_copy..];

            if self.current_block.len() >= BGZF_BLOCK_SIZE {
                let block = std::mem::replace(
                    &mut self.current_block,
                    Vec::with_capacity(BGZF_BLOCK_SIZE),
                );
                self.pending_blocks.push(block);
                if self.pending_blocks.len() >= PARALLEL_BLOCK_COUNT {
                    self.flush_blocks()?;
                }
            }
        }
        Ok(buf.len())
    }

    /// Flush compressed output to the sink
    ///
    /// Data still accumulating in the current partial block stays buffered;
    /// forcing a block boundary on every flush would fragment the stream.
    /// Use [`finish`](BgzfWriter::finish) to emit everything.
    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
