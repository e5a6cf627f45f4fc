//! BGZF: gzip members of bounded size with the block length recorded in an
//! extra field, so any block can be located and inflated independently.
//!
//! Writer layout per block:
//! ```text
//! [gzip header: 18 bytes, FEXTRA with "BC" subfield = total size - 1]
//! [raw deflate payload]
//! [CRC32 of the uncompressed bytes: u32 LE] [ISIZE: u32 LE]
//! ```
//! A finished stream ends with a fixed 28-byte empty block so readers can
//! tell truncation from a clean end.

use std::io::{self, Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};
use log::debug;

use htx_core::error::{HtxError, Result};
use htx_core::vpos::VirtualOffset;

/// Raw bytes buffered per block. Kept under 64 KB so that even an
/// incompressible block plus framing stays addressable by the 16-bit
/// in-block offset of a virtual offset.
pub const MAX_BLOCK_SIZE: usize = 65280;

const HEADER_SIZE: usize = 18;
const FOOTER_SIZE: usize = 8;

/// The canonical empty last block.
pub const EOF_MARKER: [u8; 28] = [
    0x1f, 0x8b, 0x08, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x06, 0x00, 0x42, 0x43, 0x02,
    0x00, 0x1b, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// Block-compressed writer that reports the virtual offset of the current
/// write position.
pub struct BgzfWriter<W: Write> {
    sink: W,
    pending: Vec<u8>,
    compressed_offset: u64,
}

impl<W: Write> BgzfWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            pending: Vec::with_capacity(MAX_BLOCK_SIZE),
            compressed_offset: 0,
        }
    }

    /// Virtual offset of the next byte to be written: the file offset of
    /// the block being assembled plus the bytes pending inside it.
    pub fn virtual_offset(&self) -> Result<VirtualOffset> {
        VirtualOffset::new(self.compressed_offset, self.pending.len() as u16)
    }

    /// Buffer `data`, flushing complete blocks as they fill up.
    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(data);
        while self.pending.len() >= MAX_BLOCK_SIZE {
            let raw: Vec<u8> = self.pending.drain(..MAX_BLOCK_SIZE).collect();
            self.flush_block(&raw)?;
        }
        Ok(())
    }

    /// Flush any partial block, append the EOF marker, and hand back the
    /// sink.
    pub fn finish(mut self) -> Result<W> {
        if !self.pending.is_empty() {
            let raw = std::mem::take(&mut self.pending);
            self.flush_block(&raw)?;
        }
        self.sink.write_all(&EOF_MARKER)?;
        self.sink.flush()?;
        Ok(self.sink)
    }

    fn flush_block(&mut self, raw: &[u8]) -> Result<()> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(raw)?;
        let payload = encoder.finish()?;

        let total = HEADER_SIZE + payload.len() + FOOTER_SIZE;
        if total - 1 > u16::MAX as usize {
            return Err(HtxError::Corrupt(format!(
                "compressed block of {} bytes exceeds the BGZF frame limit",
                total
            )));
        }

        let mut crc = Crc::new();
        crc.update(raw);

        let mut header = [0u8; HEADER_SIZE];
        header[0] = 0x1f; // gzip magic
        header[1] = 0x8b;
        header[2] = 0x08; // deflate
        header[3] = 0x04; // FEXTRA
        // MTIME = 0, XFL = 0
        header[9] = 0xff; // OS unknown
        header[10..12].copy_from_slice(&6u16.to_le_bytes()); // XLEN
        header[12] = b'B';
        header[13] = b'C';
        header[14..16].copy_from_slice(&2u16.to_le_bytes());
        header[16..18].copy_from_slice(&((total - 1) as u16).to_le_bytes());

        self.sink.write_all(&header)?;
        self.sink.write_all(&payload)?;
        self.sink.write_all(&crc.sum().to_le_bytes())?;
        self.sink.write_all(&(raw.len() as u32).to_le_bytes())?;

        debug!(
            "bgzf block at {}: {} raw -> {} compressed",
            self.compressed_offset,
            raw.len(),
            total
        );
        self.compressed_offset += total as u64;
        Ok(())
    }
}

/// Sequential block-compressed reader with virtual-offset reporting.
pub struct BgzfReader<R: Read> {
    src: R,
    block: Vec<u8>,
    pos: usize,
    block_offset: u64,
    next_offset: u64,
    at_eof: bool,
}

impl<R: Read> BgzfReader<R> {
    pub fn new(src: R) -> Self {
        Self {
            src,
            block: Vec::new(),
            pos: 0,
            block_offset: 0,
            next_offset: 0,
            at_eof: false,
        }
    }

    /// Virtual offset of the read cursor. After a block is fully consumed
    /// this points at the start of the next block.
    pub fn virtual_offset(&self) -> Result<VirtualOffset> {
        if self.pos == self.block.len() {
            VirtualOffset::new(self.next_offset, 0)
        } else {
            VirtualOffset::new(self.block_offset, self.pos as u16)
        }
    }

    /// Load the next block, skipping empty ones. Returns false at a clean
    /// end of stream.
    fn advance(&mut self) -> Result<bool> {
        loop {
            let mut header = [0u8; HEADER_SIZE];
            match read_or_eof(&mut self.src, &mut header)? {
                ReadOutcome::Eof => {
                    self.at_eof = true;
                    return Ok(false);
                }
                ReadOutcome::Full => {}
            }

            if header[0] != 0x1f || header[1] != 0x8b || header[2] != 0x08 {
                return Err(HtxError::Corrupt("not a gzip block".into()));
            }
            if header[3] & 0x04 == 0 {
                return Err(HtxError::Corrupt(
                    "gzip block lacks the FEXTRA field required of BGZF".into(),
                ));
            }
            let xlen = u16::from_le_bytes([header[10], header[11]]) as usize;
            let mut extra = vec![0u8; xlen.max(6)];
            // The fixed header already consumed the first 6 extra bytes.
            extra[..6].copy_from_slice(&header[12..18]);
            if xlen > 6 {
                self.src
                    .read_exact(&mut extra[6..xlen])
                    .map_err(|_| HtxError::Corrupt("truncated gzip extra field".into()))?;
            } else if xlen < 6 {
                return Err(HtxError::Corrupt(
                    "gzip extra field too short for a BC subfield".into(),
                ));
            }

            let bsize = find_bc_subfield(&extra[..xlen])?;
            let total = bsize as usize + 1;
            let cdata_len = total
                .checked_sub(12 + xlen + FOOTER_SIZE)
                .ok_or_else(|| HtxError::Corrupt("BGZF block size too small".into()))?;

            let mut cdata = vec![0u8; cdata_len];
            self.src
                .read_exact(&mut cdata)
                .map_err(|_| HtxError::Corrupt("truncated BGZF block".into()))?;
            let mut footer = [0u8; FOOTER_SIZE];
            self.src
                .read_exact(&mut footer)
                .map_err(|_| HtxError::Corrupt("truncated BGZF block footer".into()))?;

            let mut raw = Vec::new();
            DeflateDecoder::new(cdata.as_slice())
                .read_to_end(&mut raw)
                .map_err(|e| HtxError::Corrupt(format!("bad deflate stream: {}", e)))?;

            let expected_crc = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
            let expected_len = u32::from_le_bytes([footer[4], footer[5], footer[6], footer[7]]);
            let mut crc = Crc::new();
            crc.update(&raw);
            if crc.sum() != expected_crc || raw.len() as u32 != expected_len {
                return Err(HtxError::Corrupt("BGZF block checksum mismatch".into()));
            }

            self.block_offset = self.next_offset;
            self.next_offset += total as u64;
            self.pos = 0;
            self.block = raw;
            if !self.block.is_empty() {
                return Ok(true);
            }
            // Empty block (e.g. the EOF marker): keep scanning.
        }
    }
}

enum ReadOutcome {
    Full,
    Eof,
}

/// Fill `buf` completely, or report a clean EOF if no bytes were read at
/// all. A partial fill is corruption.
fn read_or_eof<R: Read>(src: &mut R, buf: &mut [u8]) -> Result<ReadOutcome> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = src.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(ReadOutcome::Eof);
            }
            return Err(HtxError::Corrupt("truncated BGZF block header".into()));
        }
        filled += n;
    }
    Ok(ReadOutcome::Full)
}

fn find_bc_subfield(extra: &[u8]) -> Result<u16> {
    let mut rest = extra;
    while rest.len() >= 4 {
        let (si1, si2) = (rest[0], rest[1]);
        let slen = u16::from_le_bytes([rest[2], rest[3]]) as usize;
        if rest.len() < 4 + slen {
            break;
        }
        if si1 == b'B' && si2 == b'C' && slen == 2 {
            return Ok(u16::from_le_bytes([rest[4], rest[5]]));
        }
        rest = &rest[4 + slen..];
    }
    Err(HtxError::Corrupt(
        "gzip extra field carries no BC subfield; not a BGZF stream".into(),
    ))
}

impl<R: Read> Read for BgzfReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pos == self.block.len() {
            if self.at_eof {
                return Ok(0);
            }
            match self.advance() {
                Ok(true) => {}
                Ok(false) => return Ok(0),
                Err(HtxError::Io(e)) => return Err(e),
                Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string())),
            }
        }
        let n = buf.len().min(self.block.len() - self.pos);
        buf[..n].copy_from_slice(&self.block[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
