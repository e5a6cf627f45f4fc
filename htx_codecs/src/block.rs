//! Compressed external block container.
//!
//! External codecs see a block as a flat byte buffer; on disk the buffer is
//! stored through one of the registered general-purpose compressors and a
//! checksum. Blocks are independent: any block can be decoded without
//! touching its neighbors.
//!
//! Wire layout per block:
//! ```text
//! [method: u8] [content_id: ITF8] [compressed_len: ITF8] [raw_len: ITF8]
//! [payload: compressed_len bytes] [xxh3-64 of payload: u64 LE]
//! ```

use std::io::{Read, Write};

use xxhash_rust::xxh3::xxh3_64;

use htx_core::error::{HtxError, Result};
use htx_core::varint::itf8;

pub const METHOD_RAW: u8 = 0;
pub const METHOD_GZIP: u8 = 1;
pub const METHOD_LZ4: u8 = 2;
pub const METHOD_ZSTD: u8 = 3;

/// General-purpose compressor applied to an external block's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// Stores bytes verbatim. Also the right choice for data that is
    /// already entropy-coded.
    Raw,
    Gzip,
    Lz4,
    Zstd,
}

impl CompressionMethod {
    pub fn from_id(id: u8) -> Result<Self> {
        Ok(match id {
            METHOD_RAW => CompressionMethod::Raw,
            METHOD_GZIP => CompressionMethod::Gzip,
            METHOD_LZ4 => CompressionMethod::Lz4,
            METHOD_ZSTD => CompressionMethod::Zstd,
            other => {
                return Err(HtxError::Corrupt(format!(
                    "unknown block compression method {}",
                    other
                )))
            }
        })
    }

    pub fn id(self) -> u8 {
        match self {
            CompressionMethod::Raw => METHOD_RAW,
            CompressionMethod::Gzip => METHOD_GZIP,
            CompressionMethod::Lz4 => METHOD_LZ4,
            CompressionMethod::Zstd => METHOD_ZSTD,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CompressionMethod::Raw => "raw",
            CompressionMethod::Gzip => "gzip",
            CompressionMethod::Lz4 => "lz4",
            CompressionMethod::Zstd => "zstd",
        }
    }

    pub fn compress(self, raw: &[u8]) -> Result<Vec<u8>> {
        match self {
            CompressionMethod::Raw => Ok(raw.to_vec()),
            CompressionMethod::Gzip => {
                let mut encoder =
                    flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(raw)?;
                Ok(encoder.finish()?)
            }
            CompressionMethod::Lz4 => Ok(lz4_flex::compress_prepend_size(raw)),
            CompressionMethod::Zstd => Ok(zstd::bulk::compress(raw, 3)?),
        }
    }

    pub fn decompress(self, compressed: &[u8], raw_len: usize) -> Result<Vec<u8>> {
        let raw = match self {
            CompressionMethod::Raw => compressed.to_vec(),
            CompressionMethod::Gzip => {
                let mut decoder = flate2::read::GzDecoder::new(compressed);
                let mut out = Vec::with_capacity(raw_len);
                decoder.read_to_end(&mut out)?;
                out
            }
            CompressionMethod::Lz4 => lz4_flex::decompress_size_prepended(compressed)
                .map_err(|e| HtxError::Corrupt(format!("lz4: {}", e)))?,
            CompressionMethod::Zstd => zstd::bulk::decompress(compressed, raw_len)
                .map_err(|e| HtxError::Corrupt(format!("zstd: {}", e)))?,
        };
        if raw.len() != raw_len {
            return Err(HtxError::Corrupt(format!(
                "block decompressed to {} bytes, header says {}",
                raw.len(),
                raw_len
            )));
        }
        Ok(raw)
    }
}

/// An external block: the raw bytes a codec set reads or writes, tagged
/// with its content id and on-disk compression method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalBlock {
    pub content_id: i32,
    pub method: CompressionMethod,
    pub data: Vec<u8>,
}

impl ExternalBlock {
    pub fn new(content_id: i32, method: CompressionMethod, data: Vec<u8>) -> Self {
        Self {
            content_id,
            method,
            data,
        }
    }

    pub fn write<W: Write>(&self, sink: &mut W) -> Result<()> {
        let payload = self.method.compress(&self.data)?;
        sink.write_all(&[self.method.id()])?;
        itf8::write_i32(sink, self.content_id)?;
        itf8::write(sink, payload.len() as u32)?;
        itf8::write(sink, self.data.len() as u32)?;
        sink.write_all(&payload)?;
        sink.write_all(&xxh3_64(&payload).to_le_bytes())?;
        Ok(())
    }

    pub fn read<R: Read>(src: &mut R) -> Result<Self> {
        let mut method = [0u8; 1];
        src.read_exact(&mut method)
            .map_err(|_| HtxError::UnexpectedEof { context: "block" })?;
        let method = CompressionMethod::from_id(method[0])?;
        let content_id = itf8::read_i32(src)?;
        let compressed_len = itf8::read(src)? as usize;
        let raw_len = itf8::read(src)? as usize;

        let mut payload = vec![0u8; compressed_len];
        src.read_exact(&mut payload)
            .map_err(|_| HtxError::Corrupt("truncated block payload".into()))?;
        let mut checksum = [0u8; 8];
        src.read_exact(&mut checksum)
            .map_err(|_| HtxError::Corrupt("truncated block checksum".into()))?;
        let expected = u64::from_le_bytes(checksum);
        let computed = xxh3_64(&payload);
        if computed != expected {
            return Err(HtxError::Corrupt(format!(
                "block {} checksum mismatch: expected {:016x}, got {:016x}",
                content_id, expected, computed
            )));
        }

        let data = method.decompress(&payload, raw_len)?;
        Ok(Self {
            content_id,
            method,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        b"the quick brown fox jumps over the lazy dog. "
            .iter()
            .cycle()
            .take(4096)
            .copied()
            .collect()
    }

    #[test]
    fn all_methods_roundtrip() {
        for method in [
            CompressionMethod::Raw,
            CompressionMethod::Gzip,
            CompressionMethod::Lz4,
            CompressionMethod::Zstd,
        ] {
            let block = ExternalBlock::new(7, method, sample());
            let mut bytes = Vec::new();
            block.write(&mut bytes).unwrap();
            let back = ExternalBlock::read(&mut bytes.as_slice()).unwrap();
            assert_eq!(back, block, "method {}", method.name());
        }
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let block = ExternalBlock::new(1, CompressionMethod::Raw, b"payload".to_vec());
        let mut bytes = Vec::new();
        block.write(&mut bytes).unwrap();
        // Flip a bit inside the payload.
        let mid = bytes.len() - 10;
        bytes[mid] ^= 0x01;
        assert!(matches!(
            ExternalBlock::read(&mut bytes.as_slice()),
            Err(HtxError::Corrupt(_))
        ));
    }

    #[test]
    fn unknown_method_rejected() {
        assert!(matches!(
            CompressionMethod::from_id(99),
            Err(HtxError::Corrupt(_))
        ));
    }
}
