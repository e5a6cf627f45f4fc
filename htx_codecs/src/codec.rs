//! Runtime codecs, one flat sum type per data-series value type.
//!
//! A codec is a parameter object; reading and writing go through the
//! slice context, so the only state shared between records is the stream
//! cursor itself. Codecs are materialized from `Encoding` descriptors by
//! the factory in `encoding.rs`.

use htx_core::error::{HtxError, Result};
use htx_core::varint::{itf8, ltf8};

use crate::beta::Beta;
use crate::external;
use crate::gamma::Gamma;
use crate::golomb::{Golomb, GolombRice};
use crate::huffman::CanonicalCodes;
use crate::slice::{SliceReader, SliceWriter};
use crate::subexponential::Subexponential;

/// Codec for `i32` data series.
#[derive(Debug, Clone)]
pub enum IntCodec {
    Beta(Beta),
    Gamma(Gamma),
    Subexponential(Subexponential),
    Golomb(Golomb),
    GolombRice(GolombRice),
    Huffman(CanonicalCodes<i32>),
    External { content_id: i32 },
}

impl IntCodec {
    pub fn read(&self, slice: &mut SliceReader<'_>) -> Result<i32> {
        match self {
            IntCodec::Beta(c) => c.read(slice.core_mut()),
            IntCodec::Gamma(c) => c.read(slice.core_mut()),
            IntCodec::Subexponential(c) => c.read(slice.core_mut()),
            IntCodec::Golomb(c) => c.read(slice.core_mut()),
            IntCodec::GolombRice(c) => c.read(slice.core_mut()),
            IntCodec::Huffman(c) => c.read_symbol(slice.core_mut()),
            IntCodec::External { content_id } => itf8::read_i32(slice.external_mut(*content_id)?),
        }
    }

    pub fn write(&self, slice: &mut SliceWriter, value: i32) -> Result<()> {
        match self {
            IntCodec::Beta(c) => c.write(slice.core_mut(), value),
            IntCodec::Gamma(c) => c.write(slice.core_mut(), value),
            IntCodec::Subexponential(c) => c.write(slice.core_mut(), value),
            IntCodec::Golomb(c) => c.write(slice.core_mut(), value),
            IntCodec::GolombRice(c) => c.write(slice.core_mut(), value),
            IntCodec::Huffman(c) => c.write_symbol(slice.core_mut(), value),
            IntCodec::External { content_id } => {
                itf8::write_i32(slice.external_mut(*content_id), value).map(|_| ())
            }
        }
    }
}

/// Codec for `i64` data series. Only the Golomb family and LTF8-backed
/// external blocks are defined for longs.
#[derive(Debug, Clone)]
pub enum LongCodec {
    Golomb(Golomb),
    External { content_id: i32 },
}

impl LongCodec {
    pub fn read(&self, slice: &mut SliceReader<'_>) -> Result<i64> {
        match self {
            LongCodec::Golomb(c) => c.read_long(slice.core_mut()),
            LongCodec::External { content_id } => ltf8::read_i64(slice.external_mut(*content_id)?),
        }
    }

    pub fn write(&self, slice: &mut SliceWriter, value: i64) -> Result<()> {
        match self {
            LongCodec::Golomb(c) => c.write_long(slice.core_mut(), value),
            LongCodec::External { content_id } => {
                ltf8::write_i64(slice.external_mut(*content_id), value).map(|_| ())
            }
        }
    }
}

/// Codec for single-byte data series.
#[derive(Debug, Clone)]
pub enum ByteCodec {
    Beta(Beta),
    Huffman(CanonicalCodes<u8>),
    External { content_id: i32 },
}

impl ByteCodec {
    pub fn read(&self, slice: &mut SliceReader<'_>) -> Result<u8> {
        match self {
            ByteCodec::Beta(c) => {
                let v = c.read(slice.core_mut())?;
                u8::try_from(v).map_err(|_| {
                    HtxError::Corrupt(format!("beta-coded byte decoded to {}", v))
                })
            }
            ByteCodec::Huffman(c) => c.read_symbol(slice.core_mut()),
            ByteCodec::External { content_id } => {
                external::read_byte(slice.external_mut(*content_id)?)
            }
        }
    }

    pub fn write(&self, slice: &mut SliceWriter, value: u8) -> Result<()> {
        match self {
            ByteCodec::Beta(c) => c.write(slice.core_mut(), i32::from(value)),
            ByteCodec::Huffman(c) => c.write_symbol(slice.core_mut(), value),
            ByteCodec::External { content_id } => {
                slice.external_mut(*content_id).push(value);
                Ok(())
            }
        }
    }

    /// Read `len` consecutive symbols.
    pub fn read_n(&self, slice: &mut SliceReader<'_>, len: usize) -> Result<Vec<u8>> {
        match self {
            ByteCodec::External { content_id } => {
                external::read_array(slice.external_mut(*content_id)?, len)
            }
            _ => (0..len).map(|_| self.read(slice)).collect(),
        }
    }
}

/// Codec for byte-array data series.
#[derive(Debug, Clone)]
pub enum ByteArrayCodec {
    /// Length-preceded array: an inner int codec for the length, an inner
    /// array codec for the payload.
    Len {
        lengths: Box<IntCodec>,
        values: Box<ByteArrayCodec>,
    },
    /// Array terminated by a stop byte in one external block.
    Stop { stop_byte: u8, content_id: i32 },
    /// Raw bytes in one external block; only fixed-length reads are
    /// defined.
    External { content_id: i32 },
}

impl ByteArrayCodec {
    pub fn read(&self, slice: &mut SliceReader<'_>) -> Result<Vec<u8>> {
        match self {
            ByteArrayCodec::Len { lengths, values } => {
                let len = lengths.read(slice)?;
                let len = usize::try_from(len).map_err(|_| {
                    HtxError::Corrupt(format!("negative byte-array length {}", len))
                })?;
                values.read_n(slice, len)
            }
            ByteArrayCodec::Stop {
                stop_byte,
                content_id,
            } => external::read_to_stop(slice.external_mut(*content_id)?, *stop_byte),
            ByteArrayCodec::External { .. } => Err(HtxError::NotApplicable {
                codec: "external byte array without a length",
            }),
        }
    }

    pub fn read_n(&self, slice: &mut SliceReader<'_>, len: usize) -> Result<Vec<u8>> {
        match self {
            ByteArrayCodec::External { content_id } => {
                external::read_array(slice.external_mut(*content_id)?, len)
            }
            ByteArrayCodec::Len { .. } => Err(HtxError::NotApplicable {
                codec: "byte-array-len",
            }),
            ByteArrayCodec::Stop { .. } => Err(HtxError::NotApplicable {
                codec: "byte-array-stop",
            }),
        }
    }

    pub fn write(&self, slice: &mut SliceWriter, data: &[u8]) -> Result<()> {
        match self {
            ByteArrayCodec::Len { lengths, values } => {
                lengths.write(slice, data.len() as i32)?;
                values.write(slice, data)
            }
            ByteArrayCodec::Stop {
                stop_byte,
                content_id,
            } => external::write_with_stop(slice.external_mut(*content_id), data, *stop_byte),
            ByteArrayCodec::External { content_id } => {
                slice.external_mut(*content_id).extend_from_slice(data);
                Ok(())
            }
        }
    }
}
