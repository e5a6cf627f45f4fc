//! Encoding descriptors: the serializable parameter blocks stored in slice
//! headers, and the factory that turns them back into runtime codecs bound
//! to concrete streams.
//!
//! All integer parameters are ITF8 on the wire. Parsing a descriptor and
//! serializing it back is the identity, and two codecs built from equal
//! descriptors produce byte-identical output.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{Cursor, Read, Write};
use std::sync::Once;

use log::warn;

use htx_core::error::{HtxError, Result};
use htx_core::varint::itf8;

use crate::beta::Beta;
use crate::codec::{ByteArrayCodec, ByteCodec, IntCodec, LongCodec};
use crate::gamma::Gamma;
use crate::golomb::{Golomb, GolombRice};
use crate::huffman::{CanonicalCodes, HuffmanParams};
use crate::slice::BlockBinder;
use crate::subexponential::Subexponential;

static GOLOMB_WARNING: Once = Once::new();

fn warn_golomb_once() {
    GOLOMB_WARNING.call_once(|| {
        warn!("golomb-family encodings are rarely seen in the wild and are poorly exercised by other implementations");
    });
}

/// Wire tag of an encoding family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodingId {
    Null = 0,
    External = 1,
    Golomb = 2,
    Huffman = 3,
    ByteArrayLen = 4,
    ByteArrayStop = 5,
    Beta = 6,
    Subexponential = 7,
    GolombRice = 8,
    Gamma = 9,
}

impl EncodingId {
    pub fn from_id(id: i32) -> Result<Self> {
        Ok(match id {
            0 => EncodingId::Null,
            1 => EncodingId::External,
            2 => EncodingId::Golomb,
            3 => EncodingId::Huffman,
            4 => EncodingId::ByteArrayLen,
            5 => EncodingId::ByteArrayStop,
            6 => EncodingId::Beta,
            7 => EncodingId::Subexponential,
            8 => EncodingId::GolombRice,
            9 => EncodingId::Gamma,
            other => {
                return Err(HtxError::invalid_parameters(
                    "encoding",
                    format!("unknown encoding id {}", other),
                ))
            }
        })
    }

    pub fn id(self) -> i32 {
        self as i32
    }
}

/// A parsed encoding descriptor. One variant per codec family; composite
/// families nest their inner descriptors.
#[derive(Debug, Clone, PartialEq)]
pub enum Encoding {
    /// Sentinel for a data series that carries no data.
    Null,
    External {
        content_id: i32,
    },
    Golomb {
        offset: i32,
        m: i32,
    },
    Huffman {
        symbols: Vec<i32>,
        lengths: Vec<u32>,
    },
    ByteArrayLen {
        lengths: Box<Encoding>,
        values: Box<Encoding>,
    },
    ByteArrayStop {
        stop_byte: u8,
        content_id: i32,
    },
    Beta {
        offset: i32,
        width: u32,
    },
    Subexponential {
        offset: i32,
        k: i32,
    },
    GolombRice {
        offset: i32,
        log2m: i32,
    },
    Gamma {
        offset: i32,
    },
}

impl Encoding {
    pub fn id(&self) -> EncodingId {
        match self {
            Encoding::Null => EncodingId::Null,
            Encoding::External { .. } => EncodingId::External,
            Encoding::Golomb { .. } => EncodingId::Golomb,
            Encoding::Huffman { .. } => EncodingId::Huffman,
            Encoding::ByteArrayLen { .. } => EncodingId::ByteArrayLen,
            Encoding::ByteArrayStop { .. } => EncodingId::ByteArrayStop,
            Encoding::Beta { .. } => EncodingId::Beta,
            Encoding::Subexponential { .. } => EncodingId::Subexponential,
            Encoding::GolombRice { .. } => EncodingId::GolombRice,
            Encoding::Gamma { .. } => EncodingId::Gamma,
        }
    }

    /// Serialize the parameter block (without the encoding id tag).
    pub fn serialize_params(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        match self {
            Encoding::Null => {}
            Encoding::External { content_id } => {
                itf8::write_i32(&mut out, *content_id)?;
            }
            Encoding::Golomb { offset, m } => {
                itf8::write_i32(&mut out, *offset)?;
                itf8::write_i32(&mut out, *m)?;
            }
            Encoding::Huffman { symbols, lengths } => {
                itf8::write(&mut out, symbols.len() as u32)?;
                for &s in symbols {
                    itf8::write_i32(&mut out, s)?;
                }
                itf8::write(&mut out, lengths.len() as u32)?;
                for &l in lengths {
                    itf8::write(&mut out, l)?;
                }
            }
            Encoding::ByteArrayLen { lengths, values } => {
                for inner in [lengths, values] {
                    let params = inner.serialize_params()?;
                    itf8::write_i32(&mut out, inner.id().id())?;
                    itf8::write(&mut out, params.len() as u32)?;
                    out.extend_from_slice(&params);
                }
            }
            Encoding::ByteArrayStop {
                stop_byte,
                content_id,
            } => {
                out.push(*stop_byte);
                itf8::write_i32(&mut out, *content_id)?;
            }
            Encoding::Beta { offset, width } => {
                itf8::write_i32(&mut out, *offset)?;
                itf8::write(&mut out, *width)?;
            }
            Encoding::Subexponential { offset, k } => {
                itf8::write_i32(&mut out, *offset)?;
                itf8::write_i32(&mut out, *k)?;
            }
            Encoding::GolombRice { offset, log2m } => {
                itf8::write_i32(&mut out, *offset)?;
                itf8::write_i32(&mut out, *log2m)?;
            }
            Encoding::Gamma { offset } => {
                itf8::write_i32(&mut out, *offset)?;
            }
        }
        Ok(out)
    }

    /// Parse a parameter block according to its family's grammar.
    pub fn parse(id: EncodingId, params: &[u8]) -> Result<Encoding> {
        let mut src = Cursor::new(params);
        let encoding = Self::parse_from(id, &mut src)?;
        Ok(encoding)
    }

    fn parse_from<R: Read>(id: EncodingId, src: &mut R) -> Result<Encoding> {
        Ok(match id {
            EncodingId::Null => Encoding::Null,
            EncodingId::External => Encoding::External {
                content_id: itf8::read_i32(src)?,
            },
            EncodingId::Golomb => Encoding::Golomb {
                offset: itf8::read_i32(src)?,
                m: itf8::read_i32(src)?,
            },
            EncodingId::Huffman => {
                let n = itf8::read(src)? as usize;
                let mut symbols = Vec::with_capacity(n);
                for _ in 0..n {
                    symbols.push(itf8::read_i32(src)?);
                }
                let n = itf8::read(src)? as usize;
                let mut lengths = Vec::with_capacity(n);
                for _ in 0..n {
                    lengths.push(itf8::read(src)?);
                }
                Encoding::Huffman { symbols, lengths }
            }
            EncodingId::ByteArrayLen => {
                let lengths = Box::new(Self::parse_nested(src)?);
                let values = Box::new(Self::parse_nested(src)?);
                Encoding::ByteArrayLen { lengths, values }
            }
            EncodingId::ByteArrayStop => {
                let mut stop = [0u8; 1];
                src.read_exact(&mut stop).map_err(|_| {
                    HtxError::Corrupt("truncated byte-array-stop parameters".into())
                })?;
                Encoding::ByteArrayStop {
                    stop_byte: stop[0],
                    content_id: itf8::read_i32(src)?,
                }
            }
            EncodingId::Beta => Encoding::Beta {
                offset: itf8::read_i32(src)?,
                width: itf8::read(src)?,
            },
            EncodingId::Subexponential => Encoding::Subexponential {
                offset: itf8::read_i32(src)?,
                k: itf8::read_i32(src)?,
            },
            EncodingId::GolombRice => Encoding::GolombRice {
                offset: itf8::read_i32(src)?,
                log2m: itf8::read_i32(src)?,
            },
            EncodingId::Gamma => Encoding::Gamma {
                offset: itf8::read_i32(src)?,
            },
        })
    }

    fn parse_nested<R: Read>(src: &mut R) -> Result<Encoding> {
        let id = EncodingId::from_id(itf8::read_i32(src)?)?;
        let len = itf8::read(src)? as usize;
        let mut params = vec![0u8; len];
        src.read_exact(&mut params)
            .map_err(|_| HtxError::Corrupt("truncated nested encoding parameters".into()))?;
        Encoding::parse(id, &params)
    }

    /// Materialize an int-series codec, claiming any external block it
    /// needs.
    pub fn build_int(&self, binder: &mut BlockBinder) -> Result<IntCodec> {
        Ok(match self {
            Encoding::Beta { offset, width } => IntCodec::Beta(Beta::new(*offset, *width)?),
            Encoding::Gamma { offset } => IntCodec::Gamma(Gamma::new(*offset)),
            Encoding::Subexponential { offset, k } => {
                IntCodec::Subexponential(Subexponential::new(*offset, *k)?)
            }
            Encoding::Golomb { offset, m } => {
                warn_golomb_once();
                IntCodec::Golomb(Golomb::new(*offset, *m)?)
            }
            Encoding::GolombRice { offset, log2m } => {
                warn_golomb_once();
                IntCodec::GolombRice(GolombRice::new(*offset, *log2m)?)
            }
            Encoding::Huffman { symbols, lengths } => {
                let params = HuffmanParams::new(symbols.clone(), lengths.clone())?;
                IntCodec::Huffman(CanonicalCodes::new(&params)?)
            }
            Encoding::External { content_id } => {
                binder.claim(*content_id)?;
                IntCodec::External {
                    content_id: *content_id,
                }
            }
            other => {
                return Err(HtxError::invalid_parameters(
                    "encoding",
                    format!("{:?} cannot code an int series", other.id()),
                ))
            }
        })
    }

    /// Materialize a long-series codec.
    pub fn build_long(&self, binder: &mut BlockBinder) -> Result<LongCodec> {
        Ok(match self {
            Encoding::Golomb { offset, m } => {
                warn_golomb_once();
                LongCodec::Golomb(Golomb::new(*offset, *m)?)
            }
            Encoding::External { content_id } => {
                binder.claim(*content_id)?;
                LongCodec::External {
                    content_id: *content_id,
                }
            }
            other => {
                return Err(HtxError::invalid_parameters(
                    "encoding",
                    format!("{:?} cannot code a long series", other.id()),
                ))
            }
        })
    }

    /// Materialize a byte-series codec. Huffman alphabets must fit in a
    /// byte.
    pub fn build_byte(&self, binder: &mut BlockBinder) -> Result<ByteCodec> {
        Ok(match self {
            Encoding::Beta { offset, width } => ByteCodec::Beta(Beta::new(*offset, *width)?),
            Encoding::Huffman { symbols, lengths } => {
                let bytes: Vec<u8> = symbols
                    .iter()
                    .map(|&s| {
                        u8::try_from(s).map_err(|_| {
                            HtxError::invalid_parameters(
                                "huffman",
                                format!("symbol {} does not fit in a byte", s),
                            )
                        })
                    })
                    .collect::<Result<_>>()?;
                let params = HuffmanParams::new(bytes, lengths.clone())?;
                ByteCodec::Huffman(CanonicalCodes::new(&params)?)
            }
            Encoding::External { content_id } => {
                binder.claim(*content_id)?;
                ByteCodec::External {
                    content_id: *content_id,
                }
            }
            other => {
                return Err(HtxError::invalid_parameters(
                    "encoding",
                    format!("{:?} cannot code a byte series", other.id()),
                ))
            }
        })
    }

    /// Materialize a byte-array codec, recursing into composite inners.
    pub fn build_byte_array(&self, binder: &mut BlockBinder) -> Result<ByteArrayCodec> {
        Ok(match self {
            Encoding::ByteArrayLen { lengths, values } => ByteArrayCodec::Len {
                lengths: Box::new(lengths.build_int(binder)?),
                values: Box::new(values.build_byte_array(binder)?),
            },
            Encoding::ByteArrayStop {
                stop_byte,
                content_id,
            } => {
                binder.claim(*content_id)?;
                ByteArrayCodec::Stop {
                    stop_byte: *stop_byte,
                    content_id: *content_id,
                }
            }
            Encoding::External { content_id } => {
                binder.claim(*content_id)?;
                ByteArrayCodec::External {
                    content_id: *content_id,
                }
            }
            other => {
                return Err(HtxError::invalid_parameters(
                    "encoding",
                    format!("{:?} cannot code a byte-array series", other.id()),
                ))
            }
        })
    }
}

/// Two-character data series tag, e.g. `RL` for read lengths.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataSeriesId(pub [u8; 2]);

impl fmt::Debug for DataSeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for DataSeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.0[0] as char, self.0[1] as char)
    }
}

/// The compression map of a slice header: which encoding codes each data
/// series.
///
/// Wire layout: ITF8 byte size of the map body, then ITF8 entry count,
/// then per entry the two-byte series tag, ITF8 encoding id, ITF8
/// parameter length, and the parameter block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompressionHeaderMap {
    entries: BTreeMap<DataSeriesId, Encoding>,
}

impl CompressionHeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, series: DataSeriesId, encoding: Encoding) {
        self.entries.insert(series, encoding);
    }

    pub fn get(&self, series: DataSeriesId) -> Option<&Encoding> {
        self.entries.get(&series)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DataSeriesId, &Encoding)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn serialize<W: Write>(&self, sink: &mut W) -> Result<()> {
        let mut body = Vec::new();
        itf8::write(&mut body, self.entries.len() as u32)?;
        for (series, encoding) in &self.entries {
            body.write_all(&series.0)?;
            itf8::write_i32(&mut body, encoding.id().id())?;
            let params = encoding.serialize_params()?;
            itf8::write(&mut body, params.len() as u32)?;
            body.extend_from_slice(&params);
        }
        itf8::write(sink, body.len() as u32)?;
        sink.write_all(&body)?;
        Ok(())
    }

    pub fn parse<R: Read>(src: &mut R) -> Result<Self> {
        let body_len = itf8::read(src)? as usize;
        let mut body = vec![0u8; body_len];
        src.read_exact(&mut body)
            .map_err(|_| HtxError::Corrupt("truncated compression map".into()))?;
        let mut src = Cursor::new(body.as_slice());

        let count = itf8::read(&mut src)? as usize;
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let mut tag = [0u8; 2];
            src.read_exact(&mut tag)
                .map_err(|_| HtxError::Corrupt("truncated compression map entry".into()))?;
            let id = EncodingId::from_id(itf8::read_i32(&mut src)?)?;
            let len = itf8::read(&mut src)? as usize;
            let mut params = vec![0u8; len];
            src.read_exact(&mut params)
                .map_err(|_| HtxError::Corrupt("truncated encoding parameters".into()))?;
            entries.insert(DataSeriesId(tag), Encoding::parse(id, &params)?);
        }
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(e: Encoding) {
        let params = e.serialize_params().unwrap();
        let parsed = Encoding::parse(e.id(), &params).unwrap();
        assert_eq!(parsed, e);
    }

    #[test]
    fn descriptor_roundtrips() {
        roundtrip(Encoding::Null);
        roundtrip(Encoding::External { content_id: 42 });
        roundtrip(Encoding::Golomb { offset: -4, m: 17 });
        roundtrip(Encoding::Huffman {
            symbols: vec![65, 66, 67, 68, 69],
            lengths: vec![2, 2, 2, 3, 3],
        });
        roundtrip(Encoding::ByteArrayLen {
            lengths: Box::new(Encoding::Gamma { offset: 1 }),
            values: Box::new(Encoding::External { content_id: 3 }),
        });
        roundtrip(Encoding::ByteArrayStop {
            stop_byte: 0x09,
            content_id: 5,
        });
        roundtrip(Encoding::Beta {
            offset: 3,
            width: 5,
        });
        roundtrip(Encoding::Subexponential { offset: 0, k: 2 });
        roundtrip(Encoding::GolombRice {
            offset: 0,
            log2m: 3,
        });
        roundtrip(Encoding::Gamma { offset: 10 });
    }

    #[test]
    fn unknown_encoding_id_rejected() {
        assert!(matches!(
            EncodingId::from_id(55),
            Err(HtxError::InvalidParameters { .. })
        ));
    }

    #[test]
    fn compression_map_roundtrip() {
        let mut map = CompressionHeaderMap::new();
        map.insert(
            DataSeriesId(*b"RL"),
            Encoding::Gamma { offset: 1 },
        );
        map.insert(
            DataSeriesId(*b"RN"),
            Encoding::ByteArrayStop {
                stop_byte: b'\t',
                content_id: 2,
            },
        );
        map.insert(DataSeriesId(*b"QS"), Encoding::External { content_id: 1 });

        let mut bytes = Vec::new();
        map.serialize(&mut bytes).unwrap();
        let parsed = CompressionHeaderMap::parse(&mut bytes.as_slice()).unwrap();
        assert_eq!(parsed, map);
    }

    #[test]
    fn null_encoding_cannot_be_materialized() {
        let mut binder = BlockBinder::new(Vec::new());
        assert!(Encoding::Null.build_int(&mut binder).is_err());
    }
}
