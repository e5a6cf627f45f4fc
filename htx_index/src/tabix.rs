//! Tabix index on-disk format.
//!
//! Layout (all integers little-endian, the whole stream BGZF-compressed):
//! ```text
//! magic "TBI\x01"
//! n_ref:i32  format:i32  col_seq:i32  col_beg:i32  col_end:i32
//! meta:i32   skip:i32    l_nm:i32
//! names: l_nm bytes of NUL-terminated sequence names
//! per reference:
//!   n_bin:i32
//!   per bin: bin:u32  n_chunk:i32  (chunk_beg:u64 chunk_end:u64)*
//!   n_intv:i32  ioff:u64*
//! ```

use std::collections::BTreeMap;
use std::io::{Read, Write};

use htx_core::error::{HtxError, Result};
use htx_core::vpos::VirtualOffset;

use crate::bgzf::{BgzfReader, BgzfWriter};
use crate::index::{BinningIndex, Chunk, RefIndex};

pub const MAGIC: [u8; 4] = *b"TBI\x01";

pub const FORMAT_GENERIC: i32 = 0;
pub const FORMAT_SAM: i32 = 1;
pub const FORMAT_VCF: i32 = 2;
/// OR-ed into `format` when coordinates are 0-based half-open.
pub const FLAG_ZERO_BASED: i32 = 0x10000;

/// The text-format descriptor stored in a tabix header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabixHeader {
    pub format: i32,
    /// 1-based column of the sequence name.
    pub col_seq: i32,
    /// 1-based column of the start coordinate.
    pub col_beg: i32,
    /// 1-based column of the end coordinate, or 0 when absent.
    pub col_end: i32,
    /// Lines starting with this byte are headers.
    pub meta_char: u8,
    /// Lines to skip at the top of the file.
    pub skip_lines: i32,
}

impl TabixHeader {
    pub fn generic(col_seq: i32, col_beg: i32, col_end: i32) -> Self {
        Self {
            format: FORMAT_GENERIC,
            col_seq,
            col_beg,
            col_end,
            meta_char: b'#',
            skip_lines: 0,
        }
    }

    pub fn vcf() -> Self {
        Self {
            format: FORMAT_VCF,
            col_seq: 1,
            col_beg: 2,
            col_end: 0,
            meta_char: b'#',
            skip_lines: 0,
        }
    }

    pub fn bed() -> Self {
        Self {
            format: FORMAT_GENERIC | FLAG_ZERO_BASED,
            col_seq: 1,
            col_beg: 2,
            col_end: 3,
            meta_char: b'#',
            skip_lines: 0,
        }
    }
}

/// A complete tabix index: format descriptor, sequence names, and one
/// content entry per sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct TabixIndex {
    pub header: TabixHeader,
    pub names: Vec<String>,
    pub refs: Vec<RefIndex>,
}

impl BinningIndex {
    /// Pair the finished index with a tabix descriptor and the sequence
    /// names it was built against. Unobserved references serialize as
    /// empty entries.
    pub fn into_tabix(self, header: TabixHeader, names: Vec<String>) -> Result<TabixIndex> {
        if names.len() != self.refs.len() {
            return Err(HtxError::invalid_parameters(
                "tabix",
                format!(
                    "{} sequence names for {} references",
                    names.len(),
                    self.refs.len()
                ),
            ));
        }
        Ok(TabixIndex {
            header,
            names,
            refs: self
                .refs
                .into_iter()
                .map(|r| r.unwrap_or_default())
                .collect(),
        })
    }
}

impl TabixIndex {
    /// Serialize through a BGZF stream onto `sink`, returning the sink.
    pub fn write<W: Write>(&self, sink: W) -> Result<W> {
        let mut body = Vec::new();
        body.extend_from_slice(&MAGIC);
        put_i32(&mut body, self.refs.len() as i32);
        put_i32(&mut body, self.header.format);
        put_i32(&mut body, self.header.col_seq);
        put_i32(&mut body, self.header.col_beg);
        put_i32(&mut body, self.header.col_end);
        put_i32(&mut body, i32::from(self.header.meta_char));
        put_i32(&mut body, self.header.skip_lines);

        let l_nm: usize = self.names.iter().map(|n| n.len() + 1).sum();
        put_i32(&mut body, l_nm as i32);
        for name in &self.names {
            body.extend_from_slice(name.as_bytes());
            body.push(0);
        }

        for content in &self.refs {
            put_i32(&mut body, content.bins.len() as i32);
            for (&bin, chunks) in &content.bins {
                body.extend_from_slice(&bin.to_le_bytes());
                put_i32(&mut body, chunks.len() as i32);
                for chunk in chunks {
                    body.extend_from_slice(&chunk.begin.raw().to_le_bytes());
                    body.extend_from_slice(&chunk.end.raw().to_le_bytes());
                }
            }
            put_i32(&mut body, content.linear.len() as i32);
            for slot in &content.linear {
                let raw = slot.map(VirtualOffset::raw).unwrap_or(0);
                body.extend_from_slice(&raw.to_le_bytes());
            }
        }

        let mut bgzf = BgzfWriter::new(sink);
        bgzf.write_all(&body)?;
        bgzf.finish()
    }

    /// Read a BGZF-compressed tabix index.
    pub fn read<R: Read>(src: R) -> Result<Self> {
        let mut src = BgzfReader::new(src);

        let mut magic = [0u8; 4];
        src.read_exact(&mut magic)
            .map_err(|_| HtxError::Corrupt("truncated tabix index".into()))?;
        if magic != MAGIC {
            return Err(HtxError::Corrupt("not a tabix index".into()));
        }

        let n_ref = get_i32(&mut src)?;
        let format = get_i32(&mut src)?;
        let col_seq = get_i32(&mut src)?;
        let col_beg = get_i32(&mut src)?;
        let col_end = get_i32(&mut src)?;
        let meta = get_i32(&mut src)?;
        let skip_lines = get_i32(&mut src)?;
        let header = TabixHeader {
            format,
            col_seq,
            col_beg,
            col_end,
            meta_char: u8::try_from(meta)
                .map_err(|_| HtxError::Corrupt(format!("meta character {} out of range", meta)))?,
            skip_lines,
        };

        let l_nm = get_i32(&mut src)? as usize;
        let mut name_bytes = vec![0u8; l_nm];
        src.read_exact(&mut name_bytes)
            .map_err(|_| HtxError::Corrupt("truncated sequence name table".into()))?;
        if name_bytes.last().copied() != Some(0) && l_nm > 0 {
            return Err(HtxError::Corrupt(
                "sequence name table is not NUL-terminated".into(),
            ));
        }
        let names: Vec<String> = name_bytes
            .split(|&b| b == 0)
            .filter(|s| !s.is_empty())
            .map(|s| {
                String::from_utf8(s.to_vec())
                    .map_err(|_| HtxError::Corrupt("sequence name is not UTF-8".into()))
            })
            .collect::<Result<_>>()?;

        let n_ref = usize::try_from(n_ref)
            .map_err(|_| HtxError::Corrupt(format!("negative reference count {}", n_ref)))?;
        if names.len() != n_ref {
            return Err(HtxError::Corrupt(format!(
                "{} sequence names for {} references",
                names.len(),
                n_ref
            )));
        }
        let mut refs = Vec::with_capacity(n_ref);
        for _ in 0..n_ref {
            let n_bin = get_i32(&mut src)?;
            let mut bins = BTreeMap::new();
            for _ in 0..n_bin {
                let bin = get_u32(&mut src)?;
                let n_chunk = get_i32(&mut src)?;
                let mut chunks = Vec::with_capacity(n_chunk.max(0) as usize);
                for _ in 0..n_chunk {
                    let begin = VirtualOffset::from_raw(get_u64(&mut src)?);
                    let end = VirtualOffset::from_raw(get_u64(&mut src)?);
                    chunks.push(Chunk { begin, end });
                }
                bins.insert(bin, chunks);
            }
            let n_intv = get_i32(&mut src)?;
            let mut linear = Vec::with_capacity(n_intv.max(0) as usize);
            for _ in 0..n_intv {
                let raw = get_u64(&mut src)?;
                linear.push(if raw == 0 {
                    None
                } else {
                    Some(VirtualOffset::from_raw(raw))
                });
            }
            refs.push(RefIndex { bins, linear });
        }

        Ok(Self {
            header,
            names,
            refs,
        })
    }
}

fn put_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn get_i32<R: Read>(src: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    src.read_exact(&mut buf)
        .map_err(|_| HtxError::Corrupt("truncated tabix index".into()))?;
    Ok(i32::from_le_bytes(buf))
}

fn get_u32<R: Read>(src: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    src.read_exact(&mut buf)
        .map_err(|_| HtxError::Corrupt("truncated tabix index".into()))?;
    Ok(u32::from_le_bytes(buf))
}

fn get_u64<R: Read>(src: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    src.read_exact(&mut buf)
        .map_err(|_| HtxError::Corrupt("truncated tabix index".into()))?;
    Ok(u64::from_le_bytes(buf))
}
