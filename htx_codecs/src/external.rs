//! Byte-level primitives for codecs backed by external blocks.

use std::io::{self, Read, Write};

use htx_core::error::{HtxError, Result};

pub fn read_byte<R: Read>(src: &mut R) -> Result<u8> {
    let mut byte = [0u8; 1];
    match src.read_exact(&mut byte) {
        Ok(()) => Ok(byte[0]),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(HtxError::UnexpectedEof {
            context: "external block",
        }),
        Err(e) => Err(e.into()),
    }
}

/// Read exactly `len` bytes or fail; a short block is `UnexpectedEof`.
pub fn read_array<R: Read>(src: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    match src.read_exact(&mut buf) {
        Ok(()) => Ok(buf),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(HtxError::UnexpectedEof {
            context: "external block",
        }),
        Err(e) => Err(e.into()),
    }
}

/// Read up to (and consuming) `stop`, returning the bytes before it.
/// Exhausting the block without seeing `stop` returns what was read.
pub fn read_to_stop<R: Read>(src: &mut R, stop: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match src.read_exact(&mut byte) {
            Ok(()) => {
                if byte[0] == stop {
                    return Ok(out);
                }
                out.push(byte[0]);
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(out),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Write `data` followed by the stop byte. The stop byte may not occur in
/// the data itself, or the array would not survive a read back.
pub fn write_with_stop<W: Write>(sink: &mut W, data: &[u8], stop: u8) -> Result<()> {
    if data.contains(&stop) {
        return Err(HtxError::invalid_parameters(
            "byte-array-stop",
            format!("stop byte {:#04x} occurs in the data", stop),
        ));
    }
    sink.write_all(data)?;
    sink.write_all(&[stop])?;
    Ok(())
}

/// Name-tokenization codec placeholder. The parameter format for tokenized
/// read names is not finalized, so this type is deliberately not
/// constructible through the encoding factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenizedName;
