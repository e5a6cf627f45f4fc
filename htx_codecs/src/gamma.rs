//! Elias gamma codec with an offset.

use std::io::{Read, Write};

use htx_core::bits::{BitReader, BitWriter};
use htx_core::error::{HtxError, Result};

/// Codes `n = value + offset` for `n >= 1` as `len - 1` zero bits followed
/// by `n` in `len` bits, where `len = floor(log2 n) + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gamma {
    pub offset: i32,
}

impl Gamma {
    pub fn new(offset: i32) -> Self {
        Self { offset }
    }

    pub fn write<W: Write>(&self, bits: &mut BitWriter<W>, value: i32) -> Result<()> {
        let n = i64::from(value) + i64::from(self.offset);
        if n < 1 {
            return Err(HtxError::invalid_parameters(
                "gamma",
                format!("value {} with offset {} is not positive", value, self.offset),
            ));
        }
        let n = n as u64;
        let len = 64 - n.leading_zeros();
        bits.write_unary(false, u64::from(len - 1))?;
        bits.write_bits(n as u32, len)
    }

    pub fn read<R: Read>(&self, bits: &mut BitReader<R>) -> Result<i32> {
        // The terminating one bit of the zero run is the MSB of n.
        let zeros = bits.read_unary_zeros()?;
        if zeros > 31 {
            return Err(HtxError::Corrupt(
                format!("gamma code declares a {}-bit value", zeros + 1),
            ));
        }
        let low = if zeros == 0 { 0 } else { bits.read_bits(zeros)? };
        let n = (1u64 << zeros) | u64::from(low);
        Ok((n as i64 - i64::from(self.offset)) as i32)
    }
}
