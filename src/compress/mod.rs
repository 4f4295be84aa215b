//! Byte-aligned gamma codes
//!
//! A value `n > 0` with `k` significant bits is coded as `k - 1` one bits, a
//! zero bit, and the `k - 1` low-order bits of `n`. Each code is preceded by
//! a header byte and enough zero bits to end on a byte boundary, so that
//! every value starts at a byte offset and can be addressed directly from a
//! position file. The header has one (high-order) bit set per padding bit.

use bitstream_io::{BigEndian, BitRead, BitReader, BitWrite, BitWriter};

use crate::base::{IndexError, IoContext, Result};

pub mod postings;

/// Header byte announcing `padding` zero bits before the code
#[inline]
fn header_byte(padding: u32) -> u8 {
    if padding == 0 {
        0
    } else {
        0xFFu8 << (8 - padding)
    }
}

/// Appends the byte-aligned gamma code of `n` to `out`
pub fn encode_into(n: u32, out: &mut Vec<u8>) -> Result<()> {
    if n == 0 {
        return Err(IndexError::invalid_arg(
            "n",
            "gamma codes can only represent positive integers",
        ));
    }

    let k = u32::BITS - n.leading_zeros();
    let length = 2 * k - 1;
    let padding = (8 - length % 8) % 8;

    out.push(header_byte(padding));

    let mut bit_writer = BitWriter::endian(out, BigEndian);
    if padding > 0 {
        bit_writer
            .write(padding, 0u8)
            .context(|| "writing padding bits".to_string())?;
    }
    bit_writer
        .write_unary0(k - 1)
        .context(|| "writing the unary length".to_string())?;
    if k > 1 {
        bit_writer
            .write(k - 1, n & ((1u32 << (k - 1)) - 1))
            .context(|| "writing the offset bits".to_string())?;
    }
    bit_writer
        .byte_align()
        .context(|| "aligning the gamma code".to_string())?;

    Ok(())
}

/// Returns the byte-aligned gamma code of `n`
pub fn encode(n: u32) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(2);
    encode_into(n, &mut out)?;
    Ok(out)
}

/// Reads consecutive gamma codes from a byte buffer
pub struct GammaReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> GammaReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Byte offset of the next code
    pub fn position(&self) -> usize {
        self.position
    }

    /// Decodes the next value, returning it with the number of bits consumed
    /// (header included), or `None` when the buffer is exhausted
    pub fn next_value(&mut self) -> Result<Option<(u32, u32)>> {
        if self.position >= self.data.len() {
            return Ok(None);
        }

        let header = self.data[self.position];
        let padding = header.count_ones();
        if padding > 7 || header != header_byte(padding) {
            return Err(self.corrupt(format!("invalid header byte {:#010b}", header)));
        }

        let mut bit_reader = BitReader::endian(&self.data[self.position + 1..], BigEndian);

        if padding > 0 {
            let pad: u8 = bit_reader
                .read(padding)
                .map_err(|_| self.corrupt("truncated padding".to_string()))?;
            if pad != 0 {
                return Err(self.corrupt("non-zero padding bits".to_string()));
            }
        }

        let prefix = bit_reader
            .read_unary0()
            .map_err(|_| self.corrupt("truncated unary length".to_string()))?;
        if prefix >= u32::BITS {
            return Err(self.corrupt(format!("code length {} exceeds 32 bits", prefix + 1)));
        }

        let low: u32 = if prefix > 0 {
            bit_reader
                .read(prefix)
                .map_err(|_| self.corrupt("truncated offset bits".to_string()))?
        } else {
            0
        };

        let bits = padding + 2 * prefix + 1;
        if bits % 8 != 0 {
            return Err(self.corrupt(format!("code of {} bits is not byte aligned", bits)));
        }

        self.position += 1 + (bits / 8) as usize;
        Ok(Some(((1u32 << prefix) | low, 8 + bits)))
    }

    fn corrupt(&self, message: String) -> IndexError {
        IndexError::format(format!("gamma code at byte {}", self.position), message)
    }
}

/// Decodes all the codes of a buffer
pub fn decode_sequence(data: &[u8]) -> Result<Vec<u32>> {
    let mut reader = GammaReader::new(data);
    let mut values = Vec::new();
    while let Some((value, _)) = reader.next_value()? {
        values.push(value);
    }
    Ok(values)
}
