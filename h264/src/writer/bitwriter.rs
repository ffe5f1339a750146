//! Bitstream writer

use crate::error::{Error, Result};
use crate::parser::vlc::cbp_code_num;

/// Writes an RBSP, most significant bit first.
///
/// The counterpart of `H264Reader`: every `write_*` method produces exactly
/// the bits the matching `read_*` method consumes.
#[derive(Clone, Debug, Default)]
pub struct BitWriter {
    data: Vec<u8>,

    /// Bits of the partially filled last byte.
    current_byte: u8,

    /// Number of bits held in `current_byte` (0-7).
    bit_count: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of bits written.
    pub fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.bit_count as usize
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.bit_count == 0
    }

    pub fn write_bit(&mut self, bit: bool) {
        self.current_byte = (self.current_byte << 1) | bit as u8;
        self.bit_count += 1;
        if self.bit_count == 8 {
            self.data.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// Write the low `n` bits of `value`, up to 32.
    pub fn write_bits(&mut self, value: u32, n: u32) {
        let mut remaining = n.min(32);

        while remaining > 0 {
            let available = 8 - self.bit_count as u32;
            let to_write = remaining.min(available);
            let shift = remaining - to_write;
            let bits = ((value >> shift) & ((1u32 << to_write) - 1)) as u8;

            self.current_byte = if to_write == 8 {
                bits
            } else {
                (self.current_byte << to_write) | bits
            };
            self.bit_count += to_write as u8;

            if self.bit_count == 8 {
                self.data.push(self.current_byte);
                self.current_byte = 0;
                self.bit_count = 0;
            }

            remaining -= to_write;
        }
    }

    /// `ue(v)`
    pub fn write_ue(&mut self, value: u32) -> Result<()> {
        let code = (value as u64) + 1;
        if code > u32::MAX as u64 {
            return Err(Error::InvalidSyntaxElement {
                element: "ue(v)",
                value: value as i64,
            });
        }

        let len = 32 - (code as u32).leading_zeros();
        self.write_bits(0, len - 1);
        self.write_bits(code as u32, len);

        Ok(())
    }

    /// `se(v)`
    pub fn write_se(&mut self, value: i32) -> Result<()> {
        let mapped = if value > 0 {
            2 * value as i64 - 1
        } else {
            -2 * value as i64
        };

        if mapped > u32::MAX as i64 - 1 {
            return Err(Error::InvalidSyntaxElement {
                element: "se(v)",
                value: value as i64,
            });
        }

        self.write_ue(mapped as u32)
    }

    /// `te(v)` with the given maximum value.
    pub fn write_te(&mut self, max: u32, value: u32) -> Result<()> {
        if value > max {
            return Err(Error::InvalidSyntaxElement {
                element: "te(v)",
                value: value as i64,
            });
        }

        if max == 1 {
            self.write_bit(value == 0);
            Ok(())
        } else {
            self.write_ue(value)
        }
    }

    /// `me(v)` for a `coded_block_pattern`.
    pub fn write_me(&mut self, chroma_array_type: u8, intra: bool, cbp: u8) -> Result<()> {
        let code = cbp_code_num(chroma_array_type, intra, cbp).ok_or(
            Error::InvalidSyntaxElement {
                element: "coded_block_pattern",
                value: cbp as i64,
            },
        )?;

        self.write_ue(code)
    }

    /// Pad to the next byte boundary with copies of `bit`.
    pub fn align_with(&mut self, bit: bool) {
        while !self.is_byte_aligned() {
            self.write_bit(bit);
        }
    }

    /// `rbsp_trailing_bits()`
    pub fn write_rbsp_trailing_bits(&mut self) {
        self.write_bit(true);
        self.align_with(false);
    }

    /// The bytes written so far, with a partial last byte padded by zeros.
    pub fn into_bytes(mut self) -> Vec<u8> {
        if self.bit_count > 0 {
            let pad = 8 - self.bit_count;
            self.data.push(self.current_byte << pad);
        }

        self.data
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::H264Reader;
    use crate::writer::BitWriter;

    #[test]
    fn bits_across_bytes() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b1011, 4);
        writer.write_bits(0b0001_0101, 8);
        writer.write_bit(true);

        assert_eq!(13, writer.bits_written());
        assert_eq!(vec![0b1011_0001, 0b0101_1000], writer.into_bytes());
    }

    #[test]
    fn exp_golomb_codes() {
        let mut writer = BitWriter::new();
        writer.write_ue(0).unwrap();
        writer.write_ue(4).unwrap();
        writer.write_se(-2).unwrap();
        writer.write_te(1, 0).unwrap();
        writer.write_te(4, 3).unwrap();
        writer.write_me(1, false, 0).unwrap();
        writer.write_rbsp_trailing_bits();

        let data = writer.into_bytes();
        let mut reader = H264Reader::from_source(&data[..]);
        assert_eq!(0, reader.read_ue().unwrap());
        assert_eq!(4, reader.read_ue().unwrap());
        assert_eq!(-2, reader.read_se().unwrap());
        assert_eq!(0, reader.read_te(1).unwrap());
        assert_eq!(3, reader.read_te(4).unwrap());
        assert_eq!(0, reader.read_me(1, false).unwrap());
        assert!(!reader.more_rbsp_data().unwrap());
    }

    #[test]
    fn out_of_range_values() {
        let mut writer = BitWriter::new();

        assert!(writer.write_te(2, 3).is_err());
        assert!(writer.write_me(0, true, 16).is_err());
        assert!(writer.write_ue(u32::MAX).is_err());
        assert_eq!(0, writer.bits_written());
    }
}
