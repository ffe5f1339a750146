//! Internal reader adapter for reading H.264 RBSP data.

use crate::error::{Error, Result};
use crate::parser::vlc::{
    Entry, Table, INTER_CBP_CODES, INTRA_CBP_CODES, MONO_INTER_CBP_CODES, MONO_INTRA_CBP_CODES,
};
use crate::traits::BitReadable;
use std::cmp::min;
use std::collections::VecDeque;
use std::io::Read;

/// Longest Exp-Golomb prefix accepted by `read_ue`.
const MAX_LEADING_ZEROS: u32 = 31;

/// A reader over the raw byte sequence payload of one slice.
///
/// Emulation prevention bytes must already have been removed. This reader
/// implements an internal buffer that can be read from as a series of bits
/// into a number of possible types.
pub struct H264Reader<R>
where
    R: Read,
{
    /// The data source to read bits from.
    source: R,

    /// Internal buffer of already-read bitstream data.
    buffer: VecDeque<u8>,

    /// How many bits of the buffer have already been read.
    bits_read: usize,

    /// Set once the source has been drained into the buffer.
    exhausted: bool,

    /// Bit position of the last set bit of the payload, found when the
    /// source is drained.
    stop_bit: Option<usize>,
}

impl<R> H264Reader<R>
where
    R: Read,
{
    /// Wrap a source file in a reader.
    pub fn from_source(source: R) -> Self {
        Self {
            source,
            buffer: VecDeque::new(),
            bits_read: 0,
            exhausted: false,
            stop_bit: None,
        }
    }

    /// Fill the internal read buffer with a given number of bytes.
    ///
    /// This function will yield all I/O errors wrapped inside of the
    /// `UnhandledIoError` variant type, except for an early end of the source
    /// which becomes `UnexpectedEndOfStream`.
    fn buffer_bytes(&mut self, bytes_needed: usize) -> Result<()> {
        if bytes_needed > 0 && self.exhausted {
            return Err(Error::UnexpectedEndOfStream { element: "rbsp" });
        }

        let mut byte = [0];
        for _ in 0..bytes_needed {
            self.source.read_exact(&mut byte[..])?;
            self.buffer.push_back(byte[0]);
        }

        Ok(())
    }

    /// Pull every remaining byte of the source into the buffer.
    fn buffer_to_end(&mut self) -> Result<()> {
        if !self.exhausted {
            let mut rest = Vec::new();
            self.source.read_to_end(&mut rest)?;
            self.buffer.extend(rest);
            self.exhausted = true;

            self.stop_bit = self
                .buffer
                .iter()
                .enumerate()
                .rev()
                .find(|(_, byte)| **byte != 0)
                .map(|(index, byte)| index * 8 + 7 - byte.trailing_zeros() as usize);
        }

        Ok(())
    }

    /// Given a certain number of needed bits, return how many bytes would need
    /// to be buffered to read it.
    fn needed_bytes_for_bits(&mut self, bits_needed: u32) -> usize {
        let bits_available = (self.buffer.len() * 8).saturating_sub(self.bits_read);
        let bits_short = (bits_needed as usize).saturating_sub(bits_available);

        (bits_short / 8) + if bits_short % 8 != 0 { 1 } else { 0 }
    }

    /// Ensure that at least a certain number of additional bits can be read
    /// from the internal buffer.
    fn ensure_bits(&mut self, bits_needed: u32) -> Result<()> {
        let bytes = self.needed_bytes_for_bits(bits_needed);
        self.buffer_bytes(bytes)
    }

    /// Copy an arbitrary number of bits from the stream out into a type.
    ///
    /// The bits are returned starting from the least significant bit of the
    /// returned type, zero-extended.
    ///
    /// This function does not remove bits from the buffer. Repeated calls to
    /// `peek_bits` return the same bits.
    ///
    /// The `bits_needed` must not exceed the maximum width of the type. Any
    /// attempt to do so will result in an error.
    pub fn peek_bits<T: BitReadable>(&mut self, mut bits_needed: u32) -> Result<T> {
        if (T::zero().checked_shl(bits_needed.saturating_sub(1))).is_none() {
            return Err(Error::InternalDecoderError);
        }

        if bits_needed == 0 {
            return Ok(T::zero());
        }

        self.ensure_bits(bits_needed)?;

        let mut accum = T::zero();
        let bytes_read = self.bits_read / 8;
        let mut bits_read = self.bits_read % 8;
        for byte in self.buffer.iter().skip(bytes_read) {
            if bits_needed == 0 {
                break;
            }

            let byte = byte << bits_read;
            let bits_in_byte = 8u32.saturating_sub(bits_read as u32);

            let bits_to_shift_in = min(bits_in_byte, bits_needed);

            if let Some(rem) = accum.checked_shl(bits_to_shift_in) {
                accum = rem | byte.checked_shr(8 - bits_to_shift_in).unwrap_or(0).into();
            } else {
                accum = byte.checked_shr(8 - bits_to_shift_in).unwrap_or(0).into();
            }

            bits_read = 0;
            bits_needed = bits_needed.saturating_sub(bits_to_shift_in);
        }

        if bits_needed != 0 {
            return Err(Error::InternalDecoderError);
        }

        Ok(accum)
    }

    /// Skip forward a certain number of bits in the stream buffer.
    ///
    /// If more bits are requested to be skipped than exist within the buffer,
    /// then they will be read in. If this process generates an IO error of any
    /// kind, it will be returned, and no skipping will take place.
    pub fn skip_bits(&mut self, bits_to_skip: u32) -> Result<()> {
        self.ensure_bits(bits_to_skip)?;

        self.bits_read += bits_to_skip as usize;

        Ok(())
    }

    /// Move an arbitrary number of bits from the stream out into a type.
    ///
    /// This function operates similar to `peek_bits`, but the internal buffer
    /// of this reader will be advanced by the same number of bits that have
    /// been returned.
    pub fn read_bits<T: BitReadable>(&mut self, bits_needed: u32) -> Result<T> {
        let r = self.peek_bits(bits_needed)?;
        self.skip_bits(bits_needed)?;

        Ok(r)
    }

    /// Read a single-bit flag, `u(1)`.
    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits::<u8>(1)? == 1)
    }

    /// The number of bits consumed since the start of the payload.
    pub fn position(&self) -> usize {
        self.bits_read
    }

    /// `byte_aligned()`
    pub fn is_byte_aligned(&self) -> bool {
        self.bits_read % 8 == 0
    }

    /// Determine how many bits we need to skip forward to realign the stream
    /// pointer with the next byte boundary.
    pub fn bits_to_alignment(&self) -> u32 {
        (8 - (self.bits_read % 8) as u32) % 8
    }

    /// `ue(v)`: unsigned Exp-Golomb code.
    ///
    /// Prefixes of more than 31 leading zeros describe values that do not
    /// fit any syntax element and yield `Error::StreamCorrupt`.
    pub fn read_ue(&mut self) -> Result<u32> {
        let mut leading_zeros = 0;

        while !self.read_bit()? {
            leading_zeros += 1;
            if leading_zeros > MAX_LEADING_ZEROS {
                return Err(Error::StreamCorrupt {
                    element: "exp-golomb prefix",
                });
            }
        }

        if leading_zeros == 0 {
            return Ok(0);
        }

        let suffix: u64 = self.read_bits(leading_zeros)?;

        Ok(((1u64 << leading_zeros) - 1 + suffix) as u32)
    }

    /// `se(v)`: signed Exp-Golomb code.
    pub fn read_se(&mut self) -> Result<i32> {
        let code = self.read_ue()? as i64;
        let value = if code % 2 == 1 {
            (code + 1) / 2
        } else {
            -(code / 2)
        };

        Ok(value as i32)
    }

    /// `te(v)`: truncated Exp-Golomb code with the given maximum value.
    ///
    /// A range of one is coded as a single inverted bit. Values above `max`
    /// yield `Error::InvalidSyntaxElement`.
    pub fn read_te(&mut self, max: u32) -> Result<u32> {
        if max == 1 {
            return Ok(!self.read_bit()? as u32);
        }

        let value = self.read_ue()?;
        if value > max {
            return Err(Error::InvalidSyntaxElement {
                element: "te(v)",
                value: value as i64,
            });
        }

        Ok(value)
    }

    /// `me(v)`: `coded_block_pattern` through the mapping of Table 9-4.
    pub fn read_me(&mut self, chroma_array_type: u8, intra: bool) -> Result<u8> {
        let code = self.read_ue()?;
        let map: &[u8] = match (chroma_array_type, intra) {
            (1 | 2, true) => &INTRA_CBP_CODES,
            (1 | 2, false) => &INTER_CBP_CODES,
            (_, true) => &MONO_INTRA_CBP_CODES,
            (_, false) => &MONO_INTER_CBP_CODES,
        };

        map.get(code as usize)
            .copied()
            .ok_or(Error::InvalidSyntaxElement {
                element: "coded_block_pattern",
                value: code as i64,
            })
    }

    /// Read a variable-length code.
    ///
    /// The table consists of a list of `Entry`s. All `Fork`s in the table must
    /// have valid indicies and all links in the table must form a directed
    /// acyclic graph.
    ///
    /// This function yields `Error::InternalDecoderError` in the event that
    /// the given table is invalid, as well as all other unhandled I/O errors.
    /// In the event that an error is returned, the position of the bitstream
    /// is undefined.
    pub fn read_vlc<T: Clone>(&mut self, table: &Table<T>) -> Result<T> {
        let mut index = 0;

        Ok(loop {
            match table.get(index) {
                Some(Entry::End(t)) => break t.clone(),
                Some(Entry::Fork(zero, one)) => {
                    if self.read_bit()? {
                        index = *one;
                    } else {
                        index = *zero;
                    }
                }
                None => return Err(Error::InternalDecoderError),
            }
        })
    }

    /// `more_rbsp_data()`
    ///
    /// True while at least one bit precedes the `rbsp_stop_one_bit`, which is
    /// the last set bit of the payload.
    pub fn more_rbsp_data(&mut self) -> Result<bool> {
        self.buffer_to_end()?;

        Ok(match self.stop_bit {
            Some(stop_bit) => self.bits_read < stop_bit,
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::parser::reader::H264Reader;

    #[test]
    fn read_unaligned_bits() {
        let data = [0xFF, 0x72, 0x1C, 0x1F];
        let mut reader = H264Reader::from_source(&data[..]);

        assert_eq!(0x07, reader.read_bits(3).unwrap());
        assert_eq!(0x3E, reader.read_bits(6).unwrap());
        assert_eq!(0x721C1F, reader.read_bits(23).unwrap());
        assert!(matches!(
            reader.read_bits::<u8>(1),
            Err(Error::UnexpectedEndOfStream { .. })
        ));
    }

    #[test]
    fn peek_bits() {
        let data = [0xFF, 0x72, 0x1C, 0x1F];
        let mut reader = H264Reader::from_source(&data[..]);

        assert_eq!(0x07, reader.peek_bits(3).unwrap());
        assert_eq!(0x3F, reader.peek_bits(6).unwrap());
        assert_eq!(0x7FB90E, reader.peek_bits(23).unwrap());
        reader.peek_bits::<u64>(64).unwrap_err();
    }

    #[test]
    fn exp_golomb() {
        // 1 | 010 | 011 | 00100 | 00101 | 0001000 | 1(pad)
        let data = [0b1010_0110, 0b0100_0010, 0b1000_1000, 0b1000_0000];
        let mut reader = H264Reader::from_source(&data[..]);

        assert_eq!(0, reader.read_ue().unwrap());
        assert_eq!(1, reader.read_ue().unwrap());
        assert_eq!(-1, reader.read_se().unwrap());
        assert_eq!(2, reader.read_se().unwrap());
        assert_eq!(-2, reader.read_se().unwrap());
        assert_eq!(7, reader.read_ue().unwrap());
    }

    #[test]
    fn truncated_exp_golomb() {
        let data = [0b0010_1000];
        let mut reader = H264Reader::from_source(&data[..]);

        assert_eq!(1, reader.read_te(1).unwrap());
        assert_eq!(1, reader.read_te(3).unwrap());
        assert_eq!(0, reader.read_te(1).unwrap());
    }

    #[test]
    fn truncated_exp_golomb_range() {
        // ue 3 = 00100
        let data = [0b0010_0000];
        let mut reader = H264Reader::from_source(&data[..]);

        assert!(matches!(
            reader.read_te(2),
            Err(Error::InvalidSyntaxElement { value: 3, .. })
        ));
    }

    #[test]
    fn overlong_exp_golomb() {
        let data = [0u8; 8];
        let mut reader = H264Reader::from_source(&data[..]);

        assert!(matches!(
            reader.read_ue(),
            Err(Error::StreamCorrupt { .. })
        ));
    }

    #[test]
    fn mapped_exp_golomb() {
        // ue 0 and ue 3
        let data = [0b1001_0000];
        let mut reader = H264Reader::from_source(&data[..]);

        assert_eq!(47, reader.read_me(1, true).unwrap());
        assert_eq!(4, reader.read_me(0, false).unwrap());
    }

    #[test]
    fn more_rbsp_data() {
        let data = [0b1011_0000, 0b0000_0000];
        let mut reader = H264Reader::from_source(&data[..]);

        assert!(reader.more_rbsp_data().unwrap());
        reader.skip_bits(3).unwrap();
        assert!(!reader.more_rbsp_data().unwrap());
        assert_eq!(3, reader.position());
        assert!(!reader.is_byte_aligned());
        assert_eq!(5, reader.bits_to_alignment());
    }

    #[test]
    fn stop_bit_is_located_once() {
        let data = [0b1000_0000, 0b0000_0000, 0b0100_0000, 0b0000_0000];
        let mut reader = H264Reader::from_source(&data[..]);

        reader.skip_bits(1).unwrap();
        assert!(reader.more_rbsp_data().unwrap());
        assert_eq!(Some(17), reader.stop_bit);

        reader.skip_bits(16).unwrap();
        assert!(!reader.more_rbsp_data().unwrap());
        assert_eq!(Some(17), reader.stop_bit);
        assert_eq!(4, reader.buffer.len());
    }
}
