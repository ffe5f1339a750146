//! Context-adaptive binary arithmetic coding seam
//!
//! The arithmetic engine and the derivation of `ctxIdx` from neighbouring
//! macroblocks live behind `BinDecoder` and `BinEncoder`. This module names
//! every context-coded bin with the information the engine needs, and holds
//! the binarization tables shared by the parser and the writer.

use crate::error::{Error, Result};
use crate::parser::H264Reader;
use crate::types::Macroblock;
use crate::writer::BitWriter;
use std::collections::VecDeque;
use std::io::Read;

/// `ctxBlockCat`, ITU-T Recommendation H.264 (08/2021) Table 9-42.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BlockCategory {
    LumaDc,
    LumaAc,
    Luma4x4,
    ChromaDc,
    ChromaAc,
    Luma8x8,
    CbDc,
    CbAc,
    Cb4x4,
    Cb8x8,
    CrDc,
    CrAc,
    Cr4x4,
    Cr8x8,
}

impl BlockCategory {
    pub fn ctx_block_cat(self) -> u8 {
        self as u8
    }

    /// The Intra16x16 DC category of a plane coded with the luma syntax.
    pub fn dc(plane: usize) -> Self {
        [Self::LumaDc, Self::CbDc, Self::CrDc][plane.min(2)]
    }

    /// The Intra16x16 AC category of a plane.
    pub fn ac(plane: usize) -> Self {
        [Self::LumaAc, Self::CbAc, Self::CrAc][plane.min(2)]
    }

    /// The 4x4 category of a plane.
    pub fn block4x4(plane: usize) -> Self {
        [Self::Luma4x4, Self::Cb4x4, Self::Cr4x4][plane.min(2)]
    }

    /// The 8x8 category of a plane.
    pub fn block8x8(plane: usize) -> Self {
        [Self::Luma8x8, Self::Cb8x8, Self::Cr8x8][plane.min(2)]
    }

    /// The plane of a category coded with the luma syntax; `None` for the
    /// chroma categories of 4:2:0 and 4:2:2.
    pub fn plane(self) -> Option<usize> {
        match self {
            Self::LumaDc | Self::LumaAc | Self::Luma4x4 | Self::Luma8x8 => Some(0),
            Self::CbDc | Self::CbAc | Self::Cb4x4 | Self::Cb8x8 => Some(1),
            Self::CrDc | Self::CrAc | Self::Cr4x4 | Self::Cr8x8 => Some(2),
            Self::ChromaDc | Self::ChromaAc => None,
        }
    }

    pub fn is_dc(self) -> bool {
        matches!(self, Self::LumaDc | Self::CbDc | Self::CrDc | Self::ChromaDc)
    }

    pub fn is_8x8(self) -> bool {
        matches!(self, Self::Luma8x8 | Self::Cb8x8 | Self::Cr8x8)
    }
}

/// The `mb_type` binarization a bin belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MbTypeBins {
    /// The single prefix bin of SI slices.
    SiPrefix,

    /// The I-type string of I and SI slices.
    I,

    /// Prefix and intra suffix of P and SP slices.
    PPrefix,
    PSuffix,

    /// Prefix and intra suffix of B slices.
    BPrefix,
    BSuffix,
}

/// A context-coded bin, with the inputs of its `ctxIdxInc` derivation that
/// are local to the current macroblock.
///
/// `prior` fields carry the bins already decoded for the same syntax element,
/// bin 0 in the least significant bit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinContext {
    MbSkipFlag,
    MbFieldDecodingFlag,
    MbType {
        table: MbTypeBins,
        bin_idx: u8,
        prior: u32,
    },
    SubMbType {
        b_slice: bool,
        bin_idx: u8,
        prior: u32,
    },
    TransformSize8x8Flag,
    CodedBlockPatternLuma {
        blk8x8: u8,
        prior: u8,
    },
    CodedBlockPatternChroma {
        bin_idx: u8,
    },
    MbQpDelta {
        bin_idx: u8,
    },
    PrevIntraPredModeFlag,
    RemIntraPredMode,
    IntraChromaPredMode {
        bin_idx: u8,
    },
    RefIdx {
        list: u8,
        part: u8,
        bin_idx: u8,
    },
    Mvd {
        list: u8,
        part: u8,
        sub_part: u8,
        component: u8,
        bin_idx: u8,
    },

    /// `index` is the 4x4 or 8x8 block index for the luma-like categories,
    /// `iCbCr` for `ChromaDc` and `iCbCr * 8 + blk` for `ChromaAc`.
    CodedBlockFlag {
        category: BlockCategory,
        index: u8,
    },
    SignificantCoeffFlag {
        category: BlockCategory,
        position: u8,
    },
    LastSignificantCoeffFlag {
        category: BlockCategory,
        position: u8,
    },
    CoeffAbsLevelMinus1 {
        category: BlockCategory,
        bin_idx: u8,
        num_eq1: u8,
        num_gt1: u8,
    },
}

/// The arithmetic decoding engine of clause 9.3.
///
/// `mb` is the macroblock being decoded, holding every element parsed so far.
/// Neighbouring macroblocks are reported through `macroblock_done`.
pub trait BinDecoder {
    /// Initialise the engine at slice start, and again after `I_PCM` samples.
    fn initialise<R: Read>(&mut self, reader: &mut H264Reader<R>) -> Result<()>;

    fn decode_decision<R: Read>(
        &mut self,
        reader: &mut H264Reader<R>,
        ctx: BinContext,
        mb: &Macroblock,
    ) -> Result<bool>;

    fn decode_bypass<R: Read>(&mut self, reader: &mut H264Reader<R>) -> Result<bool>;

    fn decode_terminate<R: Read>(&mut self, reader: &mut H264Reader<R>) -> Result<bool>;

    /// Called once every macroblock of the slice is complete, skipped ones
    /// included.
    fn macroblock_done(&mut self, _mb: &Macroblock) {}
}

/// The arithmetic encoding engine of clause 9.3.4.
pub trait BinEncoder {
    fn initialise(&mut self, writer: &mut BitWriter) -> Result<()>;

    fn encode_decision(
        &mut self,
        writer: &mut BitWriter,
        ctx: BinContext,
        mb: &Macroblock,
        bin: bool,
    ) -> Result<()>;

    fn encode_bypass(&mut self, writer: &mut BitWriter, bin: bool) -> Result<()>;

    /// Encoding a terminating bin of 1 flushes the engine.
    fn encode_terminate(&mut self, writer: &mut BitWriter, bin: bool) -> Result<()>;

    fn macroblock_done(&mut self, _mb: &Macroblock) {}
}

impl<T> BinDecoder for &mut T
where
    T: BinDecoder,
{
    fn initialise<R: Read>(&mut self, reader: &mut H264Reader<R>) -> Result<()> {
        (**self).initialise(reader)
    }

    fn decode_decision<R: Read>(
        &mut self,
        reader: &mut H264Reader<R>,
        ctx: BinContext,
        mb: &Macroblock,
    ) -> Result<bool> {
        (**self).decode_decision(reader, ctx, mb)
    }

    fn decode_bypass<R: Read>(&mut self, reader: &mut H264Reader<R>) -> Result<bool> {
        (**self).decode_bypass(reader)
    }

    fn decode_terminate<R: Read>(&mut self, reader: &mut H264Reader<R>) -> Result<bool> {
        (**self).decode_terminate(reader)
    }

    fn macroblock_done(&mut self, mb: &Macroblock) {
        (**self).macroblock_done(mb)
    }
}

impl<T> BinEncoder for &mut T
where
    T: BinEncoder,
{
    fn initialise(&mut self, writer: &mut BitWriter) -> Result<()> {
        (**self).initialise(writer)
    }

    fn encode_decision(
        &mut self,
        writer: &mut BitWriter,
        ctx: BinContext,
        mb: &Macroblock,
        bin: bool,
    ) -> Result<()> {
        (**self).encode_decision(writer, ctx, mb, bin)
    }

    fn encode_bypass(&mut self, writer: &mut BitWriter, bin: bool) -> Result<()> {
        (**self).encode_bypass(writer, bin)
    }

    fn encode_terminate(&mut self, writer: &mut BitWriter, bin: bool) -> Result<()> {
        (**self).encode_terminate(writer, bin)
    }

    fn macroblock_done(&mut self, mb: &Macroblock) {
        (**self).macroblock_done(mb)
    }
}

/// One recorded bin.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Bin {
    Decision(BinContext, bool),
    Bypass(bool),
    Terminate(bool),
}

/// A recorded sequence of bins.
///
/// Encoding appends to the trace; decoding replays it from the front and
/// fails with `Error::StreamCorrupt` when the grammar asks for a different
/// kind of bin, or a decision in a different context, than was recorded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BinTrace {
    bins: VecDeque<Bin>,
    initialisations: usize,
}

impl BinTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bins<I: IntoIterator<Item = Bin>>(bins: I) -> Self {
        Self {
            bins: bins.into_iter().collect(),
            initialisations: 0,
        }
    }

    pub fn bins(&self) -> impl Iterator<Item = &Bin> {
        self.bins.iter()
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// How often the engine was (re)initialised.
    pub fn initialisations(&self) -> usize {
        self.initialisations
    }

    fn next(&mut self) -> Result<Bin> {
        self.bins
            .pop_front()
            .ok_or(Error::UnexpectedEndOfStream { element: "cabac bin" })
    }
}

fn mismatch() -> Error {
    Error::StreamCorrupt {
        element: "bin context",
    }
}

impl BinDecoder for BinTrace {
    fn initialise<R: Read>(&mut self, _reader: &mut H264Reader<R>) -> Result<()> {
        self.initialisations += 1;
        Ok(())
    }

    fn decode_decision<R: Read>(
        &mut self,
        _reader: &mut H264Reader<R>,
        ctx: BinContext,
        _mb: &Macroblock,
    ) -> Result<bool> {
        match self.next()? {
            Bin::Decision(recorded, bin) if recorded == ctx => Ok(bin),
            _ => Err(mismatch()),
        }
    }

    fn decode_bypass<R: Read>(&mut self, _reader: &mut H264Reader<R>) -> Result<bool> {
        match self.next()? {
            Bin::Bypass(bin) => Ok(bin),
            _ => Err(mismatch()),
        }
    }

    fn decode_terminate<R: Read>(&mut self, _reader: &mut H264Reader<R>) -> Result<bool> {
        match self.next()? {
            Bin::Terminate(bin) => Ok(bin),
            _ => Err(mismatch()),
        }
    }
}

impl BinEncoder for BinTrace {
    fn initialise(&mut self, _writer: &mut BitWriter) -> Result<()> {
        self.initialisations += 1;
        Ok(())
    }

    fn encode_decision(
        &mut self,
        _writer: &mut BitWriter,
        ctx: BinContext,
        _mb: &Macroblock,
        bin: bool,
    ) -> Result<()> {
        self.bins.push_back(Bin::Decision(ctx, bin));
        Ok(())
    }

    fn encode_bypass(&mut self, _writer: &mut BitWriter, bin: bool) -> Result<()> {
        self.bins.push_back(Bin::Bypass(bin));
        Ok(())
    }

    fn encode_terminate(&mut self, _writer: &mut BitWriter, bin: bool) -> Result<()> {
        self.bins.push_back(Bin::Terminate(bin));
        Ok(())
    }
}

/// The engine type of slices that only ever use CAVLC.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NoCabac {}

impl BinDecoder for NoCabac {
    fn initialise<R: Read>(&mut self, _reader: &mut H264Reader<R>) -> Result<()> {
        match *self {}
    }

    fn decode_decision<R: Read>(
        &mut self,
        _reader: &mut H264Reader<R>,
        _ctx: BinContext,
        _mb: &Macroblock,
    ) -> Result<bool> {
        match *self {}
    }

    fn decode_bypass<R: Read>(&mut self, _reader: &mut H264Reader<R>) -> Result<bool> {
        match *self {}
    }

    fn decode_terminate<R: Read>(&mut self, _reader: &mut H264Reader<R>) -> Result<bool> {
        match *self {}
    }
}

impl BinEncoder for NoCabac {
    fn initialise(&mut self, _writer: &mut BitWriter) -> Result<()> {
        match *self {}
    }

    fn encode_decision(
        &mut self,
        _writer: &mut BitWriter,
        _ctx: BinContext,
        _mb: &Macroblock,
        _bin: bool,
    ) -> Result<()> {
        match *self {}
    }

    fn encode_bypass(&mut self, _writer: &mut BitWriter, _bin: bool) -> Result<()> {
        match *self {}
    }

    fn encode_terminate(&mut self, _writer: &mut BitWriter, _bin: bool) -> Result<()> {
        match *self {}
    }
}

/// `mb_type` prefix of SI slices: `SI` or an I-type suffix.
pub const SI_MB_TYPE_PREFIX_BINS: [&[u8]; 2] = [b"0", b"1"];

/// Table 9-36, `mb_type` of I slices (and intra suffixes), by type number.
pub const I_MB_TYPE_BINS: [&[u8]; 26] = [
    b"0", b"100000", b"100001", b"100010", b"100011", b"1001000", b"1001001", b"1001010",
    b"1001011", b"1001100", b"1001101", b"1001110", b"1001111", b"101000", b"101001", b"101010",
    b"101011", b"1011000", b"1011001", b"1011010", b"1011011", b"1011100", b"1011101", b"1011110",
    b"1011111", b"11",
];

/// Table 9-37, `mb_type` prefixes of P and SP slices. `P_8x8ref0` cannot be
/// coded and the last entry introduces an intra suffix.
pub const P_MB_TYPE_BINS: [&[u8]; 5] = [b"000", b"011", b"010", b"001", b"1"];

/// Index of the intra prefix in `P_MB_TYPE_BINS`.
pub const P_INTRA_PREFIX: usize = 4;

/// Table 9-37, `mb_type` prefixes of B slices; the last entry introduces an
/// intra suffix.
pub const B_MB_TYPE_BINS: [&[u8]; 24] = [
    b"0", b"100", b"101", b"110000", b"110001", b"110010", b"110011", b"110100", b"110101",
    b"110110", b"110111", b"111110", b"1110000", b"1110001", b"1110010", b"1110011", b"1110100",
    b"1110101", b"1110110", b"1110111", b"1111000", b"1111001", b"111111", b"111101",
];

/// Index of the intra prefix in `B_MB_TYPE_BINS`.
pub const B_INTRA_PREFIX: usize = 23;

/// Table 9-38, `sub_mb_type` of P and SP slices.
pub const SUB_P_MB_TYPE_BINS: [&[u8]; 4] = [b"1", b"00", b"011", b"010"];

/// Table 9-38, `sub_mb_type` of B slices.
pub const SUB_B_MB_TYPE_BINS: [&[u8]; 13] = [
    b"0", b"100", b"101", b"11000", b"11001", b"11010", b"11011", b"111000", b"111001", b"111010",
    b"111011", b"11110", b"11111",
];

/// Decode one value of a bin-string table.
///
/// `next_bin` is called with the bin index and the bins read so far. Tables
/// are prefix free, so the first complete match is the value.
pub fn match_bin_string<F>(table: &[&[u8]], element: &'static str, mut next_bin: F) -> Result<usize>
where
    F: FnMut(u8, u32) -> Result<bool>,
{
    let mut prior = 0u32;
    let mut bin_idx = 0;

    loop {
        let bin = next_bin(bin_idx as u8, prior)?;
        prior |= (bin as u32) << bin_idx;
        bin_idx += 1;

        let mut candidates = table.iter().enumerate().filter(|(_, bins)| {
            bins.len() >= bin_idx
                && bins[..bin_idx]
                    .iter()
                    .enumerate()
                    .all(|(i, b)| (*b == b'1') == (prior >> i & 1 == 1))
        });

        let mut any = false;
        for (value, bins) in &mut candidates {
            if bins.len() == bin_idx {
                return Ok(value);
            }
            any = true;
        }

        if !any {
            return Err(Error::InvalidSyntaxElement {
                element,
                value: prior as i64,
            });
        }
    }
}

/// The bins of one table entry, bin 0 first.
pub fn bin_string<'a>(table: &[&'a [u8]], value: usize) -> Option<impl Iterator<Item = bool> + 'a> {
    table
        .get(value)
        .map(|bins| bins.iter().map(|bin| *bin == b'1'))
}

#[cfg(test)]
mod tests {
    use crate::cabac::{
        bin_string, match_bin_string, Bin, BinContext, BinDecoder, BinTrace, B_MB_TYPE_BINS,
        I_MB_TYPE_BINS, SUB_B_MB_TYPE_BINS,
    };
    use crate::error::Error;
    use crate::parser::H264Reader;
    use crate::types::Macroblock;

    fn decode(table: &[&[u8]], bins: &[u8]) -> Result<usize, Error> {
        let mut bins = bins.iter();
        match_bin_string(table, "mb_type", |_, _| {
            bins.next()
                .map(|bin| *bin == b'1')
                .ok_or(Error::UnexpectedEndOfStream { element: "test" })
        })
    }

    #[test]
    fn bin_string_tables_are_prefix_free() {
        for table in [&I_MB_TYPE_BINS[..], &B_MB_TYPE_BINS[..], &SUB_B_MB_TYPE_BINS[..]] {
            for (value, bins) in table.iter().enumerate() {
                assert_eq!(value, decode(table, bins).unwrap());
            }
        }
    }

    #[test]
    fn bin_string_values() {
        assert_eq!(25, decode(&I_MB_TYPE_BINS, b"11").unwrap());
        assert_eq!(12, decode(&I_MB_TYPE_BINS, b"1001111").unwrap());
        assert_eq!(
            vec![true, true, true, true, false, true],
            bin_string(&B_MB_TYPE_BINS, 23).unwrap().collect::<Vec<_>>()
        );
    }

    #[test]
    fn trace_checks_contexts() {
        let data = [0u8; 0];
        let mut reader = H264Reader::from_source(&data[..]);
        let mb = Macroblock::new(0, false);
        let mut trace = BinTrace::from_bins(vec![
            Bin::Decision(BinContext::MbSkipFlag, true),
            Bin::Bypass(false),
        ]);

        assert!(trace
            .decode_decision(&mut reader, BinContext::MbSkipFlag, &mb)
            .unwrap());
        assert!(matches!(
            trace.decode_terminate(&mut reader),
            Err(Error::StreamCorrupt { .. })
        ));
        assert!(matches!(
            trace.decode_bypass(&mut reader),
            Err(Error::UnexpectedEndOfStream { .. })
        ));
    }
}
