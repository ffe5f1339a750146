//! CABAC binarization of syntax elements and residual blocks

use crate::cabac::{
    bin_string, BinContext, BinEncoder, BlockCategory, MbTypeBins, B_INTRA_PREFIX,
    B_MB_TYPE_BINS, I_MB_TYPE_BINS, P_INTRA_PREFIX, P_MB_TYPE_BINS, SI_MB_TYPE_PREFIX_BINS,
    SUB_B_MB_TYPE_BINS, SUB_P_MB_TYPE_BINS,
};
use crate::error::{Error, Result};
use crate::types::{CodedBlockPattern, Macroblock, MbType, SliceType, SubMbType, P_8X8_REF0};
use crate::writer::BitWriter;

/// Longest unary code written for `ref_idx` and `mb_qp_delta`.
const MAX_UNARY: u32 = 256;

fn invalid(element: &'static str, value: i64) -> Error {
    Error::InvalidSyntaxElement { element, value }
}

/// A CABAC engine bound to the payload it encodes.
///
/// Each method emits exactly the bins, in the same contexts, that the
/// matching `CabacReader` method consumes.
pub struct CabacWriter<'a, B> {
    pub engine: &'a mut B,
    pub writer: &'a mut BitWriter,
}

impl<'a, B> CabacWriter<'a, B>
where
    B: BinEncoder,
{
    pub fn new(engine: &'a mut B, writer: &'a mut BitWriter) -> Self {
        Self { engine, writer }
    }

    fn decision(&mut self, ctx: BinContext, mb: &Macroblock, bin: bool) -> Result<()> {
        self.engine.encode_decision(self.writer, ctx, mb, bin)
    }

    fn bypass(&mut self, bin: bool) -> Result<()> {
        self.engine.encode_bypass(self.writer, bin)
    }

    fn unary<F>(&mut self, mb: &Macroblock, element: &'static str, value: u32, ctx: F) -> Result<()>
    where
        F: Fn(u8) -> BinContext,
    {
        if value > MAX_UNARY {
            return Err(invalid(element, value as i64));
        }

        for bin_idx in 0..value {
            self.decision(ctx(bin_idx.min(255) as u8), mb, true)?;
        }
        self.decision(ctx(value.min(255) as u8), mb, false)
    }

    /// Exp-Golomb bypass suffix of order `k`.
    fn exp_golomb(&mut self, mut value: u32, mut k: u32) -> Result<()> {
        while k < 31 && value >= 1 << k {
            self.bypass(true)?;
            value -= 1 << k;
            k += 1;
        }
        self.bypass(false)?;

        while k > 0 {
            k -= 1;
            self.bypass(value >> k & 1 == 1)?;
        }

        Ok(())
    }

    /// Encode an entry of a `mb_type` bin-string table.
    fn mb_type_bins(&mut self, mb: &Macroblock, table: MbTypeBins, value: usize) -> Result<()> {
        let bins: &[&[u8]] = match table {
            MbTypeBins::I | MbTypeBins::PSuffix | MbTypeBins::BSuffix => &I_MB_TYPE_BINS,
            MbTypeBins::PPrefix => &P_MB_TYPE_BINS,
            MbTypeBins::BPrefix => &B_MB_TYPE_BINS,
            MbTypeBins::SiPrefix => &SI_MB_TYPE_PREFIX_BINS,
        };
        let intra_string = matches!(
            table,
            MbTypeBins::I | MbTypeBins::PSuffix | MbTypeBins::BSuffix
        );

        let string = bin_string(bins, value).ok_or_else(|| invalid("mb_type", value as i64))?;

        let mut prior = 0u32;
        for (bin_idx, bin) in string.enumerate() {
            if intra_string && bin_idx == 1 {
                self.engine.encode_terminate(self.writer, bin)?;
            } else {
                let ctx = BinContext::MbType {
                    table,
                    bin_idx: bin_idx as u8,
                    prior,
                };
                self.decision(ctx, mb, bin)?;
            }
            prior |= (bin as u32) << bin_idx;
        }

        Ok(())
    }

    pub fn mb_skip_flag(&mut self, mb: &Macroblock, mb_skip_flag: bool) -> Result<()> {
        self.decision(BinContext::MbSkipFlag, mb, mb_skip_flag)
    }

    pub fn mb_field_decoding_flag(&mut self, mb: &Macroblock, flag: bool) -> Result<()> {
        self.decision(BinContext::MbFieldDecodingFlag, mb, flag)
    }

    pub fn end_of_slice_flag(&mut self, end_of_slice_flag: bool) -> Result<()> {
        self.engine.encode_terminate(self.writer, end_of_slice_flag)
    }

    /// `mb_type`. `P_8x8ref0` has no CABAC binarization.
    pub fn mb_type(&mut self, mb: &Macroblock, slice_type: SliceType, mb_type: MbType) -> Result<()> {
        let reject = || invalid("mb_type", mb_type.code(slice_type).map_or(-1, i64::from));

        match (slice_type, mb_type) {
            (SliceType::I, MbType::I(n)) => self.mb_type_bins(mb, MbTypeBins::I, n as usize),
            (SliceType::Si, MbType::Si) => self.mb_type_bins(mb, MbTypeBins::SiPrefix, 0),
            (SliceType::Si, MbType::I(n)) => {
                self.mb_type_bins(mb, MbTypeBins::SiPrefix, 1)?;
                self.mb_type_bins(mb, MbTypeBins::I, n as usize)
            }
            (SliceType::P | SliceType::Sp, MbType::P(n)) if n < P_8X8_REF0 => {
                self.mb_type_bins(mb, MbTypeBins::PPrefix, n as usize)
            }
            (SliceType::P | SliceType::Sp, MbType::I(n)) => {
                self.mb_type_bins(mb, MbTypeBins::PPrefix, P_INTRA_PREFIX)?;
                self.mb_type_bins(mb, MbTypeBins::PSuffix, n as usize)
            }
            (SliceType::B, MbType::B(n)) if (n as usize) < B_INTRA_PREFIX => {
                self.mb_type_bins(mb, MbTypeBins::BPrefix, n as usize)
            }
            (SliceType::B, MbType::I(n)) => {
                self.mb_type_bins(mb, MbTypeBins::BPrefix, B_INTRA_PREFIX)?;
                self.mb_type_bins(mb, MbTypeBins::BSuffix, n as usize)
            }
            _ => Err(reject()),
        }
    }

    pub fn sub_mb_type(&mut self, mb: &Macroblock, sub_mb_type: SubMbType) -> Result<()> {
        let (b_slice, bins): (bool, &[&[u8]]) = match sub_mb_type {
            SubMbType::B(_) => (true, &SUB_B_MB_TYPE_BINS),
            SubMbType::P(_) => (false, &SUB_P_MB_TYPE_BINS),
        };
        let value = sub_mb_type.code();
        let string =
            bin_string(bins, value as usize).ok_or_else(|| invalid("sub_mb_type", value as i64))?;

        let mut prior = 0u32;
        for (bin_idx, bin) in string.enumerate() {
            let ctx = BinContext::SubMbType {
                b_slice,
                bin_idx: bin_idx as u8,
                prior,
            };
            self.decision(ctx, mb, bin)?;
            prior |= (bin as u32) << bin_idx;
        }

        Ok(())
    }

    pub fn transform_size_8x8_flag(&mut self, mb: &Macroblock, flag: bool) -> Result<()> {
        self.decision(BinContext::TransformSize8x8Flag, mb, flag)
    }

    pub fn coded_block_pattern(
        &mut self,
        mb: &Macroblock,
        chroma_array_type: u8,
        cbp: CodedBlockPattern,
    ) -> Result<()> {
        let mut prior = 0u8;
        for blk8x8 in 0..4 {
            let bin = cbp.luma_coded(blk8x8 as usize);
            self.decision(
                BinContext::CodedBlockPatternLuma { blk8x8, prior },
                mb,
                bin,
            )?;
            prior |= (bin as u8) << blk8x8;
        }

        if matches!(chroma_array_type, 1 | 2) {
            for bin_idx in 0..2 {
                let bin = cbp.chroma > bin_idx;
                self.decision(BinContext::CodedBlockPatternChroma { bin_idx }, mb, bin)?;
                if !bin {
                    break;
                }
            }
        }

        Ok(())
    }

    pub fn mb_qp_delta(&mut self, mb: &Macroblock, mb_qp_delta: i32) -> Result<()> {
        let mapped = if mb_qp_delta > 0 {
            2 * mb_qp_delta as i64 - 1
        } else {
            -2 * mb_qp_delta as i64
        };
        if mapped > MAX_UNARY as i64 {
            return Err(invalid("mb_qp_delta", mb_qp_delta as i64));
        }

        self.unary(mb, "mb_qp_delta", mapped as u32, |bin_idx| {
            BinContext::MbQpDelta { bin_idx }
        })
    }

    pub fn prev_intra_pred_mode_flag(&mut self, mb: &Macroblock, flag: bool) -> Result<()> {
        self.decision(BinContext::PrevIntraPredModeFlag, mb, flag)
    }

    pub fn rem_intra_pred_mode(&mut self, mb: &Macroblock, mode: u8) -> Result<()> {
        if mode > 7 {
            return Err(invalid("rem_intra_pred_mode", mode as i64));
        }

        for bit in 0..3 {
            self.decision(BinContext::RemIntraPredMode, mb, mode >> bit & 1 == 1)?;
        }

        Ok(())
    }

    pub fn intra_chroma_pred_mode(&mut self, mb: &Macroblock, mode: u8) -> Result<()> {
        if mode > 3 {
            return Err(invalid("intra_chroma_pred_mode", mode as i64));
        }

        for bin_idx in 0..3 {
            let bin = mode > bin_idx;
            self.decision(BinContext::IntraChromaPredMode { bin_idx }, mb, bin)?;
            if !bin {
                break;
            }
        }

        Ok(())
    }

    pub fn ref_idx(&mut self, mb: &Macroblock, list: usize, part: usize, value: u32) -> Result<()> {
        self.unary(mb, "ref_idx", value, |bin_idx| BinContext::RefIdx {
            list: list as u8,
            part: part as u8,
            bin_idx,
        })
    }

    /// One `mvd` component.
    pub fn mvd(
        &mut self,
        mb: &Macroblock,
        list: usize,
        part: usize,
        sub_part: usize,
        component: usize,
        value: i32,
    ) -> Result<()> {
        const U_COFF: u32 = 9;

        let magnitude = value.unsigned_abs();
        let prefix = magnitude.min(U_COFF);
        let ctx = |bin_idx: u32| BinContext::Mvd {
            list: list as u8,
            part: part as u8,
            sub_part: sub_part as u8,
            component: component as u8,
            bin_idx: bin_idx as u8,
        };

        for bin_idx in 0..prefix {
            self.decision(ctx(bin_idx), mb, true)?;
        }
        if prefix < U_COFF {
            self.decision(ctx(prefix), mb, false)?;
        } else {
            self.exp_golomb(magnitude - U_COFF, 3)?;
        }

        if magnitude != 0 {
            self.bypass(value < 0)?;
        }

        Ok(())
    }

    fn coeff_abs_level_minus1(
        &mut self,
        mb: &Macroblock,
        category: BlockCategory,
        num_eq1: u8,
        num_gt1: u8,
        value: u32,
    ) -> Result<()> {
        const U_COFF: u32 = 14;

        let prefix = value.min(U_COFF);
        let ctx = |bin_idx: u32| BinContext::CoeffAbsLevelMinus1 {
            category,
            bin_idx: bin_idx.min(1) as u8,
            num_eq1,
            num_gt1,
        };

        for bin_idx in 0..prefix {
            self.decision(ctx(bin_idx), mb, true)?;
        }
        if prefix < U_COFF {
            self.decision(ctx(prefix), mb, false)
        } else {
            self.exp_golomb(value - U_COFF, 0)
        }
    }

    /// ITU-T Recommendation H.264 (08/2021) 7.3.5.3.3 `residual_block_cabac`
    ///
    /// Encodes the first `max_num_coeff` levels of `coeff_level`. Without a
    /// `coded_block_flag` the block must hold at least one nonzero level.
    pub fn residual_block(
        &mut self,
        mb: &Macroblock,
        category: BlockCategory,
        index: u8,
        max_num_coeff: usize,
        write_coded_block_flag: bool,
        coeff_level: &[i32],
    ) -> Result<()> {
        let levels = &coeff_level[..max_num_coeff.min(coeff_level.len())];
        let last = levels.iter().rposition(|level| *level != 0);

        if write_coded_block_flag {
            self.decision(
                BinContext::CodedBlockFlag { category, index },
                mb,
                last.is_some(),
            )?;
        }

        let last = match last {
            Some(last) => last,
            None if write_coded_block_flag => return Ok(()),
            None => return Err(invalid("coded_block_flag", 0)),
        };

        for (i, level) in levels.iter().enumerate().take(levels.len() - 1) {
            let significant = *level != 0;
            self.decision(
                BinContext::SignificantCoeffFlag {
                    category,
                    position: i as u8,
                },
                mb,
                significant,
            )?;

            if significant {
                self.decision(
                    BinContext::LastSignificantCoeffFlag {
                        category,
                        position: i as u8,
                    },
                    mb,
                    i == last,
                )?;
                if i == last {
                    break;
                }
            }
        }

        let mut num_eq1 = 0u8;
        let mut num_gt1 = 0u8;

        for level in levels[..=last].iter().rev().filter(|level| **level != 0) {
            let abs_level_minus1 = level.unsigned_abs() - 1;

            self.coeff_abs_level_minus1(mb, category, num_eq1, num_gt1, abs_level_minus1)?;
            self.bypass(*level < 0)?;

            if abs_level_minus1 == 0 {
                num_eq1 = num_eq1.saturating_add(1);
            } else {
                num_gt1 = num_gt1.saturating_add(1);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::cabac::{Bin, BinContext, BinTrace, BlockCategory};
    use crate::parser::{CabacReader, H264Reader};
    use crate::types::{CodedBlockPattern, Macroblock, MbType, SliceType, SubMbType};
    use crate::writer::{BitWriter, CabacWriter};

    fn replay(trace: &BinTrace) -> BinTrace {
        BinTrace::from_bins(trace.bins().copied())
    }

    #[test]
    fn residual_block_matches_reader() {
        let mb = Macroblock::new(0, false);
        let mut levels = [0; 16];
        levels[0] = 3;
        levels[4] = -1;
        levels[9] = 40;

        let mut trace = BinTrace::new();
        let mut writer = BitWriter::new();
        CabacWriter::new(&mut trace, &mut writer)
            .residual_block(&mb, BlockCategory::Luma4x4, 3, 16, true, &levels)
            .unwrap();

        let mut replayed = replay(&trace);
        let data = [0u8; 0];
        let mut reader = H264Reader::from_source(&data[..]);
        let mut decoded = [0; 16];
        let count = CabacReader::new(&mut replayed, &mut reader)
            .residual_block(&mb, BlockCategory::Luma4x4, 3, 16, true, &mut decoded)
            .unwrap();

        assert_eq!(3, count);
        assert_eq!(levels, decoded);
        assert!(replayed.is_empty());
    }

    #[test]
    fn uncoded_block_is_a_single_flag() {
        let mb = Macroblock::new(0, false);
        let mut trace = BinTrace::new();
        let mut writer = BitWriter::new();

        CabacWriter::new(&mut trace, &mut writer)
            .residual_block(&mb, BlockCategory::ChromaDc, 1, 4, true, &[0; 4])
            .unwrap();

        assert_eq!(
            vec![Bin::Decision(
                BinContext::CodedBlockFlag {
                    category: BlockCategory::ChromaDc,
                    index: 1,
                },
                false
            )],
            trace.bins().copied().collect::<Vec<_>>()
        );
    }

    #[test]
    fn implied_block_must_be_coded() {
        let mb = Macroblock::new(0, false);
        let mut trace = BinTrace::new();
        let mut writer = BitWriter::new();

        assert!(CabacWriter::new(&mut trace, &mut writer)
            .residual_block(&mb, BlockCategory::Luma8x8, 0, 64, false, &[0; 64])
            .is_err());
    }

    #[test]
    fn syntax_elements_match_reader() {
        let mb = Macroblock::new(0, false);
        let cbp = CodedBlockPattern { luma: 0b1010, chroma: 2 };

        let mut trace = BinTrace::new();
        let mut writer = BitWriter::new();
        {
            let mut cabac = CabacWriter::new(&mut trace, &mut writer);
            cabac.mb_type(&mb, SliceType::B, MbType::I(25)).unwrap();
            cabac.mb_type(&mb, SliceType::P, MbType::P(2)).unwrap();
            cabac.sub_mb_type(&mb, SubMbType::B(11)).unwrap();
            cabac.coded_block_pattern(&mb, 1, cbp).unwrap();
            cabac.mb_qp_delta(&mb, -3).unwrap();
            cabac.rem_intra_pred_mode(&mb, 6).unwrap();
            cabac.intra_chroma_pred_mode(&mb, 3).unwrap();
            cabac.ref_idx(&mb, 1, 2, 4).unwrap();
            cabac.mvd(&mb, 0, 1, 0, 0, -30).unwrap();
            cabac.mvd(&mb, 0, 1, 0, 1, 0).unwrap();
        }

        let mut replayed = replay(&trace);
        let data = [0u8; 0];
        let mut reader = H264Reader::from_source(&data[..]);
        let mut cabac = CabacReader::new(&mut replayed, &mut reader);

        assert_eq!(MbType::I(25), cabac.mb_type(&mb, SliceType::B).unwrap());
        assert_eq!(MbType::P(2), cabac.mb_type(&mb, SliceType::P).unwrap());
        assert_eq!(SubMbType::B(11), cabac.sub_mb_type(&mb, SliceType::B).unwrap());
        assert_eq!(cbp, cabac.coded_block_pattern(&mb, 1).unwrap());
        assert_eq!(-3, cabac.mb_qp_delta(&mb).unwrap());
        assert_eq!(6, cabac.rem_intra_pred_mode(&mb).unwrap());
        assert_eq!(3, cabac.intra_chroma_pred_mode(&mb).unwrap());
        assert_eq!(4, cabac.ref_idx(&mb, 1, 2).unwrap());
        assert_eq!(-30, cabac.mvd(&mb, 0, 1, 0, 0).unwrap());
        assert_eq!(0, cabac.mvd(&mb, 0, 1, 0, 1).unwrap());
        assert!(replayed.is_empty());
    }

    #[test]
    fn p_8x8_ref0_has_no_binarization() {
        let mb = Macroblock::new(0, false);
        let mut trace = BinTrace::new();
        let mut writer = BitWriter::new();

        assert!(CabacWriter::new(&mut trace, &mut writer)
            .mb_type(&mb, SliceType::P, MbType::P(4))
            .is_err());
        assert!(trace.is_empty());
    }
}
