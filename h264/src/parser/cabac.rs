//! CABAC syntax elements and residual blocks

use crate::cabac::{
    match_bin_string, BinContext, BinDecoder, BlockCategory, MbTypeBins, B_INTRA_PREFIX,
    B_MB_TYPE_BINS, I_MB_TYPE_BINS, P_INTRA_PREFIX, P_MB_TYPE_BINS, SI_MB_TYPE_PREFIX_BINS,
    SUB_B_MB_TYPE_BINS, SUB_P_MB_TYPE_BINS,
};
use crate::error::{Error, Result};
use crate::parser::reader::H264Reader;
use crate::types::{CodedBlockPattern, Macroblock, MbType, SliceType, SubMbType};
use std::convert::TryFrom;
use std::io::Read;

/// Longest unary prefix accepted for `ref_idx` and `mb_qp_delta`.
const MAX_UNARY: u32 = 256;

/// Longest Exp-Golomb escape accepted in `mvd` and level suffixes.
const MAX_EG_PREFIX: u32 = 30;

/// A CABAC engine bound to the payload it decodes.
pub struct CabacReader<'a, B, R>
where
    R: Read,
{
    pub engine: &'a mut B,
    pub reader: &'a mut H264Reader<R>,
}

impl<'a, B, R> CabacReader<'a, B, R>
where
    B: BinDecoder,
    R: Read,
{
    pub fn new(engine: &'a mut B, reader: &'a mut H264Reader<R>) -> Self {
        Self { engine, reader }
    }

    fn decision(&mut self, ctx: BinContext, mb: &Macroblock, element: &'static str) -> Result<bool> {
        self.engine
            .decode_decision(self.reader, ctx, mb)
            .map_err(|e| e.within(element))
    }

    fn bypass(&mut self, element: &'static str) -> Result<bool> {
        self.engine
            .decode_bypass(self.reader)
            .map_err(|e| e.within(element))
    }

    fn terminate(&mut self, element: &'static str) -> Result<bool> {
        self.engine
            .decode_terminate(self.reader)
            .map_err(|e| e.within(element))
    }

    /// Unary bins, each coded in the context `ctx` builds from its index.
    fn unary<F>(&mut self, mb: &Macroblock, element: &'static str, ctx: F) -> Result<u32>
    where
        F: Fn(u8) -> BinContext,
    {
        let mut value = 0;

        while self.decision(ctx(value.min(255) as u8), mb, element)? {
            value += 1;
            if value > MAX_UNARY {
                return Err(Error::StreamCorrupt { element });
            }
        }

        Ok(value)
    }

    /// Exp-Golomb bypass suffix of order `k`.
    fn exp_golomb(&mut self, mut k: u32, element: &'static str) -> Result<u32> {
        let mut value = 0u32;

        while self.bypass(element)? {
            value = value
                .checked_add(1 << k)
                .ok_or(Error::StreamCorrupt { element })?;
            k += 1;
            if k > MAX_EG_PREFIX {
                return Err(Error::StreamCorrupt { element });
            }
        }

        while k > 0 {
            k -= 1;
            value += (self.bypass(element)? as u32) << k;
        }

        Ok(value)
    }

    pub fn mb_skip_flag(&mut self, mb: &Macroblock) -> Result<bool> {
        self.decision(BinContext::MbSkipFlag, mb, "mb_skip_flag")
    }

    pub fn mb_field_decoding_flag(&mut self, mb: &Macroblock) -> Result<bool> {
        self.decision(
            BinContext::MbFieldDecodingFlag,
            mb,
            "mb_field_decoding_flag",
        )
    }

    pub fn end_of_slice_flag(&mut self) -> Result<bool> {
        self.terminate("end_of_slice_flag")
    }

    /// Decode an entry of a `mb_type` bin-string table.
    ///
    /// Bin 1 of the I-type strings is a terminating bin.
    fn mb_type_bins(&mut self, mb: &Macroblock, table: MbTypeBins) -> Result<usize> {
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

        match_bin_string(bins, "mb_type", |bin_idx, prior| {
            if intra_string && bin_idx == 1 {
                self.terminate("mb_type")
            } else {
                self.decision(
                    BinContext::MbType {
                        table,
                        bin_idx,
                        prior,
                    },
                    mb,
                    "mb_type",
                )
            }
        })
    }

    /// `mb_type`, binarized per clause 9.3.2.5.
    pub fn mb_type(&mut self, mb: &Macroblock, slice_type: SliceType) -> Result<MbType> {
        let intra = |value: usize| MbType::I(value as u8);

        Ok(match slice_type {
            SliceType::I => intra(self.mb_type_bins(mb, MbTypeBins::I)?),
            SliceType::Si => match self.mb_type_bins(mb, MbTypeBins::SiPrefix)? {
                0 => MbType::Si,
                _ => intra(self.mb_type_bins(mb, MbTypeBins::I)?),
            },
            SliceType::P | SliceType::Sp => match self.mb_type_bins(mb, MbTypeBins::PPrefix)? {
                P_INTRA_PREFIX => intra(self.mb_type_bins(mb, MbTypeBins::PSuffix)?),
                value => MbType::P(value as u8),
            },
            SliceType::B => match self.mb_type_bins(mb, MbTypeBins::BPrefix)? {
                B_INTRA_PREFIX => intra(self.mb_type_bins(mb, MbTypeBins::BSuffix)?),
                value => MbType::B(value as u8),
            },
        })
    }

    pub fn sub_mb_type(&mut self, mb: &Macroblock, slice_type: SliceType) -> Result<SubMbType> {
        let b_slice = slice_type.is_b();
        let bins: &[&[u8]] = if b_slice {
            &SUB_B_MB_TYPE_BINS
        } else {
            &SUB_P_MB_TYPE_BINS
        };

        let value = match_bin_string(bins, "sub_mb_type", |bin_idx, prior| {
            self.decision(
                BinContext::SubMbType {
                    b_slice,
                    bin_idx,
                    prior,
                },
                mb,
                "sub_mb_type",
            )
        })?;

        SubMbType::from_code(slice_type, value as u32).ok_or(Error::InvalidSyntaxElement {
            element: "sub_mb_type",
            value: value as i64,
        })
    }

    pub fn transform_size_8x8_flag(&mut self, mb: &Macroblock) -> Result<bool> {
        self.decision(
            BinContext::TransformSize8x8Flag,
            mb,
            "transform_size_8x8_flag",
        )
    }

    /// `coded_block_pattern`: four luma bins, then a TU(2) chroma suffix when
    /// chroma is coded separately.
    pub fn coded_block_pattern(
        &mut self,
        mb: &Macroblock,
        chroma_array_type: u8,
    ) -> Result<CodedBlockPattern> {
        let mut luma = 0u8;
        for blk8x8 in 0..4 {
            let bin = self.decision(
                BinContext::CodedBlockPatternLuma {
                    blk8x8,
                    prior: luma,
                },
                mb,
                "coded_block_pattern",
            )?;
            luma |= (bin as u8) << blk8x8;
        }

        let mut chroma = 0;
        if matches!(chroma_array_type, 1 | 2) {
            while chroma < 2
                && self.decision(
                    BinContext::CodedBlockPatternChroma { bin_idx: chroma },
                    mb,
                    "coded_block_pattern",
                )?
            {
                chroma += 1;
            }
        }

        Ok(CodedBlockPattern { luma, chroma })
    }

    /// `mb_qp_delta`, unary coded through the mapping of Table 9-3.
    pub fn mb_qp_delta(&mut self, mb: &Macroblock) -> Result<i32> {
        let mapped = self.unary(mb, "mb_qp_delta", |bin_idx| BinContext::MbQpDelta {
            bin_idx,
        })? as i32;

        Ok(if mapped % 2 == 1 {
            (mapped + 1) / 2
        } else {
            -(mapped / 2)
        })
    }

    pub fn prev_intra_pred_mode_flag(&mut self, mb: &Macroblock) -> Result<bool> {
        self.decision(
            BinContext::PrevIntraPredModeFlag,
            mb,
            "prev_intra_pred_mode_flag",
        )
    }

    /// `rem_intra4x4_pred_mode` and `rem_intra8x8_pred_mode`, three bins with
    /// the least significant first.
    pub fn rem_intra_pred_mode(&mut self, mb: &Macroblock) -> Result<u8> {
        let mut mode = 0;
        for bit in 0..3 {
            let bin = self.decision(BinContext::RemIntraPredMode, mb, "rem_intra_pred_mode")?;
            mode |= (bin as u8) << bit;
        }

        Ok(mode)
    }

    pub fn intra_chroma_pred_mode(&mut self, mb: &Macroblock) -> Result<u8> {
        let mut mode = 0;
        while mode < 3
            && self.decision(
                BinContext::IntraChromaPredMode { bin_idx: mode },
                mb,
                "intra_chroma_pred_mode",
            )?
        {
            mode += 1;
        }

        Ok(mode)
    }

    pub fn ref_idx(&mut self, mb: &Macroblock, list: usize, part: usize) -> Result<u32> {
        self.unary(mb, "ref_idx", |bin_idx| BinContext::RefIdx {
            list: list as u8,
            part: part as u8,
            bin_idx,
        })
    }

    /// One `mvd` component: TU prefix with cutoff 9, third order Exp-Golomb
    /// suffix and a sign.
    pub fn mvd(
        &mut self,
        mb: &Macroblock,
        list: usize,
        part: usize,
        sub_part: usize,
        component: usize,
    ) -> Result<i32> {
        const U_COFF: u32 = 9;

        let mut prefix = 0;
        while prefix < U_COFF
            && self.decision(
                BinContext::Mvd {
                    list: list as u8,
                    part: part as u8,
                    sub_part: sub_part as u8,
                    component: component as u8,
                    bin_idx: prefix as u8,
                },
                mb,
                "mvd",
            )?
        {
            prefix += 1;
        }

        let mut magnitude = prefix;
        if prefix == U_COFF {
            magnitude += self.exp_golomb(3, "mvd")?;
        }

        if magnitude == 0 {
            return Ok(0);
        }

        let magnitude =
            i32::try_from(magnitude).map_err(|_| Error::StreamCorrupt { element: "mvd" })?;
        Ok(if self.bypass("mvd")? {
            -magnitude
        } else {
            magnitude
        })
    }

    /// `coeff_abs_level_minus1`: TU prefix with cutoff 14 and a zeroth order
    /// Exp-Golomb suffix.
    fn coeff_abs_level_minus1(
        &mut self,
        mb: &Macroblock,
        category: BlockCategory,
        num_eq1: u8,
        num_gt1: u8,
    ) -> Result<u32> {
        const U_COFF: u32 = 14;

        let mut prefix = 0;
        while prefix < U_COFF
            && self.decision(
                BinContext::CoeffAbsLevelMinus1 {
                    category,
                    bin_idx: prefix.min(1) as u8,
                    num_eq1,
                    num_gt1,
                },
                mb,
                "coeff_abs_level_minus1",
            )?
        {
            prefix += 1;
        }

        if prefix == U_COFF {
            Ok(prefix + self.exp_golomb(0, "coeff_abs_level_minus1")?)
        } else {
            Ok(prefix)
        }
    }

    /// ITU-T Recommendation H.264 (08/2021) 7.3.5.3.3 `residual_block_cabac`
    ///
    /// `coeff_level` receives `max_num_coeff` levels in scan order. When
    /// `read_coded_block_flag` is unset the block is known to be coded.
    /// Returns the number of nonzero levels.
    pub fn residual_block(
        &mut self,
        mb: &Macroblock,
        category: BlockCategory,
        index: u8,
        max_num_coeff: usize,
        read_coded_block_flag: bool,
        coeff_level: &mut [i32],
    ) -> Result<u8> {
        for level in coeff_level.iter_mut() {
            *level = 0;
        }

        if read_coded_block_flag
            && !self.decision(
                BinContext::CodedBlockFlag { category, index },
                mb,
                "coded_block_flag",
            )?
        {
            return Ok(0);
        }

        let max_num_coeff = max_num_coeff.min(coeff_level.len());
        let mut significant = [false; 64];
        let mut num_coeff = max_num_coeff;
        let mut i = 0;

        while i + 1 < num_coeff {
            significant[i] = self.decision(
                BinContext::SignificantCoeffFlag {
                    category,
                    position: i as u8,
                },
                mb,
                "significant_coeff_flag",
            )?;

            if significant[i]
                && self.decision(
                    BinContext::LastSignificantCoeffFlag {
                        category,
                        position: i as u8,
                    },
                    mb,
                    "last_significant_coeff_flag",
                )?
            {
                num_coeff = i + 1;
            }

            i += 1;
        }
        significant[num_coeff - 1] = true;

        let mut num_eq1 = 0u8;
        let mut num_gt1 = 0u8;
        let mut count = 0;

        for i in (0..num_coeff).rev() {
            if !significant[i] {
                continue;
            }

            let abs_level_minus1 = self.coeff_abs_level_minus1(mb, category, num_eq1, num_gt1)?;
            let magnitude =
                i32::try_from(abs_level_minus1 + 1).map_err(|_| Error::StreamCorrupt {
                    element: "coeff_abs_level_minus1",
                })?;
            let coeff_sign_flag = self.bypass("coeff_sign_flag")?;

            coeff_level[i] = if coeff_sign_flag { -magnitude } else { magnitude };
            count += 1;

            if abs_level_minus1 == 0 {
                num_eq1 = num_eq1.saturating_add(1);
            } else {
                num_gt1 = num_gt1.saturating_add(1);
            }
        }

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use crate::cabac::{Bin, BinContext, BinTrace, BlockCategory, MbTypeBins};
    use crate::parser::cabac::CabacReader;
    use crate::parser::reader::H264Reader;
    use crate::types::{Macroblock, MbType, SliceType};

    fn significant(position: u8, bin: bool) -> Bin {
        Bin::Decision(
            BinContext::SignificantCoeffFlag {
                category: BlockCategory::Luma4x4,
                position,
            },
            bin,
        )
    }

    fn last(position: u8, bin: bool) -> Bin {
        Bin::Decision(
            BinContext::LastSignificantCoeffFlag {
                category: BlockCategory::Luma4x4,
                position,
            },
            bin,
        )
    }

    fn level(bin_idx: u8, num_eq1: u8, num_gt1: u8, bin: bool) -> Bin {
        Bin::Decision(
            BinContext::CoeffAbsLevelMinus1 {
                category: BlockCategory::Luma4x4,
                bin_idx,
                num_eq1,
                num_gt1,
            },
            bin,
        )
    }

    #[test]
    fn significance_map_stops_at_last() {
        let mut trace = BinTrace::from_bins(vec![
            Bin::Decision(
                BinContext::CodedBlockFlag {
                    category: BlockCategory::Luma4x4,
                    index: 5,
                },
                true,
            ),
            significant(0, true),
            last(0, false),
            significant(1, false),
            significant(2, true),
            last(2, true),
            // position 2: magnitude 2, negative
            level(0, 0, 0, true),
            level(1, 0, 0, false),
            Bin::Bypass(true),
            // position 0: magnitude 1, positive
            level(0, 0, 1, false),
            Bin::Bypass(false),
        ]);
        let data = [0u8; 0];
        let mut reader = H264Reader::from_source(&data[..]);
        let mb = Macroblock::new(0, false);
        let mut coeff_level = [7; 16];

        let count = CabacReader::new(&mut trace, &mut reader)
            .residual_block(&mb, BlockCategory::Luma4x4, 5, 16, true, &mut coeff_level)
            .unwrap();

        assert_eq!(2, count);
        assert_eq!(1, coeff_level[0]);
        assert_eq!(-2, coeff_level[2]);
        assert!(coeff_level[3..].iter().all(|level| *level == 0));
        assert!(trace.is_empty());
    }

    #[test]
    fn last_position_is_implied() {
        let mut bins = vec![];
        for position in 0..15 {
            bins.push(significant(position, false));
        }
        bins.push(level(0, 0, 0, false));
        bins.push(Bin::Bypass(false));

        let mut trace = BinTrace::from_bins(bins);
        let data = [0u8; 0];
        let mut reader = H264Reader::from_source(&data[..]);
        let mb = Macroblock::new(0, false);
        let mut coeff_level = [0; 16];

        CabacReader::new(&mut trace, &mut reader)
            .residual_block(&mb, BlockCategory::Luma4x4, 0, 16, false, &mut coeff_level)
            .unwrap();

        assert_eq!(1, coeff_level[15]);
        assert!(trace.is_empty());
    }

    #[test]
    fn intra_mb_type_in_p_slice() {
        let prefix = |bin_idx, prior, bin| {
            Bin::Decision(
                BinContext::MbType {
                    table: MbTypeBins::PPrefix,
                    bin_idx,
                    prior,
                },
                bin,
            )
        };
        let suffix = |bin_idx, prior, bin| {
            Bin::Decision(
                BinContext::MbType {
                    table: MbTypeBins::PSuffix,
                    bin_idx,
                    prior,
                },
                bin,
            )
        };
        let mut trace = BinTrace::from_bins(vec![
            prefix(0, 0, true),
            suffix(0, 0, true),
            Bin::Terminate(true),
        ]);
        let data = [0u8; 0];
        let mut reader = H264Reader::from_source(&data[..]);
        let mb = Macroblock::new(0, false);

        let mb_type = CabacReader::new(&mut trace, &mut reader)
            .mb_type(&mb, SliceType::P)
            .unwrap();

        assert_eq!(MbType::I(25), mb_type);
    }

    #[test]
    fn mvd_escape() {
        let mut bins = vec![];
        for bin_idx in 0..9 {
            bins.push(Bin::Decision(
                BinContext::Mvd {
                    list: 1,
                    part: 0,
                    sub_part: 2,
                    component: 1,
                    bin_idx,
                },
                true,
            ));
        }
        // EG3 suffix: escape bins 1 0 and the four bits 0101 give 8 + 5,
        // then a negative sign.
        bins.extend(
            [true, false, false, true, false, true, true]
                .iter()
                .map(|bin| Bin::Bypass(*bin)),
        );

        let mut trace = BinTrace::from_bins(bins);
        let data = [0u8; 0];
        let mut reader = H264Reader::from_source(&data[..]);
        let mb = Macroblock::new(0, false);

        let mvd = CabacReader::new(&mut trace, &mut reader)
            .mvd(&mb, 1, 0, 2, 1)
            .unwrap();

        assert_eq!(-(9 + 13), mvd);
    }
}
