//! Entropy-mode dispatch of individual syntax elements
//!
//! Every element of the macroblock grammar is read through `SyntaxReader`,
//! which picks the CAVLC or CABAC coding of the slice and validates the
//! decoded value against the domain of the element.

use crate::cabac::{BinDecoder, BlockCategory};
use crate::context::SliceContext;
use crate::error::{Error, Result};
use crate::neighbour::coeff_token_nc;
use crate::parser::cabac::CabacReader;
use crate::parser::cavlc;
use crate::parser::reader::H264Reader;
use crate::types::{CodedBlockPattern, Macroblock, MbType, ParserOption, SubMbType};
use std::io::Read;

/// The entropy coding selected by `entropy_coding_mode_flag`.
pub enum EntropyDecoder<B> {
    Cavlc,
    Cabac(B),
}

impl<B> EntropyDecoder<B> {
    pub fn is_cabac(&self) -> bool {
        matches!(self, Self::Cabac(_))
    }
}

/// Check one alignment bit against the value the standard mandates.
///
/// A mismatch is an `AlignmentError`, or only a warning when the context
/// allows lenient alignment.
pub fn check_alignment_bit(ctx: &SliceContext, element: &'static str, bit: bool, mandated: bool) -> Result<()> {
    if bit == mandated {
        return Ok(());
    }

    if ctx.options.contains(ParserOption::LENIENT_ALIGNMENT) {
        log::warn!("`{}` is {} instead of {}", element, bit as u8, mandated as u8);
        Ok(())
    } else {
        Err(Error::AlignmentError { element })
    }
}

/// Reads syntax elements of one macroblock.
///
/// `prior` holds the macroblocks of the slice decoded so far, for neighbour
/// dependent derivations.
pub struct SyntaxReader<'a, R, B>
where
    R: Read,
{
    pub reader: &'a mut H264Reader<R>,
    pub entropy: &'a mut EntropyDecoder<B>,
    pub ctx: &'a SliceContext,
    pub prior: &'a [Macroblock],
}

impl<'a, R, B> SyntaxReader<'a, R, B>
where
    R: Read,
    B: BinDecoder,
{
    fn cabac(&mut self) -> Option<CabacReader<'_, B, R>> {
        match self.entropy {
            EntropyDecoder::Cabac(engine) => Some(CabacReader::new(engine, self.reader)),
            EntropyDecoder::Cavlc => None,
        }
    }

    pub fn mb_field_decoding_flag(&mut self, mb: &Macroblock) -> Result<bool> {
        match self.cabac() {
            Some(mut cabac) => cabac.mb_field_decoding_flag(mb),
            None => self
                .reader
                .read_bit()
                .map_err(|e| e.within("mb_field_decoding_flag")),
        }
    }

    pub fn mb_type(&mut self, mb: &Macroblock) -> Result<MbType> {
        let slice_type = self.ctx.slice_type;

        match self.cabac() {
            Some(mut cabac) => cabac.mb_type(mb, slice_type),
            None => {
                let code = self.reader.read_ue().map_err(|e| e.within("mb_type"))?;

                MbType::from_code(slice_type, code).ok_or(Error::InvalidSyntaxElement {
                    element: "mb_type",
                    value: code as i64,
                })
            }
        }
    }

    pub fn sub_mb_type(&mut self, mb: &Macroblock) -> Result<SubMbType> {
        let slice_type = self.ctx.slice_type;

        match self.cabac() {
            Some(mut cabac) => cabac.sub_mb_type(mb, slice_type),
            None => {
                let code = self
                    .reader
                    .read_ue()
                    .map_err(|e| e.within("sub_mb_type"))?;

                SubMbType::from_code(slice_type, code).ok_or(Error::InvalidSyntaxElement {
                    element: "sub_mb_type",
                    value: code as i64,
                })
            }
        }
    }

    pub fn transform_size_8x8_flag(&mut self, mb: &Macroblock) -> Result<bool> {
        match self.cabac() {
            Some(mut cabac) => cabac.transform_size_8x8_flag(mb),
            None => self
                .reader
                .read_bit()
                .map_err(|e| e.within("transform_size_8x8_flag")),
        }
    }

    pub fn coded_block_pattern(&mut self, mb: &Macroblock) -> Result<CodedBlockPattern> {
        let chroma_array_type = self.ctx.chroma_array_type;

        match self.cabac() {
            Some(mut cabac) => cabac.coded_block_pattern(mb, chroma_array_type),
            None => {
                let intra = mb.pred_mode(0).is_intra();
                let cbp = self
                    .reader
                    .read_me(chroma_array_type, intra)
                    .map_err(|e| e.within("coded_block_pattern"))?;

                Ok(CodedBlockPattern::from_code(cbp))
            }
        }
    }

    pub fn mb_qp_delta(&mut self, mb: &Macroblock) -> Result<i32> {
        let value = match self.cabac() {
            Some(mut cabac) => cabac.mb_qp_delta(mb)?,
            None => self.reader.read_se().map_err(|e| e.within("mb_qp_delta"))?,
        };

        let (min, max) = self.ctx.mb_qp_delta_range();
        if value < min || value > max {
            return Err(Error::InvalidSyntaxElement {
                element: "mb_qp_delta",
                value: value as i64,
            });
        }

        Ok(value)
    }

    /// `prev_intra4x4_pred_mode_flag` or `prev_intra8x8_pred_mode_flag`.
    pub fn prev_intra_pred_mode_flag(&mut self, mb: &Macroblock) -> Result<bool> {
        match self.cabac() {
            Some(mut cabac) => cabac.prev_intra_pred_mode_flag(mb),
            None => self
                .reader
                .read_bit()
                .map_err(|e| e.within("prev_intra_pred_mode_flag")),
        }
    }

    /// `rem_intra4x4_pred_mode` or `rem_intra8x8_pred_mode`.
    pub fn rem_intra_pred_mode(&mut self, mb: &Macroblock) -> Result<u8> {
        match self.cabac() {
            Some(mut cabac) => cabac.rem_intra_pred_mode(mb),
            None => self
                .reader
                .read_bits(3)
                .map_err(|e| e.within("rem_intra_pred_mode")),
        }
    }

    pub fn intra_chroma_pred_mode(&mut self, mb: &Macroblock) -> Result<u8> {
        let mode = match self.cabac() {
            Some(mut cabac) => cabac.intra_chroma_pred_mode(mb)? as u32,
            None => self
                .reader
                .read_ue()
                .map_err(|e| e.within("intra_chroma_pred_mode"))?,
        };

        if mode > 3 {
            return Err(Error::InvalidSyntaxElement {
                element: "intra_chroma_pred_mode",
                value: mode as i64,
            });
        }

        Ok(mode as u8)
    }

    /// `ref_idx_l0` or `ref_idx_l1` of partition `part`.
    pub fn ref_idx(&mut self, mb: &Macroblock, list: usize, part: usize) -> Result<u32> {
        let element = if list == 0 { "ref_idx_l0" } else { "ref_idx_l1" };
        let max = self.ctx.ref_idx_max(list, mb.mb_field_decoding_flag);

        let value = match self.cabac() {
            Some(mut cabac) => cabac.ref_idx(mb, list, part)?,
            None => match self.reader.read_te(max) {
                Ok(value) => value,
                Err(Error::InvalidSyntaxElement { value, .. }) => {
                    return Err(Error::InvalidSyntaxElement { element, value })
                }
                Err(e) => return Err(e.within(element)),
            },
        };

        if value > max {
            return Err(Error::InvalidSyntaxElement {
                element,
                value: value as i64,
            });
        }

        Ok(value)
    }

    /// One component of `mvd_l0` or `mvd_l1`.
    pub fn mvd(
        &mut self,
        mb: &Macroblock,
        list: usize,
        part: usize,
        sub_part: usize,
        component: usize,
    ) -> Result<i32> {
        match self.cabac() {
            Some(mut cabac) => cabac.mvd(mb, list, part, sub_part, component),
            None => self.reader.read_se().map_err(|e| {
                e.within(if list == 0 { "mvd_l0" } else { "mvd_l1" })
            }),
        }
    }

    /// Read one coefficient block of `cur` into `coeff_level`.
    ///
    /// `index` is the block index within its category, numbered as for
    /// `BinContext::CodedBlockFlag`. Under CAVLC the return value is
    /// `TotalCoeff(coeff_token)`, under CABAC the number of nonzero levels.
    pub fn residual_block(
        &mut self,
        cur: &Macroblock,
        category: BlockCategory,
        index: usize,
        max_num_coeff: usize,
        coeff_level: &mut [i32],
    ) -> Result<u8> {
        let ctx = self.ctx;

        if let Some(mut cabac) = self.cabac() {
            let read_coded_block_flag = max_num_coeff != 64 || ctx.chroma_array_type == 3;

            return cabac.residual_block(
                cur,
                category,
                index as u8,
                max_num_coeff,
                read_coded_block_flag,
                coeff_level,
            );
        }

        let nc = coeff_token_nc(ctx, self.prior, cur, category, index);

        cavlc::residual_block(self.reader, nc, max_num_coeff, coeff_level)
    }
}

#[cfg(test)]
mod tests {
    use crate::cabac::NoCabac;
    use crate::context::SliceContext;
    use crate::error::Error;
    use crate::parser::reader::H264Reader;
    use crate::parser::syntax::{EntropyDecoder, SyntaxReader};
    use crate::types::{Macroblock, MbType, PictureParameters, SequenceParameters, SliceHeader, SliceType};

    #[test]
    fn truncated_coded_block_pattern() {
        let ctx = SliceContext::new(
            &SequenceParameters::default(),
            &PictureParameters::default(),
            &SliceHeader::new(SliceType::I, 0),
        )
        .unwrap();

        // An Exp-Golomb prefix cut off by the end of the payload.
        let data = [0b0000_0000];
        let mut reader = H264Reader::from_source(&data[..]);
        let mut entropy = EntropyDecoder::<NoCabac>::Cavlc;
        let mut mb = Macroblock::new(0, false);
        mb.mb_type = MbType::I(0);

        let mut syntax = SyntaxReader {
            reader: &mut reader,
            entropy: &mut entropy,
            ctx: &ctx,
            prior: &[],
        };

        assert!(matches!(
            syntax.coded_block_pattern(&mb),
            Err(Error::UnexpectedEndOfStream {
                element: "coded_block_pattern"
            })
        ));
    }
}
