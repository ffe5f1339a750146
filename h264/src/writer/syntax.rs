//! Entropy-mode dispatch of individual syntax elements

use crate::cabac::{BinEncoder, BlockCategory};
use crate::context::SliceContext;
use crate::error::{Error, Result};
use crate::neighbour::coeff_token_nc;
use crate::types::{CodedBlockPattern, Macroblock, MbType, SubMbType};
use crate::writer::cabac::CabacWriter;
use crate::writer::cavlc;
use crate::writer::BitWriter;

/// The entropy coding selected by `entropy_coding_mode_flag`.
pub enum EntropyEncoder<B> {
    Cavlc,
    Cabac(B),
}

impl<B> EntropyEncoder<B> {
    pub fn is_cabac(&self) -> bool {
        matches!(self, Self::Cabac(_))
    }
}

fn invalid(element: &'static str, value: i64) -> Error {
    Error::InvalidSyntaxElement { element, value }
}

/// Writes syntax elements of one macroblock.
///
/// Every method takes `mb`, the record of the current macroblock holding the
/// elements written so far, exactly as the parser holds it at the same
/// point. Values are checked against the domain of their element before any
/// bit is produced.
pub struct SyntaxWriter<'a, B> {
    pub writer: &'a mut BitWriter,
    pub entropy: &'a mut EntropyEncoder<B>,
    pub ctx: &'a SliceContext,
    pub prior: &'a [Macroblock],
}

impl<'a, B> SyntaxWriter<'a, B>
where
    B: BinEncoder,
{
    fn cabac(&mut self) -> Option<CabacWriter<'_, B>> {
        match self.entropy {
            EntropyEncoder::Cabac(engine) => Some(CabacWriter::new(engine, self.writer)),
            EntropyEncoder::Cavlc => None,
        }
    }

    pub fn mb_field_decoding_flag(&mut self, mb: &Macroblock, flag: bool) -> Result<()> {
        match self.cabac() {
            Some(mut cabac) => cabac.mb_field_decoding_flag(mb, flag),
            None => {
                self.writer.write_bit(flag);
                Ok(())
            }
        }
    }

    pub fn mb_type(&mut self, mb: &Macroblock, mb_type: MbType) -> Result<()> {
        let slice_type = self.ctx.slice_type;
        let code = mb_type
            .code(slice_type)
            .filter(|code| MbType::from_code(slice_type, *code) == Some(mb_type))
            .ok_or_else(|| invalid("mb_type", -1))?;

        match self.cabac() {
            Some(mut cabac) => cabac.mb_type(mb, slice_type, mb_type),
            None => self.writer.write_ue(code),
        }
    }

    pub fn sub_mb_type(&mut self, mb: &Macroblock, sub_mb_type: SubMbType) -> Result<()> {
        let slice_type = self.ctx.slice_type;
        let code = sub_mb_type.code();

        if SubMbType::from_code(slice_type, code) != Some(sub_mb_type) {
            return Err(invalid("sub_mb_type", code as i64));
        }

        match self.cabac() {
            Some(mut cabac) => cabac.sub_mb_type(mb, sub_mb_type),
            None => self.writer.write_ue(code),
        }
    }

    pub fn transform_size_8x8_flag(&mut self, mb: &Macroblock, flag: bool) -> Result<()> {
        match self.cabac() {
            Some(mut cabac) => cabac.transform_size_8x8_flag(mb, flag),
            None => {
                self.writer.write_bit(flag);
                Ok(())
            }
        }
    }

    pub fn coded_block_pattern(&mut self, mb: &Macroblock, cbp: CodedBlockPattern) -> Result<()> {
        let chroma_array_type = self.ctx.chroma_array_type;
        let max_chroma = if matches!(chroma_array_type, 1 | 2) { 2 } else { 0 };

        if cbp.luma > 15 || cbp.chroma > max_chroma {
            let value = cbp.chroma as i64 * 16 + cbp.luma as i64;
            return Err(invalid("coded_block_pattern", value));
        }

        match self.cabac() {
            Some(mut cabac) => cabac.coded_block_pattern(mb, chroma_array_type, cbp),
            None => {
                let intra = mb.pred_mode(0).is_intra();
                self.writer.write_me(chroma_array_type, intra, cbp.code())
            }
        }
    }

    pub fn mb_qp_delta(&mut self, mb: &Macroblock, mb_qp_delta: i32) -> Result<()> {
        let (min, max) = self.ctx.mb_qp_delta_range();
        if mb_qp_delta < min || mb_qp_delta > max {
            return Err(invalid("mb_qp_delta", mb_qp_delta as i64));
        }

        match self.cabac() {
            Some(mut cabac) => cabac.mb_qp_delta(mb, mb_qp_delta),
            None => self.writer.write_se(mb_qp_delta),
        }
    }

    pub fn prev_intra_pred_mode_flag(&mut self, mb: &Macroblock, flag: bool) -> Result<()> {
        match self.cabac() {
            Some(mut cabac) => cabac.prev_intra_pred_mode_flag(mb, flag),
            None => {
                self.writer.write_bit(flag);
                Ok(())
            }
        }
    }

    pub fn rem_intra_pred_mode(&mut self, mb: &Macroblock, mode: u8) -> Result<()> {
        if mode > 7 {
            return Err(invalid("rem_intra_pred_mode", mode as i64));
        }

        match self.cabac() {
            Some(mut cabac) => cabac.rem_intra_pred_mode(mb, mode),
            None => {
                self.writer.write_bits(mode as u32, 3);
                Ok(())
            }
        }
    }

    pub fn intra_chroma_pred_mode(&mut self, mb: &Macroblock, mode: u8) -> Result<()> {
        if mode > 3 {
            return Err(invalid("intra_chroma_pred_mode", mode as i64));
        }

        match self.cabac() {
            Some(mut cabac) => cabac.intra_chroma_pred_mode(mb, mode),
            None => self.writer.write_ue(mode as u32),
        }
    }

    pub fn ref_idx(&mut self, mb: &Macroblock, list: usize, part: usize, value: u32) -> Result<()> {
        let element = if list == 0 { "ref_idx_l0" } else { "ref_idx_l1" };
        let max = self.ctx.ref_idx_max(list, mb.mb_field_decoding_flag);

        if value > max {
            return Err(invalid(element, value as i64));
        }

        match self.cabac() {
            Some(mut cabac) => cabac.ref_idx(mb, list, part, value),
            None => self.writer.write_te(max, value),
        }
    }

    pub fn mvd(
        &mut self,
        mb: &Macroblock,
        list: usize,
        part: usize,
        sub_part: usize,
        component: usize,
        value: i32,
    ) -> Result<()> {
        match self.cabac() {
            Some(mut cabac) => cabac.mvd(mb, list, part, sub_part, component, value),
            None => self.writer.write_se(value),
        }
    }

    /// Write one coefficient block of `cur`.
    ///
    /// Returns the number of nonzero levels, which under CAVLC is
    /// `TotalCoeff(coeff_token)`.
    pub fn residual_block(
        &mut self,
        cur: &Macroblock,
        category: BlockCategory,
        index: usize,
        max_num_coeff: usize,
        coeff_level: &[i32],
    ) -> Result<u8> {
        let ctx = self.ctx;

        if let Some(mut cabac) = self.cabac() {
            let write_coded_block_flag = max_num_coeff != 64 || ctx.chroma_array_type == 3;
            let levels = cavlc::coded_levels(coeff_level, max_num_coeff)?;

            cabac.residual_block(
                cur,
                category,
                index as u8,
                max_num_coeff,
                write_coded_block_flag,
                levels,
            )?;

            return Ok(levels.iter().filter(|level| **level != 0).count() as u8);
        }

        let nc = coeff_token_nc(ctx, self.prior, cur, category, index);

        cavlc::residual_block(self.writer, nc, max_num_coeff, coeff_level)
    }
}
