//! Macroblock decoding

use crate::cabac::BinDecoder;
use crate::error::{Error, Result};
use crate::parser::residual::decode_residual;
use crate::parser::syntax::{check_alignment_bit, EntropyDecoder, SyntaxReader};
use crate::types::{Macroblock, PcmSamples, PredMode, SubMbType};
use std::io::Read;

/// Read `pcm_alignment_zero_bit`s and the raw samples of an `I_PCM`
/// macroblock.
fn decode_pcm_samples<R, B>(syntax: &mut SyntaxReader<R, B>) -> Result<PcmSamples>
where
    R: Read,
    B: BinDecoder,
{
    let ctx = syntax.ctx;

    while !syntax.reader.is_byte_aligned() {
        let bit = syntax
            .reader
            .read_bit()
            .map_err(|e| e.within("pcm_alignment_zero_bit"))?;
        check_alignment_bit(ctx, "pcm_alignment_zero_bit", bit, false)?;
    }

    let mut luma = Vec::with_capacity(256);
    for _ in 0..256 {
        luma.push(
            syntax
                .reader
                .read_bits(ctx.bit_depth_luma as u32)
                .map_err(|e| e.within("pcm_sample_luma"))?,
        );
    }

    let num_chroma = 2 * ctx.mb_width_c as usize * ctx.mb_height_c as usize;
    let mut chroma = Vec::with_capacity(num_chroma);
    for _ in 0..num_chroma {
        chroma.push(
            syntax
                .reader
                .read_bits(ctx.bit_depth_chroma as u32)
                .map_err(|e| e.within("pcm_sample_chroma"))?,
        );
    }

    if let EntropyDecoder::Cabac(engine) = syntax.entropy {
        engine.initialise(syntax.reader)?;
    }

    Ok(PcmSamples { luma, chroma })
}

/// ITU-T Recommendation H.264 (08/2021) 7.3.5.1 `mb_pred`
fn decode_mb_pred<R, B>(syntax: &mut SyntaxReader<R, B>, mb: &mut Macroblock) -> Result<()>
where
    R: Read,
    B: BinDecoder,
{
    let ctx = syntax.ctx;
    let pred_mode = mb.pred_mode(0);

    if pred_mode.is_intra() {
        if pred_mode == PredMode::Intra4x4 {
            for blk in 0..16 {
                let flag = syntax.prev_intra_pred_mode_flag(mb)?;
                mb.prev_intra4x4_pred_mode_flag[blk] = flag;
                if !flag {
                    mb.rem_intra4x4_pred_mode[blk] = syntax.rem_intra_pred_mode(mb)?;
                }
            }
        }

        if pred_mode == PredMode::Intra8x8 {
            for blk in 0..4 {
                let flag = syntax.prev_intra_pred_mode_flag(mb)?;
                mb.prev_intra8x8_pred_mode_flag[blk] = flag;
                if !flag {
                    mb.rem_intra8x8_pred_mode[blk] = syntax.rem_intra_pred_mode(mb)?;
                }
            }
        }

        if ctx.has_chroma_blocks() {
            mb.intra_chroma_pred_mode = syntax.intra_chroma_pred_mode(mb)?;
        }
    } else if pred_mode != PredMode::Direct {
        let num_mb_part = mb.mb_type.num_mb_part();

        for list in 0..2 {
            if !ctx.ref_idx_present(list, mb.mb_field_decoding_flag) {
                continue;
            }

            for part in 0..num_mb_part {
                if mb.pred_mode(part).uses_list(list) {
                    mb.ref_idx[list][part] = syntax.ref_idx(mb, list, part)?;
                }
            }
        }

        for list in 0..2 {
            for part in 0..num_mb_part {
                if mb.pred_mode(part).uses_list(list) {
                    for component in 0..2 {
                        mb.mvd[list][part][0][component] =
                            syntax.mvd(mb, list, part, 0, component)?;
                    }
                }
            }
        }
    }

    Ok(())
}

/// ITU-T Recommendation H.264 (08/2021) 7.3.5.2 `sub_mb_pred`
fn decode_sub_mb_pred<R, B>(syntax: &mut SyntaxReader<R, B>, mb: &mut Macroblock) -> Result<()>
where
    R: Read,
    B: BinDecoder,
{
    let ctx = syntax.ctx;
    let mut sub_mb_type = [SubMbType::P(0); 4];

    for part in 0..4 {
        sub_mb_type[part] = syntax.sub_mb_type(mb)?;
        mb.sub_mb_type = Some(sub_mb_type);
    }

    for list in 0..2 {
        if !ctx.ref_idx_present(list, mb.mb_field_decoding_flag) || mb.mb_type.is_p_8x8_ref0() {
            continue;
        }

        for (part, sub) in sub_mb_type.iter().enumerate() {
            if !sub.is_b_direct_8x8() && sub.sub_mb_pred_mode().uses_list(list) {
                mb.ref_idx[list][part] = syntax.ref_idx(mb, list, part)?;
            }
        }
    }

    for list in 0..2 {
        for (part, sub) in sub_mb_type.iter().enumerate() {
            if sub.is_b_direct_8x8() || !sub.sub_mb_pred_mode().uses_list(list) {
                continue;
            }

            for sub_part in 0..sub.num_sub_mb_part() {
                for component in 0..2 {
                    mb.mvd[list][part][sub_part][component] =
                        syntax.mvd(mb, list, part, sub_part, component)?;
                }
            }
        }
    }

    Ok(())
}

/// ITU-T Recommendation H.264 (08/2021) 7.3.5 `macroblock_layer`
///
/// Fills `mb`, whose address and `mb_field_decoding_flag` are already set,
/// from the bitstream. Elements are stored as soon as they are read so that
/// the CABAC engine can derive contexts from them.
pub fn decode_macroblock<R, B>(syntax: &mut SyntaxReader<R, B>, mb: &mut Macroblock) -> Result<()>
where
    R: Read,
    B: BinDecoder,
{
    let ctx = syntax.ctx;

    mb.mb_type = syntax.mb_type(mb)?;

    if mb.mb_type.is_pcm() {
        mb.pcm = Some(decode_pcm_samples(syntax)?);
        return Ok(());
    }

    let mut no_sub_mb_part_size_less_than_8x8_flag = true;

    if !mb.mb_type.is_i_nxn() && !mb.mb_type.is_intra_16x16() && mb.mb_type.num_mb_part() == 4 {
        decode_sub_mb_pred(syntax, mb)?;

        for sub in mb.sub_mb_type.iter().flatten() {
            if sub.is_b_direct_8x8() {
                if !ctx.direct_8x8_inference_flag {
                    no_sub_mb_part_size_less_than_8x8_flag = false;
                }
            } else if sub.num_sub_mb_part() > 1 {
                no_sub_mb_part_size_less_than_8x8_flag = false;
            }
        }
    } else {
        if ctx.transform_8x8_mode_flag && mb.mb_type.is_i_nxn() {
            mb.transform_size_8x8_flag = syntax.transform_size_8x8_flag(mb)?;
        }

        decode_mb_pred(syntax, mb)?;
    }

    match mb.mb_type.intra_16x16_coded_block_pattern() {
        Some(cbp) => {
            if cbp.chroma != 0 && !ctx.has_chroma_blocks() {
                return Err(Error::InvalidSyntaxElement {
                    element: "mb_type",
                    value: mb.mb_type.code(ctx.slice_type).unwrap_or_default() as i64,
                });
            }

            mb.coded_block_pattern = cbp;
        }
        None => {
            mb.coded_block_pattern = syntax.coded_block_pattern(mb)?;

            if mb.coded_block_pattern.luma > 0
                && ctx.transform_8x8_mode_flag
                && !mb.mb_type.is_i_nxn()
                && no_sub_mb_part_size_less_than_8x8_flag
                && (!mb.mb_type.is_b_direct_16x16() || ctx.direct_8x8_inference_flag)
            {
                mb.transform_size_8x8_flag = syntax.transform_size_8x8_flag(mb)?;
            }
        }
    }

    if !mb.coded_block_pattern.is_empty() || mb.mb_type.is_intra_16x16() {
        mb.mb_qp_delta = syntax.mb_qp_delta(mb)?;
        decode_residual(syntax, mb)?;
    }

    Ok(())
}
