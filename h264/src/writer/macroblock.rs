//! Macroblock encoding

use crate::cabac::BinEncoder;
use crate::error::{Error, Result};
use crate::types::{Macroblock, PcmSamples, PredMode, SubMbType};
use crate::writer::residual::write_residual;
use crate::writer::syntax::{EntropyEncoder, SyntaxWriter};

fn write_samples(
    syntax: &mut SyntaxWriter<impl BinEncoder>,
    samples: &[u16],
    expected: usize,
    bit_depth: u8,
    element: &'static str,
) -> Result<()> {
    if samples.len() != expected {
        return Err(Error::InvalidSyntaxElement {
            element,
            value: samples.len() as i64,
        });
    }

    for sample in samples {
        if (*sample as u32) >> bit_depth != 0 {
            return Err(Error::InvalidSyntaxElement {
                element,
                value: *sample as i64,
            });
        }
        syntax.writer.write_bits(*sample as u32, bit_depth as u32);
    }

    Ok(())
}

/// `pcm_alignment_zero_bit`s and the raw samples of an `I_PCM` macroblock.
fn write_pcm_samples<B>(syntax: &mut SyntaxWriter<B>, pcm: &PcmSamples) -> Result<()>
where
    B: BinEncoder,
{
    let ctx = syntax.ctx;
    let num_chroma = 2 * ctx.mb_width_c as usize * ctx.mb_height_c as usize;

    syntax.writer.align_with(false);
    write_samples(syntax, &pcm.luma, 256, ctx.bit_depth_luma, "pcm_sample_luma")?;
    write_samples(syntax, &pcm.chroma, num_chroma, ctx.bit_depth_chroma, "pcm_sample_chroma")?;

    if let EntropyEncoder::Cabac(engine) = syntax.entropy {
        engine.initialise(syntax.writer)?;
    }

    Ok(())
}

/// ITU-T Recommendation H.264 (08/2021) 7.3.5.1 `mb_pred`
fn write_mb_pred<B>(syntax: &mut SyntaxWriter<B>, source: &Macroblock, cur: &mut Macroblock) -> Result<()>
where
    B: BinEncoder,
{
    let ctx = syntax.ctx;
    let pred_mode = cur.pred_mode(0);

    if pred_mode.is_intra() {
        if pred_mode == PredMode::Intra4x4 {
            for blk in 0..16 {
                let flag = source.prev_intra4x4_pred_mode_flag[blk];
                syntax.prev_intra_pred_mode_flag(cur, flag)?;
                cur.prev_intra4x4_pred_mode_flag[blk] = flag;
                if !flag {
                    let mode = source.rem_intra4x4_pred_mode[blk];
                    syntax.rem_intra_pred_mode(cur, mode)?;
                    cur.rem_intra4x4_pred_mode[blk] = mode;
                }
            }
        }

        if pred_mode == PredMode::Intra8x8 {
            for blk in 0..4 {
                let flag = source.prev_intra8x8_pred_mode_flag[blk];
                syntax.prev_intra_pred_mode_flag(cur, flag)?;
                cur.prev_intra8x8_pred_mode_flag[blk] = flag;
                if !flag {
                    let mode = source.rem_intra8x8_pred_mode[blk];
                    syntax.rem_intra_pred_mode(cur, mode)?;
                    cur.rem_intra8x8_pred_mode[blk] = mode;
                }
            }
        }

        if ctx.has_chroma_blocks() {
            syntax.intra_chroma_pred_mode(cur, source.intra_chroma_pred_mode)?;
            cur.intra_chroma_pred_mode = source.intra_chroma_pred_mode;
        }
    } else if pred_mode != PredMode::Direct {
        let num_mb_part = cur.mb_type.num_mb_part();

        for list in 0..2 {
            if !ctx.ref_idx_present(list, cur.mb_field_decoding_flag) {
                continue;
            }

            for part in 0..num_mb_part {
                if cur.pred_mode(part).uses_list(list) {
                    syntax.ref_idx(cur, list, part, source.ref_idx[list][part])?;
                    cur.ref_idx[list][part] = source.ref_idx[list][part];
                }
            }
        }

        for list in 0..2 {
            for part in 0..num_mb_part {
                if cur.pred_mode(part).uses_list(list) {
                    for component in 0..2 {
                        let mvd = source.mvd[list][part][0][component];
                        syntax.mvd(cur, list, part, 0, component, mvd)?;
                        cur.mvd[list][part][0][component] = mvd;
                    }
                }
            }
        }
    }

    Ok(())
}

/// ITU-T Recommendation H.264 (08/2021) 7.3.5.2 `sub_mb_pred`
fn write_sub_mb_pred<B>(syntax: &mut SyntaxWriter<B>, source: &Macroblock, cur: &mut Macroblock) -> Result<()>
where
    B: BinEncoder,
{
    let ctx = syntax.ctx;
    let sub_mb_type = source.sub_mb_type.ok_or(Error::InvalidSyntaxElement {
        element: "sub_mb_type",
        value: -1,
    })?;

    let mut written = [SubMbType::P(0); 4];
    for part in 0..4 {
        syntax.sub_mb_type(cur, sub_mb_type[part])?;
        written[part] = sub_mb_type[part];
        cur.sub_mb_type = Some(written);
    }

    for list in 0..2 {
        if !ctx.ref_idx_present(list, cur.mb_field_decoding_flag) || cur.mb_type.is_p_8x8_ref0() {
            continue;
        }

        for (part, sub) in sub_mb_type.iter().enumerate() {
            if !sub.is_b_direct_8x8() && sub.sub_mb_pred_mode().uses_list(list) {
                syntax.ref_idx(cur, list, part, source.ref_idx[list][part])?;
                cur.ref_idx[list][part] = source.ref_idx[list][part];
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
                    let mvd = source.mvd[list][part][sub_part][component];
                    syntax.mvd(cur, list, part, sub_part, component, mvd)?;
                    cur.mvd[list][part][sub_part][component] = mvd;
                }
            }
        }
    }

    Ok(())
}

/// ITU-T Recommendation H.264 (08/2021) 7.3.5 `macroblock_layer`
///
/// Writes `source` into the slice. `cur` starts as a blank record carrying
/// the address and `mb_field_decoding_flag`; it is filled element by element
/// and ends up equal to what the parser produces from the written bits.
/// Elements of `source` that the syntax does not carry are dropped.
pub fn write_macroblock<B>(syntax: &mut SyntaxWriter<B>, source: &Macroblock, cur: &mut Macroblock) -> Result<()>
where
    B: BinEncoder,
{
    let ctx = syntax.ctx;

    syntax.mb_type(cur, source.mb_type)?;
    cur.mb_type = source.mb_type;

    if cur.mb_type.is_pcm() {
        let pcm = source.pcm.as_ref().ok_or(Error::InvalidSyntaxElement {
            element: "pcm_sample_luma",
            value: 0,
        })?;
        write_pcm_samples(syntax, pcm)?;
        cur.pcm = Some(pcm.clone());
        return Ok(());
    }

    let mut no_sub_mb_part_size_less_than_8x8_flag = true;
    let mut transform_8x8_coded = false;

    if !cur.mb_type.is_i_nxn() && !cur.mb_type.is_intra_16x16() && cur.mb_type.num_mb_part() == 4 {
        write_sub_mb_pred(syntax, source, cur)?;

        for sub in cur.sub_mb_type.iter().flatten() {
            if sub.is_b_direct_8x8() {
                if !ctx.direct_8x8_inference_flag {
                    no_sub_mb_part_size_less_than_8x8_flag = false;
                }
            } else if sub.num_sub_mb_part() > 1 {
                no_sub_mb_part_size_less_than_8x8_flag = false;
            }
        }
    } else {
        if ctx.transform_8x8_mode_flag && cur.mb_type.is_i_nxn() {
            syntax.transform_size_8x8_flag(cur, source.transform_size_8x8_flag)?;
            cur.transform_size_8x8_flag = source.transform_size_8x8_flag;
            transform_8x8_coded = true;
        }

        write_mb_pred(syntax, source, cur)?;
    }

    match cur.mb_type.intra_16x16_coded_block_pattern() {
        Some(cbp) => {
            if cbp.chroma != 0 && !ctx.has_chroma_blocks() {
                return Err(Error::InvalidSyntaxElement {
                    element: "mb_type",
                    value: cur.mb_type.code(ctx.slice_type).unwrap_or_default() as i64,
                });
            }

            cur.coded_block_pattern = cbp;
        }
        None => {
            syntax.coded_block_pattern(cur, source.coded_block_pattern)?;
            cur.coded_block_pattern = source.coded_block_pattern;

            if cur.coded_block_pattern.luma > 0
                && ctx.transform_8x8_mode_flag
                && !cur.mb_type.is_i_nxn()
                && no_sub_mb_part_size_less_than_8x8_flag
                && (!cur.mb_type.is_b_direct_16x16() || ctx.direct_8x8_inference_flag)
            {
                syntax.transform_size_8x8_flag(cur, source.transform_size_8x8_flag)?;
                cur.transform_size_8x8_flag = source.transform_size_8x8_flag;
                transform_8x8_coded = true;
            }
        }
    }

    if source.transform_size_8x8_flag && !transform_8x8_coded {
        return Err(Error::InvalidSyntaxElement {
            element: "transform_size_8x8_flag",
            value: 1,
        });
    }

    if !cur.coded_block_pattern.is_empty() || cur.mb_type.is_intra_16x16() {
        syntax.mb_qp_delta(cur, source.mb_qp_delta)?;
        cur.mb_qp_delta = source.mb_qp_delta;
        write_residual(syntax, source.residual.as_deref(), cur)?;
    }

    Ok(())
}
