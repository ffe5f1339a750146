//! Residual data

use crate::cabac::{BinEncoder, BlockCategory};
use crate::error::{Error, Result};
use crate::types::{Macroblock, PlaneResidual, Residual};
use crate::writer::syntax::SyntaxWriter;

fn all_zero(levels: &[i32]) -> bool {
    levels.iter().all(|level| *level == 0)
}

/// Reject levels the coded block pattern gives no way to code.
fn check_uncoded(cur: &Macroblock, levels: &[i32]) -> Result<()> {
    if all_zero(levels) {
        Ok(())
    } else {
        Err(Error::InvalidSyntaxElement {
            element: "coded_block_pattern",
            value: cur.coded_block_pattern.code() as i64,
        })
    }
}

/// The levels of 4x4 block `i4x4` of an 8x8 block, in the interleaved order
/// CAVLC uses for 8x8 transforms.
fn deinterleave(level8x8: &[i32; 64], i4x4: usize) -> [i32; 16] {
    let mut block = [0; 16];
    for (i, level) in block.iter_mut().enumerate() {
        *level = level8x8[4 * i + i4x4];
    }
    block
}

/// `residual_luma` for one plane coded with the luma syntax.
fn write_residual_luma<B>(
    syntax: &mut SyntaxWriter<B>,
    source: &PlaneResidual,
    cur: &mut Macroblock,
    plane: usize,
) -> Result<()>
where
    B: BinEncoder,
{
    let cbp = cur.coded_block_pattern;
    let intra_16x16 = cur.mb_type.is_intra_16x16();
    let transform_8x8 = cur.transform_size_8x8_flag;
    let cabac = syntax.entropy.is_cabac();

    if intra_16x16 {
        let count = syntax.residual_block(cur, BlockCategory::dc(plane), 0, 16, &source.dc)?;
        let residual = &mut cur.residual_mut().planes[plane];
        residual.dc = source.dc;
        residual.dc_coded = count > 0;
    }

    for i8x8 in 0..4 {
        if !cbp.luma_coded(i8x8) {
            if intra_16x16 {
                for blk in i8x8 * 4..i8x8 * 4 + 4 {
                    check_uncoded(cur, &source.ac[blk])?;
                }
            } else if transform_8x8 {
                check_uncoded(cur, &source.level8x8[i8x8])?;
            } else {
                for blk in i8x8 * 4..i8x8 * 4 + 4 {
                    check_uncoded(cur, &source.level4x4[blk])?;
                }
            }
            continue;
        }

        if !transform_8x8 || !cabac {
            for i4x4 in 0..4 {
                let blk = i8x8 * 4 + i4x4;

                if intra_16x16 {
                    let count =
                        syntax.residual_block(cur, BlockCategory::ac(plane), blk, 15, &source.ac[blk])?;
                    let residual = &mut cur.residual_mut().planes[plane];
                    residual.ac[blk] = source.ac[blk];
                    residual.total_coeff[blk] = count;
                    residual.coded[blk] = count > 0;
                } else {
                    let levels = if transform_8x8 {
                        deinterleave(&source.level8x8[i8x8], i4x4)
                    } else {
                        source.level4x4[blk]
                    };
                    let count =
                        syntax.residual_block(cur, BlockCategory::block4x4(plane), blk, 16, &levels)?;
                    let residual = &mut cur.residual_mut().planes[plane];
                    residual.level4x4[blk] = levels;
                    residual.total_coeff[blk] = count;
                    residual.coded[blk] = count > 0;
                }

                if transform_8x8 {
                    let residual = &mut cur.residual_mut().planes[plane];
                    for i in 0..16 {
                        residual.level8x8[i8x8][4 * i + i4x4] = residual.level4x4[blk][i];
                    }
                    residual.coded_8x8[i8x8] |= residual.coded[blk];
                }
            }
        } else {
            let levels = &source.level8x8[i8x8];
            let count = syntax.residual_block(cur, BlockCategory::block8x8(plane), i8x8, 64, levels)?;
            let residual = &mut cur.residual_mut().planes[plane];
            residual.level8x8[i8x8] = *levels;
            residual.coded_8x8[i8x8] = count > 0;
            for i4x4 in 0..4 {
                residual.coded[i8x8 * 4 + i4x4] = count > 0;
            }
        }
    }

    Ok(())
}

/// Chroma DC and AC blocks of 4:2:0 and 4:2:2 macroblocks.
fn write_residual_chroma<B>(syntax: &mut SyntaxWriter<B>, source: &Residual, cur: &mut Macroblock) -> Result<()>
where
    B: BinEncoder,
{
    let cbp = cur.coded_block_pattern;
    let num_dc = 4 * syntax.ctx.num_c8x8();

    for component in 0..2 {
        check_uncoded(cur, &source.chroma_dc[component][num_dc..])?;
        for blk in num_dc..8 {
            check_uncoded(cur, &source.chroma_ac[component][blk])?;
        }
    }

    if cbp.chroma & 3 != 0 {
        for component in 0..2 {
            let levels = &source.chroma_dc[component][..num_dc];
            let count = syntax.residual_block(cur, BlockCategory::ChromaDc, component, num_dc, levels)?;
            let residual = cur.residual_mut();
            residual.chroma_dc[component][..num_dc].copy_from_slice(levels);
            residual.chroma_dc_coded[component] = count > 0;
        }
    } else {
        for component in 0..2 {
            check_uncoded(cur, &source.chroma_dc[component])?;
        }
    }

    if cbp.chroma & 2 != 0 {
        for component in 0..2 {
            for blk in 0..num_dc {
                let levels = &source.chroma_ac[component][blk];
                let count =
                    syntax.residual_block(cur, BlockCategory::ChromaAc, component * 8 + blk, 15, levels)?;
                let residual = cur.residual_mut();
                residual.chroma_ac[component][blk] = *levels;
                residual.chroma_ac_total_coeff[component][blk] = count;
                residual.chroma_ac_coded[component][blk] = count > 0;
            }
        }
    } else {
        for component in 0..2 {
            for blk in 0..num_dc {
                check_uncoded(cur, &source.chroma_ac[component][blk])?;
            }
        }
    }

    Ok(())
}

/// ITU-T Recommendation H.264 (08/2021) 7.3.5.3 `residual`
///
/// Writes the levels of `source` that the coded block pattern of `cur`
/// covers, and records them in `cur` the way the parser would. A missing
/// source residual codes every covered block as empty.
pub fn write_residual<B>(
    syntax: &mut SyntaxWriter<B>,
    source: Option<&Residual>,
    cur: &mut Macroblock,
) -> Result<()>
where
    B: BinEncoder,
{
    let empty;
    let source = match source {
        Some(source) => source,
        None => {
            empty = Box::<Residual>::default();
            &*empty
        }
    };

    cur.residual = Some(Default::default());

    let num_planes = syntax.ctx.num_luma_like_planes();
    for plane in 0..num_planes {
        write_residual_luma(syntax, &source.planes[plane], cur, plane)?;
    }

    if syntax.ctx.has_chroma_blocks() {
        write_residual_chroma(syntax, source, cur)?;
    } else {
        for component in 0..2 {
            check_uncoded(cur, &source.chroma_dc[component])?;
            for blk in 0..8 {
                check_uncoded(cur, &source.chroma_ac[component][blk])?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::cabac::NoCabac;
    use crate::context::SliceContext;
    use crate::error::Error;
    use crate::types::{
        CodedBlockPattern, Macroblock, MbType, PictureParameters, Residual, SequenceParameters,
        SliceHeader, SliceType,
    };
    use crate::writer::residual::write_residual;
    use crate::writer::syntax::{EntropyEncoder, SyntaxWriter};
    use crate::writer::BitWriter;

    fn context() -> SliceContext {
        SliceContext::new(
            &SequenceParameters::default(),
            &PictureParameters::default(),
            &SliceHeader::new(SliceType::I, 0),
        )
        .unwrap()
    }

    fn write(ctx: &SliceContext, source: &Residual, cur: &mut Macroblock) -> Result<Vec<u8>, Error> {
        let mut writer = BitWriter::new();
        let mut entropy = EntropyEncoder::<NoCabac>::Cavlc;

        write_residual(
            &mut SyntaxWriter {
                writer: &mut writer,
                entropy: &mut entropy,
                ctx,
                prior: &[],
            },
            Some(source),
            cur,
        )?;

        Ok(writer.into_bytes())
    }

    #[test]
    fn cavlc_8x8_interleave() {
        let ctx = context();
        let mut source = Residual::default();
        source.planes[0].level8x8[0][0] = 1;
        source.planes[0].level8x8[0][5] = -1;

        let mut cur = Macroblock::new(0, false);
        cur.mb_type = MbType::I(0);
        cur.transform_size_8x8_flag = true;
        cur.coded_block_pattern = CodedBlockPattern { luma: 1, chroma: 0 };

        let data = write(&ctx, &source, &mut cur).unwrap();
        assert_eq!(vec![0b0101_0110, 0b1111_0000], data);

        let residual = cur.residual.unwrap();
        let plane = &residual.planes[0];
        assert_eq!([1, 1, 0, 0], plane.total_coeff[..4]);
        assert_eq!(-1, plane.level4x4[1][1]);
        assert_eq!(source.planes[0].level8x8, plane.level8x8);
    }

    #[test]
    fn levels_outside_pattern() {
        let ctx = context();
        let mut source = Residual::default();
        source.planes[0].level4x4[7][3] = 2;

        let mut cur = Macroblock::new(0, false);
        cur.mb_type = MbType::I(0);
        cur.coded_block_pattern = CodedBlockPattern { luma: 1, chroma: 0 };

        assert!(matches!(
            write(&ctx, &source, &mut cur),
            Err(Error::InvalidSyntaxElement {
                element: "coded_block_pattern",
                ..
            })
        ));
    }
}
