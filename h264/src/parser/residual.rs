//! Residual data

use crate::cabac::{BinDecoder, BlockCategory};
use crate::error::Result;
use crate::parser::syntax::SyntaxReader;
use crate::types::Macroblock;
use std::io::Read;

/// ITU-T Recommendation H.264 (08/2021) 7.3.5.3.1 `residual_luma` for one
/// plane coded with the luma syntax.
fn decode_residual_luma<R, B>(
    syntax: &mut SyntaxReader<R, B>,
    mb: &mut Macroblock,
    plane: usize,
) -> Result<()>
where
    R: Read,
    B: BinDecoder,
{
    let cbp = mb.coded_block_pattern;
    let intra_16x16 = mb.mb_type.is_intra_16x16();
    let cabac = syntax.entropy.is_cabac();
    let mut block = [0i32; 64];

    if intra_16x16 {
        let count = syntax.residual_block(mb, BlockCategory::dc(plane), 0, 16, &mut block[..16])?;
        let residual = &mut mb.residual_mut().planes[plane];
        residual.dc.copy_from_slice(&block[..16]);
        residual.dc_coded = count > 0;
    }

    for i8x8 in 0..4 {
        if !mb.transform_size_8x8_flag || !cabac {
            for i4x4 in 0..4 {
                let blk = i8x8 * 4 + i4x4;

                if cbp.luma_coded(i8x8) {
                    if intra_16x16 {
                        let count = syntax.residual_block(
                            mb,
                            BlockCategory::ac(plane),
                            blk,
                            15,
                            &mut block[..15],
                        )?;
                        let residual = &mut mb.residual_mut().planes[plane];
                        residual.ac[blk].copy_from_slice(&block[..15]);
                        residual.total_coeff[blk] = count;
                        residual.coded[blk] = count > 0;
                    } else {
                        let count = syntax.residual_block(
                            mb,
                            BlockCategory::block4x4(plane),
                            blk,
                            16,
                            &mut block[..16],
                        )?;
                        let residual = &mut mb.residual_mut().planes[plane];
                        residual.level4x4[blk].copy_from_slice(&block[..16]);
                        residual.total_coeff[blk] = count;
                        residual.coded[blk] = count > 0;
                    }
                }

                if !cabac && mb.transform_size_8x8_flag {
                    let residual = &mut mb.residual_mut().planes[plane];
                    for i in 0..16 {
                        residual.level8x8[i8x8][4 * i + i4x4] = residual.level4x4[blk][i];
                    }
                    residual.coded_8x8[i8x8] |= residual.coded[blk];
                }
            }
        } else if cbp.luma_coded(i8x8) {
            let count = syntax.residual_block(mb, BlockCategory::block8x8(plane), i8x8, 64, &mut block)?;
            let residual = &mut mb.residual_mut().planes[plane];
            residual.level8x8[i8x8] = block;
            residual.coded_8x8[i8x8] = count > 0;
            for i4x4 in 0..4 {
                residual.coded[i8x8 * 4 + i4x4] = count > 0;
            }
        }
    }

    Ok(())
}

/// Chroma DC and AC blocks of 4:2:0 and 4:2:2 macroblocks.
fn decode_residual_chroma<R, B>(syntax: &mut SyntaxReader<R, B>, mb: &mut Macroblock) -> Result<()>
where
    R: Read,
    B: BinDecoder,
{
    let cbp = mb.coded_block_pattern;
    let num_c8x8 = syntax.ctx.num_c8x8();
    let num_dc = 4 * num_c8x8;
    let mut block = [0i32; 16];

    if cbp.chroma & 3 != 0 {
        for component in 0..2 {
            let count = syntax.residual_block(
                mb,
                BlockCategory::ChromaDc,
                component,
                num_dc,
                &mut block[..num_dc],
            )?;
            let residual = mb.residual_mut();
            residual.chroma_dc[component][..num_dc].copy_from_slice(&block[..num_dc]);
            residual.chroma_dc_coded[component] = count > 0;
        }
    }

    if cbp.chroma & 2 != 0 {
        for component in 0..2 {
            for blk in 0..num_dc {
                let count = syntax.residual_block(
                    mb,
                    BlockCategory::ChromaAc,
                    component * 8 + blk,
                    15,
                    &mut block[..15],
                )?;
                let residual = mb.residual_mut();
                residual.chroma_ac[component][blk].copy_from_slice(&block[..15]);
                residual.chroma_ac_total_coeff[component][blk] = count;
                residual.chroma_ac_coded[component][blk] = count > 0;
            }
        }
    }

    Ok(())
}

/// ITU-T Recommendation H.264 (08/2021) 7.3.5.3 `residual`
///
/// Blocks outside the coded block pattern are left zero without consuming
/// any bits.
pub fn decode_residual<R, B>(syntax: &mut SyntaxReader<R, B>, mb: &mut Macroblock) -> Result<()>
where
    R: Read,
    B: BinDecoder,
{
    mb.residual = Some(Default::default());

    for plane in 0..syntax.ctx.num_luma_like_planes() {
        decode_residual_luma(syntax, mb, plane)?;
    }

    if syntax.ctx.has_chroma_blocks() {
        decode_residual_chroma(syntax, mb)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::cabac::{Bin, BinContext, BinDecoder, BinTrace, BlockCategory, NoCabac};
    use crate::context::SliceContext;
    use crate::error::Error;
    use crate::parser::reader::H264Reader;
    use crate::parser::residual::decode_residual;
    use crate::parser::syntax::{EntropyDecoder, SyntaxReader};
    use crate::types::{
        CodedBlockPattern, Macroblock, MbType, PictureParameters, Residual, SequenceParameters,
        SliceHeader, SliceType,
    };
    use crate::writer::{write_residual, write_residual_block_cavlc, BitWriter, EntropyEncoder, SyntaxWriter};

    fn context(chroma_format_idc: u8, cabac: bool, transform_8x8: bool) -> SliceContext {
        SliceContext::new(
            &SequenceParameters {
                chroma_format_idc,
                ..Default::default()
            },
            &PictureParameters {
                entropy_coding_mode_flag: cabac,
                transform_8x8_mode_flag: transform_8x8,
            },
            &SliceHeader::new(SliceType::I, 0),
        )
        .unwrap()
    }

    fn intra_macroblock(transform_8x8: bool, cbp: CodedBlockPattern) -> Macroblock {
        let mut mb = Macroblock::new(0, false);
        mb.mb_type = MbType::I(0);
        mb.transform_size_8x8_flag = transform_8x8;
        mb.coded_block_pattern = cbp;
        mb
    }

    /// Decode the residual of `mb`, returning the number of bits read.
    fn decode<B: BinDecoder>(
        ctx: &SliceContext,
        entropy: &mut EntropyDecoder<B>,
        data: &[u8],
        mb: &mut Macroblock,
    ) -> Result<usize, Error> {
        let mut reader = H264Reader::from_source(data);

        decode_residual(
            &mut SyntaxReader {
                reader: &mut reader,
                entropy,
                ctx,
                prior: &[],
            },
            mb,
        )?;

        Ok(reader.position())
    }

    #[test]
    fn cavlc_8x8_interleave() {
        let ctx = context(1, false, true);

        // Block 0: coeff_token 01, sign 0, total_zeros 1.
        // Block 1 (nC 1): coeff_token 01, sign 1, total_zeros 011.
        // Blocks 2 and 3 (nC 1): coeff_token 1.
        let data = [0b0101_0110, 0b1111_0000];
        let mut mb = intra_macroblock(true, CodedBlockPattern { luma: 1, chroma: 0 });

        let position = decode(&ctx, &mut EntropyDecoder::<NoCabac>::Cavlc, &data, &mut mb).unwrap();

        let residual = mb.residual.unwrap();
        let plane = &residual.planes[0];
        assert_eq!(12, position);
        assert_eq!([1, 1, 0, 0], plane.total_coeff[..4]);
        assert_eq!(1, plane.level8x8[0][0]);
        assert_eq!(-1, plane.level8x8[0][5]);
        assert_eq!(2, plane.level8x8[0].iter().filter(|&&l| l != 0).count());
        assert_eq!([true, false, false, false], plane.coded_8x8);
        assert_eq!([[0; 64]; 3], plane.level8x8[1..]);
    }

    #[test]
    fn chroma_422_blocks() {
        let ctx = context(2, false, false);
        assert_eq!(2, ctx.num_c8x8());

        let dc_cb = [0, 2, 0, 0, -1, 0, 0, 1];
        let dc_cr = [-5, 0, 0, 0, 0, 0, 0, 3];
        let mut ac = [0; 15];
        ac[0] = -1;

        // Both DC blocks use the nC -2 tables. Every AC block predicts nC
        // below 2 from its neighbours.
        let mut writer = BitWriter::new();
        write_residual_block_cavlc(&mut writer, -2, 8, &dc_cb).unwrap();
        write_residual_block_cavlc(&mut writer, -2, 8, &dc_cr).unwrap();
        for component in 0..2 {
            for blk in 0..8 {
                let levels = match (component, blk) {
                    (0, 5) | (1, 0) => ac,
                    _ => [0; 15],
                };
                write_residual_block_cavlc(&mut writer, 0, 15, &levels).unwrap();
            }
        }
        let bits = writer.bits_written();
        writer.write_rbsp_trailing_bits();
        let data = writer.into_bytes();

        let mut mb = intra_macroblock(false, CodedBlockPattern { luma: 0, chroma: 2 });
        let position = decode(&ctx, &mut EntropyDecoder::<NoCabac>::Cavlc, &data, &mut mb).unwrap();
        assert_eq!(bits, position);

        let residual = mb.residual.unwrap();
        assert_eq!([dc_cb, dc_cr], residual.chroma_dc);
        assert_eq!([true, true], residual.chroma_dc_coded);
        for component in 0..2 {
            for blk in 0..8 {
                let coded = matches!((component, blk), (0, 5) | (1, 0));
                let expected = if coded { ac } else { [0; 15] };

                assert_eq!(expected, residual.chroma_ac[component][blk]);
                assert_eq!(coded as u8, residual.chroma_ac_total_coeff[component][blk]);
            }
        }
        assert_eq!(Residual::default().planes, residual.planes);
    }

    #[test]
    fn cavlc_444_planes() {
        let ctx = context(3, false, false);
        assert_eq!(3, ctx.num_luma_like_planes());
        assert!(!ctx.has_chroma_blocks());

        let luma = [2, 1, -1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let cb = [0, -3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let cr = [2, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

        // Region 0 of Y, Cb and Cr in turn. Each plane predicts nC from its
        // own counts, so Cb and Cr stay in the nC 0 table after the dense
        // luma blocks.
        let mut writer = BitWriter::new();
        for nc in [0, 4, 4, 4] {
            write_residual_block_cavlc(&mut writer, nc, 16, &luma).unwrap();
        }
        for blk in 0..4 {
            let levels = if blk == 2 { cb } else { [0; 16] };
            write_residual_block_cavlc(&mut writer, 0, 16, &levels).unwrap();
        }
        for blk in 0..4 {
            let levels = if blk == 3 { cr } else { [0; 16] };
            write_residual_block_cavlc(&mut writer, 0, 16, &levels).unwrap();
        }
        let bits = writer.bits_written();
        writer.write_rbsp_trailing_bits();
        let data = writer.into_bytes();

        let mut mb = intra_macroblock(false, CodedBlockPattern { luma: 1, chroma: 0 });
        let position = decode(&ctx, &mut EntropyDecoder::<NoCabac>::Cavlc, &data, &mut mb).unwrap();
        assert_eq!(bits, position);

        let residual = mb.residual.unwrap();
        assert_eq!([4, 4, 4, 4], residual.planes[0].total_coeff[..4]);
        assert_eq!([0, 0, 1, 0], residual.planes[1].total_coeff[..4]);
        assert_eq!([0, 0, 0, 2], residual.planes[2].total_coeff[..4]);
        assert_eq!(cb, residual.planes[1].level4x4[2]);
        assert_eq!(cr, residual.planes[2].level4x4[3]);
        assert!(residual.planes.iter().all(|plane| plane.total_coeff[4..].iter().all(|n| *n == 0)));
        assert_eq!([[0; 8]; 2], residual.chroma_dc);
    }

    /// The `coded_block_flag` decisions of a trace, in order.
    fn coded_block_flags(trace: &BinTrace) -> Vec<(BlockCategory, u8, bool)> {
        trace
            .bins()
            .filter_map(|bin| match bin {
                Bin::Decision(BinContext::CodedBlockFlag { category, index }, flag) => {
                    Some((*category, *index, *flag))
                }
                _ => None,
            })
            .collect()
    }

    fn cabac_8x8_trace(ctx: &SliceContext, source: &Residual, cur: &mut Macroblock) -> BinTrace {
        let mut writer = BitWriter::new();
        let mut entropy = EntropyEncoder::Cabac(BinTrace::new());

        write_residual(
            &mut SyntaxWriter {
                writer: &mut writer,
                entropy: &mut entropy,
                ctx,
                prior: &[],
            },
            Some(source),
            cur,
        )
        .unwrap();

        match entropy {
            EntropyEncoder::Cabac(trace) => trace,
            EntropyEncoder::Cavlc => unreachable!(),
        }
    }

    #[test]
    fn cabac_8x8_coded_block_flag() {
        let cbp = CodedBlockPattern { luma: 1, chroma: 0 };

        let mut source = Residual::default();
        source.planes[2].level8x8[0][0] = 3;
        source.planes[2].level8x8[0][10] = -1;

        // 4:4:4 reads coded_block_flag for every 8x8 block.
        let ctx = context(3, true, true);
        let mut written = intra_macroblock(true, cbp);
        let trace = cabac_8x8_trace(&ctx, &source, &mut written);
        assert_eq!(
            vec![
                (BlockCategory::Luma8x8, 0, false),
                (BlockCategory::Cb8x8, 0, false),
                (BlockCategory::Cr8x8, 0, true),
            ],
            coded_block_flags(&trace)
        );

        let mut entropy = EntropyDecoder::Cabac(BinTrace::from_bins(trace.bins().copied()));
        let mut mb = intra_macroblock(true, cbp);
        decode(&ctx, &mut entropy, &[], &mut mb).unwrap();

        let residual = mb.residual.as_ref().unwrap();
        assert_eq!(source.planes[2].level8x8[0], residual.planes[2].level8x8[0]);
        assert_eq!([true, false, false, false], residual.planes[2].coded_8x8);
        assert_eq!([false; 4], residual.planes[0].coded_8x8);
        assert_eq!([false; 4], residual.planes[1].coded_8x8);
        assert_eq!(written, mb);
        match entropy {
            EntropyDecoder::Cabac(replayed) => assert!(replayed.is_empty()),
            EntropyDecoder::Cavlc => unreachable!(),
        }

        // 4:2:0 infers it for the luma 8x8 block.
        let mut source = Residual::default();
        source.planes[0].level8x8[0][0] = 3;

        let ctx = context(1, true, true);
        let mut written = intra_macroblock(true, cbp);
        let trace = cabac_8x8_trace(&ctx, &source, &mut written);
        assert!(coded_block_flags(&trace).is_empty());

        let mut entropy = EntropyDecoder::Cabac(BinTrace::from_bins(trace.bins().copied()));
        let mut mb = intra_macroblock(true, cbp);
        decode(&ctx, &mut entropy, &[], &mut mb).unwrap();
        assert_eq!(source.planes[0].level8x8[0], mb.residual.unwrap().planes[0].level8x8[0]);
    }
}
