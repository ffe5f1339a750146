//! Slice data

use crate::cabac::{BinEncoder, NoCabac};
use crate::context::SliceContext;
use crate::error::{Error, Result};
use crate::neighbour::initial_field_decoding_flag;
use crate::types::Macroblock;
use crate::writer::cabac::CabacWriter;
use crate::writer::macroblock::write_macroblock;
use crate::writer::syntax::{EntropyEncoder, SyntaxWriter};
use crate::writer::BitWriter;
use log::{debug, trace};

/// Check that `macroblocks` can form one slice: addresses follow
/// `NextMbAddress` from the first macroblock of the slice, and skipped
/// records only occur in inter slices.
fn check_addresses(ctx: &SliceContext, macroblocks: &[Macroblock]) -> Result<()> {
    if macroblocks.is_empty() {
        return Err(Error::InvalidSyntaxElement {
            element: "slice_data",
            value: 0,
        });
    }

    let mut expected = ctx.first_mb_address();

    for mb in macroblocks {
        if mb.address != expected || mb.address >= ctx.pic_size_in_mbs {
            return Err(Error::InvalidSyntaxElement {
                element: "mb_address",
                value: mb.address as i64,
            }
            .at_macroblock(expected));
        }

        if mb.mb_type.is_skip() && ctx.slice_type.is_intra() {
            return Err(Error::InvalidSyntaxElement {
                element: "mb_skip_flag",
                value: 1,
            }
            .at_macroblock(mb.address));
        }

        expected = ctx.next_mb_address(expected);
    }

    if ctx.entropy_coding_mode_flag && ctx.mbaff_frame_flag {
        if let Some(last) = macroblocks.last() {
            if last.address % 2 == 0 {
                return Err(Error::InvalidSyntaxElement {
                    element: "end_of_slice_flag",
                    value: last.address as i64,
                }
                .at_macroblock(last.address));
            }
        }
    }

    Ok(())
}

/// Drives the slice data loop of ITU-T Recommendation H.264 (08/2021) 7.3.4
/// in the writing direction.
struct SliceDataEncoder<'a, B> {
    ctx: &'a SliceContext,
    entropy: EntropyEncoder<B>,

    /// The normalized records written so far.
    written: Vec<Macroblock>,

    /// `prevMbSkipped`
    prev_mb_skipped: bool,
}

impl<'a, B> SliceDataEncoder<'a, B>
where
    B: BinEncoder,
{
    fn skipped_macroblock(&self, address: u32) -> Macroblock {
        let field = initial_field_decoding_flag(self.ctx, &self.written, address);
        trace!("macroblock {}: skipped", address);

        Macroblock::skipped(address, self.ctx.slice_type, field)
    }

    /// `mb_field_decoding_flag` when present, then `macroblock_layer`.
    fn write_coded(&mut self, writer: &mut BitWriter, source: &Macroblock) -> Result<Macroblock> {
        let address = source.address;
        let field = initial_field_decoding_flag(self.ctx, &self.written, address);
        let mut cur = Macroblock::new(address, field);
        let write_field_flag = self.ctx.mbaff_frame_flag && (address % 2 == 0 || self.prev_mb_skipped);

        let mut syntax = SyntaxWriter {
            writer: &mut *writer,
            entropy: &mut self.entropy,
            ctx: self.ctx,
            prior: &self.written,
        };

        if write_field_flag {
            syntax.mb_field_decoding_flag(&cur, source.mb_field_decoding_flag)?;
            cur.mb_field_decoding_flag = source.mb_field_decoding_flag;
        }

        write_macroblock(&mut syntax, source, &mut cur)?;

        if write_field_flag && address % 2 == 1 {
            if let Some(top) = self.written.last_mut() {
                if top.address == address - 1 && top.mb_skip_flag {
                    top.mb_field_decoding_flag = cur.mb_field_decoding_flag;
                }
            }
        }

        trace!(
            "macroblock {}: {:?}, coded block pattern {}",
            address,
            cur.mb_type,
            cur.coded_block_pattern.code()
        );

        Ok(cur)
    }

    fn write_cavlc(&mut self, writer: &mut BitWriter, macroblocks: &[Macroblock]) -> Result<()> {
        let inter = !self.ctx.slice_type.is_intra();
        let mut i = 0;

        while i < macroblocks.len() {
            if inter {
                let mb_skip_run = macroblocks[i..]
                    .iter()
                    .take_while(|mb| mb.mb_type.is_skip())
                    .count();

                writer.write_ue(mb_skip_run as u32)?;
                self.prev_mb_skipped = mb_skip_run > 0;

                for mb in &macroblocks[i..i + mb_skip_run] {
                    let cur = self.skipped_macroblock(mb.address);
                    self.written.push(cur);
                }
                i += mb_skip_run;

                if i == macroblocks.len() {
                    break;
                }
            }

            let source = &macroblocks[i];
            let cur = self
                .write_coded(writer, source)
                .map_err(|e| e.at_macroblock(source.address))?;
            self.written.push(cur);
            i += 1;
        }

        writer.write_rbsp_trailing_bits();
        Ok(())
    }

    /// One macroblock of a CABAC slice: `mb_skip_flag`, the macroblock and
    /// `end_of_slice_flag`, as far as each is present.
    fn write_cabac_macroblock(&mut self, writer: &mut BitWriter, source: &Macroblock, last: bool) -> Result<()> {
        let inter = !self.ctx.slice_type.is_intra();
        let address = source.address;
        let skipped = source.mb_type.is_skip();

        if inter {
            let field = initial_field_decoding_flag(self.ctx, &self.written, address);
            let blank = Macroblock::new(address, field);
            if let EntropyEncoder::Cabac(engine) = &mut self.entropy {
                CabacWriter::new(engine, writer).mb_skip_flag(&blank, skipped)?;
            }
        }

        let cur = if skipped {
            self.skipped_macroblock(address)
        } else {
            self.write_coded(writer, source)?
        };

        if let EntropyEncoder::Cabac(engine) = &mut self.entropy {
            engine.macroblock_done(&cur);
        }
        self.written.push(cur);

        if inter {
            self.prev_mb_skipped = skipped;
        }

        if !(self.ctx.mbaff_frame_flag && address % 2 == 0) {
            if let EntropyEncoder::Cabac(engine) = &mut self.entropy {
                CabacWriter::new(engine, writer).end_of_slice_flag(last)?;
            }
        }

        Ok(())
    }

    fn write_cabac(&mut self, writer: &mut BitWriter, macroblocks: &[Macroblock]) -> Result<()> {
        writer.align_with(true);
        if let EntropyEncoder::Cabac(engine) = &mut self.entropy {
            engine.initialise(writer)?;
        }

        for (i, source) in macroblocks.iter().enumerate() {
            let last = i + 1 == macroblocks.len();
            self.write_cabac_macroblock(writer, source, last)
                .map_err(|e| e.at_macroblock(source.address))?;
        }

        // Flushing the engine wrote `rbsp_stop_one_bit`.
        writer.align_with(false);
        Ok(())
    }
}

fn write_slice<B>(
    writer: &mut BitWriter,
    ctx: &SliceContext,
    entropy: EntropyEncoder<B>,
    macroblocks: &[Macroblock],
) -> Result<Vec<Macroblock>>
where
    B: BinEncoder,
{
    if ctx.entropy_coding_mode_flag != entropy.is_cabac() {
        return Err(Error::InternalDecoderError);
    }
    check_addresses(ctx, macroblocks)?;

    debug!(
        "slice data: writing {:?} slice of {} macroblocks from {}",
        ctx.slice_type,
        macroblocks.len(),
        ctx.first_mb_address()
    );

    let mut encoder = SliceDataEncoder {
        ctx,
        entropy,
        written: Vec::with_capacity(macroblocks.len()),
        prev_mb_skipped: false,
    };

    if encoder.entropy.is_cabac() {
        encoder.write_cabac(writer, macroblocks)?;
    } else {
        encoder.write_cavlc(writer, macroblocks)?;
    }

    debug!("slice data: wrote {} bits", writer.bits_written());

    Ok(encoder.written)
}

/// Write the slice data of a CAVLC slice, `rbsp_slice_trailing_bits`
/// included.
///
/// `macroblocks` must cover consecutive addresses of the slice group from
/// the first macroblock of the slice. Returns the records the parser
/// produces from the written bits.
pub fn write_slice_data(
    writer: &mut BitWriter,
    ctx: &SliceContext,
    macroblocks: &[Macroblock],
) -> Result<Vec<Macroblock>> {
    write_slice::<NoCabac>(writer, ctx, EntropyEncoder::Cavlc, macroblocks)
}

/// Write the slice data of a CABAC slice with `engine`.
pub fn write_slice_data_cabac<B>(
    writer: &mut BitWriter,
    ctx: &SliceContext,
    engine: B,
    macroblocks: &[Macroblock],
) -> Result<Vec<Macroblock>>
where
    B: BinEncoder,
{
    write_slice(writer, ctx, EntropyEncoder::Cabac(engine), macroblocks)
}
