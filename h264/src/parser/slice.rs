//! Slice data

use crate::cabac::{BinDecoder, NoCabac};
use crate::context::SliceContext;
use crate::error::{Error, Result};
use crate::neighbour::initial_field_decoding_flag;
use crate::parser::cabac::CabacReader;
use crate::parser::macroblock::decode_macroblock;
use crate::parser::reader::H264Reader;
use crate::parser::syntax::{check_alignment_bit, EntropyDecoder, SyntaxReader};
use crate::types::Macroblock;
use log::{debug, trace};
use std::io::Read;

/// All state of the slice data loop of one slice.
///
/// Each call to `decode_next` runs one iteration of the loop of ITU-T
/// Recommendation H.264 (08/2021) 7.3.4: a skip run (or skip flag) followed
/// by at most one coded macroblock. A record is produced for every
/// macroblock address covered, skipped or not.
pub struct SliceDataDecoder<B> {
    ctx: SliceContext,

    entropy: EntropyDecoder<B>,

    /// Every macroblock decoded so far, in address order.
    macroblocks: Vec<Macroblock>,

    /// `CurrMbAddr`
    curr_mb_addr: u32,

    /// `moreDataFlag`
    more_data: bool,

    /// `prevMbSkipped`
    prev_mb_skipped: bool,

    /// Whether the alignment bits and engine initialisation are done.
    started: bool,
}

impl SliceDataDecoder<NoCabac> {
    /// Construct a decoder for a slice coded with CAVLC.
    pub fn cavlc(ctx: SliceContext) -> Result<Self> {
        Self::new(ctx, EntropyDecoder::Cavlc)
    }
}

impl<B> SliceDataDecoder<B>
where
    B: BinDecoder,
{
    /// Construct a decoder for a slice coded with CABAC, driving `engine`.
    pub fn cabac(ctx: SliceContext, engine: B) -> Result<Self> {
        Self::new(ctx, EntropyDecoder::Cabac(engine))
    }

    fn new(ctx: SliceContext, entropy: EntropyDecoder<B>) -> Result<Self> {
        if ctx.entropy_coding_mode_flag != entropy.is_cabac() {
            return Err(Error::InternalDecoderError);
        }

        let curr_mb_addr = ctx.first_mb_address();

        Ok(Self {
            ctx,
            entropy,
            macroblocks: Vec::new(),
            curr_mb_addr,
            more_data: true,
            prev_mb_skipped: false,
            started: false,
        })
    }

    pub fn context(&self) -> &SliceContext {
        &self.ctx
    }

    /// `CurrMbAddr`: the address the next iteration starts at.
    pub fn curr_mb_addr(&self) -> u32 {
        self.curr_mb_addr
    }

    /// `prevMbSkipped`
    pub fn prev_mb_skipped(&self) -> bool {
        self.prev_mb_skipped
    }

    /// Whether the slice continues.
    pub fn more_data(&self) -> bool {
        self.more_data
    }

    /// The macroblocks decoded so far.
    pub fn macroblocks(&self) -> &[Macroblock] {
        &self.macroblocks
    }

    pub fn into_macroblocks(self) -> Vec<Macroblock> {
        self.macroblocks
    }

    /// Consume `cabac_alignment_one_bit`s and initialise the engine.
    fn start<R>(&mut self, reader: &mut H264Reader<R>) -> Result<()>
    where
        R: Read,
    {
        debug!(
            "slice data: {:?} slice from macroblock {}",
            self.ctx.slice_type, self.curr_mb_addr
        );

        if let EntropyDecoder::Cabac(engine) = &mut self.entropy {
            while !reader.is_byte_aligned() {
                let bit = reader
                    .read_bit()
                    .map_err(|e| e.within("cabac_alignment_one_bit"))?;
                check_alignment_bit(&self.ctx, "cabac_alignment_one_bit", bit, true)?;
            }

            engine.initialise(reader)?;
        }

        self.started = true;
        Ok(())
    }

    /// Record skipped macroblocks for an `mb_skip_run`.
    fn skip<R>(&mut self, reader: &mut H264Reader<R>, mb_skip_run: u32) -> Result<bool>
    where
        R: Read,
    {
        self.prev_mb_skipped = mb_skip_run > 0;

        for _ in 0..mb_skip_run {
            if self.curr_mb_addr >= self.ctx.pic_size_in_mbs {
                return Err(Error::StreamCorrupt {
                    element: "mb_skip_run",
                });
            }

            let field =
                initial_field_decoding_flag(&self.ctx, &self.macroblocks, self.curr_mb_addr);
            let mb = Macroblock::skipped(self.curr_mb_addr, self.ctx.slice_type, field);
            trace!("macroblock {}: skipped", mb.address);
            self.macroblocks.push(mb);
            self.curr_mb_addr = self.ctx.next_mb_address(self.curr_mb_addr);
        }

        if mb_skip_run > 0 {
            reader.more_rbsp_data()
        } else {
            Ok(true)
        }
    }

    /// One iteration of the slice data loop.
    fn decode_iteration<R>(&mut self, reader: &mut H264Reader<R>) -> Result<()>
    where
        R: Read,
    {
        let inter = !self.ctx.slice_type.is_intra();
        let mut more_data = true;

        if inter && !self.entropy.is_cabac() {
            let mb_skip_run = reader.read_ue().map_err(|e| e.within("mb_skip_run"))?;
            more_data = self.skip(reader, mb_skip_run)?;
        }

        let address = self.curr_mb_addr;
        if more_data && address >= self.ctx.pic_size_in_mbs {
            return Err(Error::StreamCorrupt {
                element: "slice_data",
            });
        }

        let field = initial_field_decoding_flag(&self.ctx, &self.macroblocks, address);
        let mut mb = Macroblock::new(address, field);
        let mut mb_skip_flag = false;

        if inter {
            if let EntropyDecoder::Cabac(engine) = &mut self.entropy {
                mb_skip_flag = CabacReader::new(engine, reader).mb_skip_flag(&mb)?;
                if mb_skip_flag {
                    mb = Macroblock::skipped(address, self.ctx.slice_type, field);
                }
                more_data = !mb_skip_flag;
            }
        }

        if more_data {
            let read_field_flag = self.ctx.mbaff_frame_flag
                && (address % 2 == 0 || self.prev_mb_skipped);
            let mut syntax = SyntaxReader {
                reader: &mut *reader,
                entropy: &mut self.entropy,
                ctx: &self.ctx,
                prior: &self.macroblocks,
            };

            if read_field_flag {
                mb.mb_field_decoding_flag = syntax.mb_field_decoding_flag(&mb)?;
            }

            decode_macroblock(&mut syntax, &mut mb)?;

            if read_field_flag && address % 2 == 1 {
                if let Some(top) = self.macroblocks.last_mut() {
                    if top.address == address - 1 && top.mb_skip_flag {
                        top.mb_field_decoding_flag = mb.mb_field_decoding_flag;
                    }
                }
            }

            trace!(
                "macroblock {}: {:?}, coded block pattern {}",
                address,
                mb.mb_type,
                mb.coded_block_pattern.code()
            );
        } else if mb_skip_flag {
            trace!("macroblock {}: skipped", address);
        }

        if more_data || mb_skip_flag {
            if let EntropyDecoder::Cabac(engine) = &mut self.entropy {
                engine.macroblock_done(&mb);
            }
            self.macroblocks.push(mb);
        }

        self.more_data = match &mut self.entropy {
            EntropyDecoder::Cavlc => reader.more_rbsp_data()?,
            EntropyDecoder::Cabac(engine) => {
                if inter {
                    self.prev_mb_skipped = mb_skip_flag;
                }

                if self.ctx.mbaff_frame_flag && address % 2 == 0 {
                    true
                } else {
                    !CabacReader::new(engine, reader).end_of_slice_flag()?
                }
            }
        };

        self.curr_mb_addr = self.ctx.next_mb_address(address);

        Ok(())
    }

    /// Decode the next iteration of the slice data loop.
    ///
    /// Returns whether the slice continues. Errors carry the address of the
    /// macroblock they occurred in, and end the slice: subsequent calls
    /// return `Ok(false)` without reading. Macroblocks decoded before the
    /// error remain available.
    pub fn decode_next<R>(&mut self, reader: &mut H264Reader<R>) -> Result<bool>
    where
        R: Read,
    {
        if !self.more_data {
            return Ok(false);
        }

        let result = if self.started {
            self.decode_iteration(reader)
        } else {
            self.start(reader)
                .and_then(|_| self.decode_iteration(reader))
        };

        if let Err(e) = result {
            self.more_data = false;
            return Err(e.at_macroblock(self.curr_mb_addr));
        }

        if !self.more_data {
            debug!(
                "slice data: ended after {} macroblocks",
                self.macroblocks.len()
            );
        }

        Ok(self.more_data)
    }

    /// Decode every remaining iteration of the slice data loop.
    pub fn decode_to_end<R>(&mut self, reader: &mut H264Reader<R>) -> Result<()>
    where
        R: Read,
    {
        while self.decode_next(reader)? {}

        Ok(())
    }
}

/// Decode the slice data of a CAVLC slice.
pub fn decode_slice_data<R>(reader: &mut H264Reader<R>, ctx: SliceContext) -> Result<Vec<Macroblock>>
where
    R: Read,
{
    let mut decoder = SliceDataDecoder::cavlc(ctx)?;
    decoder.decode_to_end(reader)?;

    Ok(decoder.into_macroblocks())
}

/// Decode the slice data of a CABAC slice with `engine`.
pub fn decode_slice_data_cabac<R, B>(
    reader: &mut H264Reader<R>,
    ctx: SliceContext,
    engine: B,
) -> Result<Vec<Macroblock>>
where
    R: Read,
    B: BinDecoder,
{
    let mut decoder = SliceDataDecoder::cabac(ctx, engine)?;
    decoder.decode_to_end(reader)?;

    Ok(decoder.into_macroblocks())
}

#[cfg(test)]
mod tests {
    use crate::cabac::{Bin, BinContext, BinTrace, MbTypeBins};
    use crate::context::SliceContext;
    use crate::error::Error;
    use crate::parser::reader::H264Reader;
    use crate::parser::slice::SliceDataDecoder;
    use crate::types::{
        MbType, ParserOption, PictureParameters, SequenceParameters, SliceHeader, SliceType,
    };

    fn context(slice_type: SliceType, first_mb: u32, cabac: bool) -> SliceContext {
        SliceContext::new(
            &SequenceParameters {
                pic_width_in_mbs_minus1: 3,
                pic_height_in_map_units_minus1: 2,
                ..Default::default()
            },
            &PictureParameters {
                entropy_coding_mode_flag: cabac,
                ..Default::default()
            },
            &SliceHeader::new(slice_type, first_mb),
        )
        .unwrap()
    }

    #[test]
    fn skip_run_then_macroblock() {
        // mb_skip_run 3 (00100), then P_L0_16x16 (1) with mvd 0, 0 (1 1) and
        // coded_block_pattern 0 (1), then the stop bit.
        let data = [0b0010_0111, 0b1100_0000];
        let mut reader = H264Reader::from_source(&data[..]);
        let mut decoder = SliceDataDecoder::cavlc(context(SliceType::P, 5, false)).unwrap();

        assert_eq!(5, decoder.curr_mb_addr());
        assert!(!decoder.decode_next(&mut reader).unwrap());

        let mbs = decoder.macroblocks();
        assert_eq!(4, mbs.len());
        for (mb, address) in mbs[..3].iter().zip(5..) {
            assert_eq!(address, mb.address);
            assert_eq!(MbType::PSkip, mb.mb_type);
            assert!(mb.mb_skip_flag);
        }
        assert_eq!(8, mbs[3].address);
        assert_eq!(MbType::P(0), mbs[3].mb_type);
        assert!(decoder.prev_mb_skipped());
        assert_eq!(9, decoder.curr_mb_addr());
    }

    #[test]
    fn trailing_skip_run() {
        // mb_skip_run 3, then the stop bit.
        let data = [0b0010_0100];
        let mut reader = H264Reader::from_source(&data[..]);
        let mut decoder = SliceDataDecoder::cavlc(context(SliceType::P, 5, false)).unwrap();

        decoder.decode_to_end(&mut reader).unwrap();

        assert_eq!(3, decoder.macroblocks().len());
        assert!(decoder.prev_mb_skipped());
        assert!(!decoder.more_data());
    }

    #[test]
    fn skip_run_past_picture() {
        // mb_skip_run 4 from address 10 of a 12 macroblock picture.
        let data = [0b0010_1100];
        let mut reader = H264Reader::from_source(&data[..]);
        let mut decoder = SliceDataDecoder::cavlc(context(SliceType::P, 10, false)).unwrap();

        let error = decoder.decode_next(&mut reader).unwrap_err();
        assert!(matches!(
            error.root(),
            Error::StreamCorrupt {
                element: "mb_skip_run"
            }
        ));
        assert_eq!(Some(12), error.address());
    }

    #[test]
    fn invalid_mb_type_ends_slice() {
        // I_16x16_0_0_0 with nothing coded (010111), then mb_type 26.
        let data = [0b0101_1100, 0b0011_0111];
        let mut reader = H264Reader::from_source(&data[..]);
        let mut decoder = SliceDataDecoder::cavlc(context(SliceType::I, 0, false)).unwrap();

        assert!(decoder.decode_next(&mut reader).unwrap());
        let error = decoder.decode_next(&mut reader).unwrap_err();

        assert_eq!(Some(1), error.address());
        assert_eq!(Some("mb_type"), error.element());
        assert!(error.is_fatal());
        assert!(!decoder.decode_next(&mut reader).unwrap());
        assert_eq!(1, decoder.macroblocks().len());
    }

    fn pcm_slice() -> (Vec<u8>, BinTrace) {
        // Three bits of slice header, five alignment bits, then samples.
        let mut data = vec![0b1011_1111];
        data.extend([0x80; 384].iter());

        let trace = BinTrace::from_bins(vec![
            Bin::Decision(
                BinContext::MbType {
                    table: MbTypeBins::I,
                    bin_idx: 0,
                    prior: 0,
                },
                true,
            ),
            Bin::Terminate(true),
            Bin::Terminate(true),
        ]);

        (data, trace)
    }

    #[test]
    fn cabac_pcm_reinitialises_engine() {
        let (data, mut trace) = pcm_slice();
        let mut reader = H264Reader::from_source(&data[..]);
        reader.skip_bits(3).unwrap();

        let mut decoder =
            SliceDataDecoder::cabac(context(SliceType::I, 0, true), &mut trace).unwrap();
        assert!(!decoder.decode_next(&mut reader).unwrap());

        let mbs = decoder.into_macroblocks();
        assert_eq!(1, mbs.len());
        assert_eq!(MbType::I(25), mbs[0].mb_type);
        assert_eq!(Some(&0x80), mbs[0].pcm.as_ref().unwrap().luma.first());
        assert_eq!(2, trace.initialisations());
        assert!(trace.is_empty());
    }

    #[test]
    fn cabac_alignment_policy() {
        let (mut data, mut trace) = pcm_slice();
        data[0] = 0b1011_0111;

        let mut reader = H264Reader::from_source(&data[..]);
        reader.skip_bits(3).unwrap();
        let mut decoder =
            SliceDataDecoder::cabac(context(SliceType::I, 0, true), &mut trace).unwrap();
        let error = decoder.decode_next(&mut reader).unwrap_err();
        assert!(matches!(
            error.root(),
            Error::AlignmentError {
                element: "cabac_alignment_one_bit"
            }
        ));
        assert!(!error.is_fatal());

        let (_, mut trace) = pcm_slice();
        let mut reader = H264Reader::from_source(&data[..]);
        reader.skip_bits(3).unwrap();
        let ctx = context(SliceType::I, 0, true).with_options(ParserOption::LENIENT_ALIGNMENT);
        let mut decoder = SliceDataDecoder::cabac(ctx, &mut trace).unwrap();
        decoder.decode_to_end(&mut reader).unwrap();
        assert_eq!(1, decoder.macroblocks().len());
    }

    #[test]
    fn entropy_mode_must_match() {
        assert!(matches!(
            SliceDataDecoder::cavlc(context(SliceType::I, 0, true)),
            Err(Error::InternalDecoderError)
        ));
    }
}
