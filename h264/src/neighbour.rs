//! Neighbouring macroblock and block derivation

use crate::cabac::BlockCategory;
use crate::context::SliceContext;
use crate::types::Macroblock;

/// Locate an already-decoded macroblock of the current slice.
///
/// Records are kept in decoding order, which is increasing address order, so
/// a binary search suffices. Macroblocks of other slices are never present
/// and are therefore unavailable.
pub fn find_macroblock(prior: &[Macroblock], address: u32) -> Option<&Macroblock> {
    prior
        .binary_search_by_key(&address, |mb| mb.address)
        .ok()
        .map(|index| &prior[index])
}

/// ITU-T Recommendation H.264 (08/2021) 7.4.4 inference of
/// `mb_field_decoding_flag` for a macroblock pair that does not carry it.
///
/// The flag is copied from the left pair, else from the pair above, else the
/// pair is frame coded.
pub fn infer_field_decoding_flag(ctx: &SliceContext, prior: &[Macroblock], address: u32) -> bool {
    let pair = address / 2;
    let width = ctx.pic_width_in_mbs;

    if pair % width != 0 {
        if let Some(left) = find_macroblock(prior, 2 * (pair - 1)) {
            return left.mb_field_decoding_flag;
        }
    }

    if pair >= width {
        if let Some(above) = find_macroblock(prior, 2 * (pair - width)) {
            return above.mb_field_decoding_flag;
        }
    }

    false
}

/// The `mb_field_decoding_flag` a macroblock starts out with, before any
/// flag is coded for it: the flag of the top macroblock of its pair, or the
/// inferred one.
pub fn initial_field_decoding_flag(ctx: &SliceContext, prior: &[Macroblock], address: u32) -> bool {
    if !ctx.mbaff_frame_flag {
        return ctx.field_pic_flag;
    }

    if address % 2 == 1 {
        if let Some(top) = find_macroblock(prior, address - 1) {
            return top.mb_field_decoding_flag;
        }
    }

    infer_field_decoding_flag(ctx, prior, address)
}

/// Direction of a neighbouring block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Block A, to the left.
    Left,

    /// Block B, above.
    Above,
}

/// ITU-T Recommendation H.264 (08/2021) 6.4.12 neighbouring locations.
///
/// `(x, y)` is a location relative to the upper-left sample of `cur`, one
/// sample left of or above the block of interest. Returns the macroblock
/// covering it and the location within that macroblock.
fn locate<'a>(
    ctx: &SliceContext,
    prior: &'a [Macroblock],
    cur: &'a Macroblock,
    x: i32,
    y: i32,
    max_w: i32,
    max_h: i32,
) -> Option<(&'a Macroblock, i32, i32)> {
    if x >= 0 && y >= 0 {
        return Some((cur, x, y));
    }

    let width = ctx.pic_width_in_mbs;
    let curr = cur.address;
    let x_w = (x + max_w) % max_w;

    if !ctx.mbaff_frame_flag {
        let address = if x < 0 {
            if curr % width == 0 {
                return None;
            }
            curr - 1
        } else {
            if curr < width {
                return None;
            }
            curr - width
        };

        return find_macroblock(prior, address).map(|mb| (mb, x_w, (y + max_h) % max_h));
    }

    let pair = curr / 2;
    let is_top = curr % 2 == 0;
    let cur_frame = !cur.mb_field_decoding_flag;

    let (address, y_m) = if x < 0 {
        if pair % width == 0 {
            return None;
        }

        let a = 2 * (pair - 1);
        let a_frame = !find_macroblock(prior, a)?.mb_field_decoding_flag;

        match (cur_frame, is_top, a_frame) {
            (true, true, true) => (a, y),
            (true, true, false) => (a + (y % 2) as u32, y >> 1),
            (true, false, true) => (a + 1, y),
            (true, false, false) => (a + (y % 2) as u32, (y + max_h) >> 1),
            (false, true, true) if y < max_h / 2 => (a, y << 1),
            (false, true, true) => (a + 1, (y << 1) - max_h),
            (false, true, false) => (a, y),
            (false, false, true) if y < max_h / 2 => (a, (y << 1) + 1),
            (false, false, true) => (a + 1, (y << 1) + 1 - max_h),
            (false, false, false) => (a + 1, y),
        }
    } else if cur_frame && !is_top {
        (curr - 1, y)
    } else {
        if pair < width {
            return None;
        }

        let b = 2 * (pair - width);
        let b_frame = !find_macroblock(prior, b)?.mb_field_decoding_flag;

        match (cur_frame, is_top, b_frame) {
            (true, _, _) => (b + 1, y),
            (false, true, true) => (b + 1, 2 * y),
            (false, true, false) => (b, y),
            (false, false, _) => (b + 1, y),
        }
    };

    find_macroblock(prior, address).map(|mb| (mb, x_w, (y_m + max_h) % max_h))
}

/// The upper-left luma location of a 4x4 block in a 16x16 plane.
pub fn luma4x4_location(blk: usize) -> (i32, i32) {
    let (blk8, blk4) = (blk / 4, blk % 4);

    (
        ((blk8 % 2) * 8 + (blk4 % 2) * 4) as i32,
        ((blk8 / 2) * 8 + (blk4 / 2) * 4) as i32,
    )
}

/// `luma4x4BlkIdx` of the block covering a luma location.
fn luma4x4_index(x: i32, y: i32) -> usize {
    (8 * (y / 8) + 4 * (x / 8) + 2 * ((y % 8) / 4) + ((x % 8) / 4)) as usize
}

fn offset(direction: Direction) -> (i32, i32) {
    match direction {
        Direction::Left => (-1, 0),
        Direction::Above => (0, -1),
    }
}

/// ITU-T Recommendation H.264 (08/2021) 6.4.11.4 neighbouring 4x4 luma
/// blocks, also used for Cb and Cr when `ChromaArrayType` is 3.
pub fn neighbour_luma4x4<'a>(
    ctx: &SliceContext,
    prior: &'a [Macroblock],
    cur: &'a Macroblock,
    blk: usize,
    direction: Direction,
) -> Option<(&'a Macroblock, usize)> {
    let (x, y) = luma4x4_location(blk);
    let (dx, dy) = offset(direction);

    locate(ctx, prior, cur, x + dx, y + dy, 16, 16).map(|(mb, x, y)| (mb, luma4x4_index(x, y)))
}

/// ITU-T Recommendation H.264 (08/2021) 6.4.11.5 neighbouring 4x4 chroma
/// blocks for `ChromaArrayType` 1 and 2.
pub fn neighbour_chroma4x4<'a>(
    ctx: &SliceContext,
    prior: &'a [Macroblock],
    cur: &'a Macroblock,
    blk: usize,
    direction: Direction,
) -> Option<(&'a Macroblock, usize)> {
    let (x, y) = (((blk % 2) * 4) as i32, ((blk / 2) * 4) as i32);
    let (dx, dy) = offset(direction);
    let (max_w, max_h) = (ctx.mb_width_c as i32, ctx.mb_height_c as i32);

    locate(ctx, prior, cur, x + dx, y + dy, max_w, max_h)
        .map(|(mb, x, y)| (mb, (2 * (y / 4) + x / 4) as usize))
}

/// A block whose coefficient count predicts `nC`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CountedBlock {
    /// A 4x4 or AC block of a plane coded with the luma syntax.
    Luma { plane: usize, blk: usize },

    /// A chroma AC block of component 0 (Cb) or 1 (Cr).
    ChromaAc { component: usize, blk: usize },
}

/// `nN` of an available neighbouring block.
fn available_count(mb: &Macroblock, block: CountedBlock, blk: usize) -> i32 {
    if mb.mb_skip_flag {
        return 0;
    }
    if mb.mb_type.is_pcm() {
        return 16;
    }

    match (&mb.residual, block) {
        (Some(residual), CountedBlock::Luma { plane, .. }) => {
            residual.planes[plane].total_coeff[blk] as i32
        }
        (Some(residual), CountedBlock::ChromaAc { component, .. }) => {
            residual.chroma_ac_total_coeff[component][blk] as i32
        }
        (None, _) => 0,
    }
}

/// ITU-T Recommendation H.264 (08/2021) 9.2.1 `nC` for a block of `cur`.
///
/// `cur` must already hold the counts of blocks decoded earlier in the same
/// macroblock.
pub fn predict_total_coeff(
    ctx: &SliceContext,
    prior: &[Macroblock],
    cur: &Macroblock,
    block: CountedBlock,
) -> i32 {
    let count = |direction| {
        let neighbour = match block {
            CountedBlock::Luma { blk, .. } => neighbour_luma4x4(ctx, prior, cur, blk, direction),
            CountedBlock::ChromaAc { blk, .. } => {
                neighbour_chroma4x4(ctx, prior, cur, blk, direction)
            }
        };

        neighbour.map(|(mb, blk)| available_count(mb, block, blk))
    };

    match (count(Direction::Left), count(Direction::Above)) {
        (Some(a), Some(b)) => (a + b + 1) >> 1,
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => 0,
    }
}

/// `nC` for the `coeff_token` of a CAVLC block of `cur`.
///
/// `index` numbers blocks as for `BinContext::CodedBlockFlag`.
pub fn coeff_token_nc(
    ctx: &SliceContext,
    prior: &[Macroblock],
    cur: &Macroblock,
    category: BlockCategory,
    index: usize,
) -> i32 {
    match category {
        BlockCategory::ChromaDc if ctx.chroma_array_type == 1 => -1,
        BlockCategory::ChromaDc => -2,
        BlockCategory::ChromaAc => predict_total_coeff(
            ctx,
            prior,
            cur,
            CountedBlock::ChromaAc {
                component: index / 8,
                blk: index % 8,
            },
        ),
        _ => predict_total_coeff(
            ctx,
            prior,
            cur,
            CountedBlock::Luma {
                plane: category.plane().unwrap_or(0),
                blk: if category.is_dc() { 0 } else { index },
            },
        ),
    }
}

#[cfg(test)]
mod tests {
    use crate::context::SliceContext;
    use crate::neighbour::{
        infer_field_decoding_flag, neighbour_luma4x4, predict_total_coeff, CountedBlock, Direction,
    };
    use crate::types::{
        Macroblock, MbType, PictureParameters, SequenceParameters, SliceHeader, SliceType,
    };

    fn context(mbaff: bool) -> SliceContext {
        SliceContext::new(
            &SequenceParameters {
                pic_width_in_mbs_minus1: 3,
                pic_height_in_map_units_minus1: 3,
                frame_mbs_only_flag: !mbaff,
                mb_adaptive_frame_field_flag: mbaff,
                ..Default::default()
            },
            &PictureParameters::default(),
            &SliceHeader::new(SliceType::P, 0),
        )
        .unwrap()
    }

    fn coded(address: u32, counts: [u8; 16]) -> Macroblock {
        let mut mb = Macroblock::new(address, false);
        mb.mb_type = MbType::P(0);
        mb.residual_mut().planes[0].total_coeff = counts;
        mb
    }

    #[test]
    fn frame_neighbours() {
        let ctx = context(false);
        let mut left_counts = [0; 16];
        left_counts[5] = 4;
        let mut above_counts = [0; 16];
        above_counts[10] = 7;
        let prior = vec![coded(1, above_counts), coded(4, left_counts)];
        let cur = Macroblock::new(5, false);

        let (mb, blk) = neighbour_luma4x4(&ctx, &prior, &cur, 0, Direction::Left).unwrap();
        assert_eq!((4, 5), (mb.address, blk));
        let (mb, blk) = neighbour_luma4x4(&ctx, &prior, &cur, 0, Direction::Above).unwrap();
        assert_eq!((1, 10), (mb.address, blk));
        let (mb, blk) = neighbour_luma4x4(&ctx, &prior, &cur, 3, Direction::Left).unwrap();
        assert_eq!((5, 2), (mb.address, blk));

        let nc = predict_total_coeff(&ctx, &prior, &cur, CountedBlock::Luma { plane: 0, blk: 0 });
        assert_eq!(6, nc);
    }

    #[test]
    fn unavailable_and_special_neighbours() {
        let ctx = context(false);
        let cur = Macroblock::new(4, false);

        assert_eq!(
            0,
            predict_total_coeff(&ctx, &[], &cur, CountedBlock::Luma { plane: 0, blk: 0 })
        );

        let mut pcm = Macroblock::new(0, false);
        pcm.mb_type = MbType::I(25);
        let skipped = Macroblock::skipped(0, SliceType::P, false);

        assert_eq!(
            16,
            predict_total_coeff(&ctx, &[pcm], &cur, CountedBlock::Luma { plane: 0, blk: 0 })
        );
        assert_eq!(
            0,
            predict_total_coeff(
                &ctx,
                &[skipped],
                &cur,
                CountedBlock::Luma { plane: 0, blk: 0 }
            )
        );
    }

    #[test]
    fn mbaff_field_neighbour_of_frame_pair() {
        let ctx = context(true);
        let mut top = coded(0, [0; 16]);
        top.mb_field_decoding_flag = true;
        let mut bottom = coded(1, [0; 16]);
        bottom.mb_field_decoding_flag = true;
        let prior = vec![top, bottom];

        // Row 0 of a bottom frame macroblock is pair row 16, which is row 8
        // of the top field macroblock to the left.
        let cur = Macroblock::new(3, false);
        let (mb, blk) = neighbour_luma4x4(&ctx, &prior, &cur, 0, Direction::Left).unwrap();
        assert_eq!((0, 13), (mb.address, blk));

        assert!(infer_field_decoding_flag(&ctx, &prior, 2));
        assert!(!infer_field_decoding_flag(&ctx, &prior, 0));
    }
}
