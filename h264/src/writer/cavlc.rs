//! CAVLC residual blocks

use crate::error::{Error, Result};
use crate::parser::vlc::{
    coeff_token_code, run_before_code, total_zeros_code, CoeffTokenTable,
};
use crate::parser::MAX_LEVEL_PREFIX;
use crate::writer::BitWriter;

fn write_code(writer: &mut BitWriter, code: Option<(u32, u32)>, element: &'static str, value: usize) -> Result<()> {
    let (bits, len) = code.ok_or(Error::InvalidSyntaxElement {
        element,
        value: value as i64,
    })?;

    writer.write_bits(bits, len);
    Ok(())
}

/// The first `max_num_coeff` levels of a block, rejecting nonzero levels
/// past the end of it.
pub(crate) fn coded_levels(coeff_level: &[i32], max_num_coeff: usize) -> Result<&[i32]> {
    let end = max_num_coeff.min(coeff_level.len());

    match coeff_level[end..].iter().position(|level| *level != 0) {
        Some(pos) => Err(Error::InvalidSyntaxElement {
            element: "coeff_token",
            value: (end + pos) as i64,
        }),
        None => Ok(&coeff_level[..end]),
    }
}

/// Encode the level of one coefficient that is not a trailing one, choosing
/// the shortest `level_prefix` that represents it.
fn write_level(writer: &mut BitWriter, level: i32, suffix_length: u32, first_after_ones: bool) -> Result<()> {
    let mut level_code = if level > 0 {
        2 * level as i64 - 2
    } else {
        -2 * level as i64 - 1
    };
    if first_after_ones {
        level_code -= 2;
    }

    let invalid = Error::InvalidSyntaxElement {
        element: "level_prefix",
        value: level as i64,
    };
    if level_code < 0 {
        return Err(invalid);
    }

    let (level_prefix, suffix, suffix_size) = if suffix_length == 0 && level_code < 14 {
        (level_code as u32, 0, 0)
    } else if suffix_length == 0 && level_code < 30 {
        (14, (level_code - 14) as u32, 4)
    } else if suffix_length > 0 && level_code < 15 << suffix_length {
        (
            (level_code >> suffix_length) as u32,
            (level_code & ((1 << suffix_length) - 1)) as u32,
            suffix_length,
        )
    } else {
        let base = (15 << suffix_length) + if suffix_length == 0 { 15 } else { 0 };
        let escape = level_code - base + 4096;
        let level_prefix = 3 + (63 - escape.leading_zeros());
        if level_prefix > MAX_LEVEL_PREFIX {
            return Err(invalid);
        }

        let suffix = escape - (1 << (level_prefix - 3));
        (level_prefix, suffix as u32, level_prefix - 3)
    };

    writer.write_bits(0, level_prefix);
    writer.write_bit(true);
    writer.write_bits(suffix, suffix_size);

    Ok(())
}

/// ITU-T Recommendation H.264 (08/2021) 7.3.5.3.2 `residual_block_cavlc`
///
/// Encodes the first `max_num_coeff` levels of `coeff_level` in scan order
/// and returns `TotalCoeff(coeff_token)`.
pub fn residual_block(
    writer: &mut BitWriter,
    nc: i32,
    max_num_coeff: usize,
    coeff_level: &[i32],
) -> Result<u8> {
    let levels = coded_levels(coeff_level, max_num_coeff)?;

    // Nonzero levels from the highest frequency down, with their positions.
    let nonzero: Vec<(usize, i32)> = levels
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, level)| **level != 0)
        .map(|(pos, level)| (pos, *level))
        .collect();

    let total_coeff = nonzero.len();
    let trailing_ones = nonzero
        .iter()
        .take(3)
        .take_while(|(_, level)| level.abs() == 1)
        .count();

    write_code(
        writer,
        coeff_token_code(CoeffTokenTable::for_nc(nc), trailing_ones, total_coeff),
        "coeff_token",
        total_coeff,
    )?;

    if total_coeff == 0 {
        return Ok(0);
    }

    let mut suffix_length = (total_coeff > 10 && trailing_ones < 3) as u32;

    for (i, (_, level)) in nonzero.iter().enumerate() {
        if i < trailing_ones {
            writer.write_bit(*level < 0);
        } else {
            let first_after_ones = i == trailing_ones && trailing_ones < 3;
            write_level(writer, *level, suffix_length, first_after_ones)?;

            if suffix_length == 0 {
                suffix_length = 1;
            }
            if level.abs() > (3 << (suffix_length - 1)) && suffix_length < 6 {
                suffix_length += 1;
            }
        }
    }

    let mut zeros_left = nonzero[0].0 + 1 - total_coeff;

    if total_coeff < max_num_coeff {
        write_code(
            writer,
            total_zeros_code(max_num_coeff, total_coeff, zeros_left),
            "total_zeros",
            zeros_left,
        )?;
    }

    for pair in nonzero.windows(2) {
        if zeros_left == 0 {
            break;
        }

        let run_before = pair[0].0 - pair[1].0 - 1;
        write_code(
            writer,
            run_before_code(zeros_left, run_before),
            "run_before",
            run_before,
        )?;
        zeros_left -= run_before;
    }

    Ok(total_coeff as u8)
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::parser::{decode_residual_block_cavlc, H264Reader};
    use crate::writer::cavlc::residual_block;
    use crate::writer::BitWriter;

    #[test]
    fn reverse_scatter() {
        let levels = [0, 3, -1, 0, 0, -1, 1, 0, 1, 0, 0, 0, 0, 0, 0, 0];
        let mut writer = BitWriter::new();

        assert_eq!(5, residual_block(&mut writer, 0, 16, &levels).unwrap());
        assert_eq!(26, writer.bits_written());
        assert_eq!(
            vec![0b0000_1000, 0b0101_0010, 0b1101_0110, 0b1100_0000],
            writer.into_bytes()
        );
    }

    #[test]
    fn level_escape() {
        let mut levels = [0; 15];
        levels[0] = 5000;
        levels[3] = -20;
        levels[14] = 1;

        for nc in [0, 3, 9] {
            let mut writer = BitWriter::new();
            residual_block(&mut writer, nc, 15, &levels).unwrap();

            let data = writer.into_bytes();
            let mut reader = H264Reader::from_source(&data[..]);
            let mut decoded = [0; 15];
            assert_eq!(
                3,
                decode_residual_block_cavlc(&mut reader, nc, 15, &mut decoded).unwrap()
            );
            assert_eq!(levels, decoded);
        }
    }

    #[test]
    fn chroma_dc_block() {
        let levels = [-2, 0, 1, 0];
        let mut writer = BitWriter::new();
        residual_block(&mut writer, -1, 4, &levels).unwrap();

        let data = writer.into_bytes();
        let mut reader = H264Reader::from_source(&data[..]);
        let mut decoded = [0; 4];
        decode_residual_block_cavlc(&mut reader, -1, 4, &mut decoded).unwrap();
        assert_eq!(levels, decoded);
    }

    #[test]
    fn levels_past_block_end() {
        let mut levels = [0; 16];
        levels[2] = 4;
        levels[15] = -1;
        let mut writer = BitWriter::new();

        assert!(matches!(
            residual_block(&mut writer, 0, 15, &levels),
            Err(Error::InvalidSyntaxElement {
                element: "coeff_token",
                value: 15
            })
        ));
        assert_eq!(0, writer.bits_written());
    }

    #[test]
    fn level_out_of_range() {
        let mut levels = [0; 16];
        levels[0] = 1 << 24;
        let mut writer = BitWriter::new();

        assert!(matches!(
            residual_block(&mut writer, 0, 16, &levels),
            Err(Error::InvalidSyntaxElement {
                element: "level_prefix",
                ..
            })
        ));
    }
}
