//! CAVLC residual blocks

use crate::error::{Error, Result};
use crate::parser::reader::H264Reader;
use crate::parser::vlc::{map_coeff_token, CoeffTokenTable, CAVLC_TABLES};
use std::io::Read;

/// Largest `level_prefix` a conforming stream can carry: 11 plus the
/// largest supported bit depth.
pub const MAX_LEVEL_PREFIX: u32 = 25;

/// Read `level_prefix`, a run of zero bits closed by a one bit.
fn read_level_prefix<R: Read>(reader: &mut H264Reader<R>) -> Result<u32> {
    let mut level_prefix = 0;

    while !reader.read_bit().map_err(|e| e.within("level_prefix"))? {
        level_prefix += 1;
        if level_prefix > MAX_LEVEL_PREFIX {
            return Err(Error::InvalidSyntaxElement {
                element: "level_prefix",
                value: level_prefix as i64,
            });
        }
    }

    Ok(level_prefix)
}

/// Decode the level of one coefficient that is not a trailing one.
///
/// `first_after_ones` applies the bias of the first such level when fewer
/// than three trailing ones precede it.
fn read_level<R: Read>(
    reader: &mut H264Reader<R>,
    suffix_length: u32,
    first_after_ones: bool,
) -> Result<i32> {
    let level_prefix = read_level_prefix(reader)?;
    let mut level_code = (level_prefix.min(15) << suffix_length) as i32;

    if suffix_length > 0 || level_prefix >= 14 {
        let level_suffix_size = if level_prefix == 14 && suffix_length == 0 {
            4
        } else if level_prefix >= 15 {
            level_prefix - 3
        } else {
            suffix_length
        };

        let level_suffix: u32 = reader
            .read_bits(level_suffix_size)
            .map_err(|e| e.within("level_suffix"))?;
        level_code += level_suffix as i32;
    }

    if level_prefix >= 15 && suffix_length == 0 {
        level_code += 15;
    }
    if level_prefix >= 16 {
        level_code += (1 << (level_prefix - 3)) - 4096;
    }
    if first_after_ones {
        level_code += 2;
    }

    Ok(if level_code % 2 == 0 {
        (level_code + 2) >> 1
    } else {
        (-level_code - 1) >> 1
    })
}

/// ITU-T Recommendation H.264 (08/2021) 7.3.5.3.2 `residual_block_cavlc`
///
/// `coeff_level` receives `max_num_coeff` levels in scan order. Returns
/// `TotalCoeff(coeff_token)`.
pub fn residual_block<R: Read>(
    reader: &mut H264Reader<R>,
    nc: i32,
    max_num_coeff: usize,
    coeff_level: &mut [i32],
) -> Result<u8> {
    for level in coeff_level.iter_mut() {
        *level = 0;
    }

    let coeff_token = reader
        .read_vlc(CAVLC_TABLES.coeff_token(CoeffTokenTable::for_nc(nc)))
        .map_err(|e| e.within("coeff_token"))?
        .ok_or(Error::StreamCorrupt {
            element: "coeff_token",
        })?;
    let (trailing_ones, total_coeff) = map_coeff_token(coeff_token);

    if total_coeff > max_num_coeff || total_coeff > coeff_level.len() {
        return Err(Error::StreamCorrupt {
            element: "coeff_token",
        });
    }
    if total_coeff == 0 {
        return Ok(0);
    }

    let mut level_val = [0i32; 16];
    let mut run_val = [0usize; 16];
    let mut suffix_length = (total_coeff > 10 && trailing_ones < 3) as u32;

    for i in 0..total_coeff {
        if i < trailing_ones {
            let trailing_ones_sign_flag = reader
                .read_bit()
                .map_err(|e| e.within("trailing_ones_sign_flag"))?;
            level_val[i] = if trailing_ones_sign_flag { -1 } else { 1 };
        } else {
            let first_after_ones = i == trailing_ones && trailing_ones < 3;
            level_val[i] = read_level(reader, suffix_length, first_after_ones)?;

            if suffix_length == 0 {
                suffix_length = 1;
            }
            if level_val[i].abs() > (3 << (suffix_length - 1)) && suffix_length < 6 {
                suffix_length += 1;
            }
        }
    }

    let mut zeros_left = if total_coeff < max_num_coeff {
        reader
            .read_vlc(CAVLC_TABLES.total_zeros(max_num_coeff, total_coeff))
            .map_err(|e| e.within("total_zeros"))?
            .ok_or(Error::StreamCorrupt {
                element: "total_zeros",
            })? as usize
    } else {
        0
    };

    if total_coeff + zeros_left > max_num_coeff {
        return Err(Error::StreamCorrupt {
            element: "total_zeros",
        });
    }

    for run in run_val.iter_mut().take(total_coeff - 1) {
        if zeros_left > 0 {
            let run_before = reader
                .read_vlc(CAVLC_TABLES.run_before(zeros_left))
                .map_err(|e| e.within("run_before"))?
                .ok_or(Error::StreamCorrupt {
                    element: "run_before",
                })? as usize;

            if run_before > zeros_left {
                return Err(Error::StreamCorrupt {
                    element: "run_before",
                });
            }

            *run = run_before;
            zeros_left -= run_before;
        }
    }
    run_val[total_coeff - 1] = zeros_left;

    let mut coeff_num = 0;
    for i in (0..total_coeff).rev() {
        coeff_num += run_val[i];
        coeff_level[coeff_num] = level_val[i];
        coeff_num += 1;
    }

    Ok(total_coeff as u8)
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::parser::cavlc::residual_block;
    use crate::parser::reader::H264Reader;
    use crate::writer::{write_residual_block_cavlc, BitWriter};

    #[test]
    fn reverse_scatter() {
        // Levels 0, 3, -1, 0, 0, -1, 1, 0, 1 in scan order, nC 0:
        // coeff_token 0000100 (TrailingOnes 3, TotalCoeff 5), signs 001,
        // level -1 as 01, level 3 as 001 0, total_zeros 110 (4),
        // run_before 10 (1), 11 (0), 01 (2), 1 (0).
        let data = [0b0000_1000, 0b0101_0010, 0b1101_0110, 0b1100_0000];
        let mut reader = H264Reader::from_source(&data[..]);
        let mut coeff_level = [0; 16];

        assert_eq!(5, residual_block(&mut reader, 0, 16, &mut coeff_level).unwrap());
        assert_eq!(
            [0, 3, -1, 0, 0, -1, 1, 0, 1, 0, 0, 0, 0, 0, 0, 0],
            coeff_level
        );
        assert_eq!(26, reader.position());
    }

    #[test]
    fn zero_budget_is_enforced() {
        // nC 0, coeff_token 1 (TotalCoeff 0), then TrailingOnes 1 TotalCoeff 1
        // (01), sign 0, total_zeros 0000 0000 1 (15) in a 15 coefficient
        // AC block.
        let data = [0b1010_0000, 0b0000_1000];
        let mut reader = H264Reader::from_source(&data[..]);
        let mut coeff_level = [9; 15];

        assert_eq!(0, residual_block(&mut reader, 0, 15, &mut coeff_level).unwrap());
        assert_eq!([0; 15], coeff_level);
        assert!(matches!(
            residual_block(&mut reader, 0, 15, &mut coeff_level),
            Err(Error::StreamCorrupt {
                element: "total_zeros"
            })
        ));
    }

    #[test]
    fn escaped_level() {
        // nC 0, coeff_token 000101 (TrailingOnes 0, TotalCoeff 1), level_prefix
        // 15 with the 12 bit suffix 1, total_zeros 1 (0).
        // levelCode = 15 + 1 + 15 + 2 = 33, so the level is -17.
        let data = [0b0001_0100, 0b0000_0000, 0b0000_0100, 0b0000_0000, 0b0110_0000];
        let mut reader = H264Reader::from_source(&data[..]);
        let mut coeff_level = [0; 16];

        assert_eq!(1, residual_block(&mut reader, 0, 16, &mut coeff_level).unwrap());
        assert_eq!(-17, coeff_level[0]);
    }

    #[test]
    fn level_prefix_limit() {
        // nC 0, coeff_token 000101 (TrailingOnes 0, TotalCoeff 1), then a
        // level_prefix of 26 zeros.
        let data = [0b0001_0100, 0b0000_0000, 0b0000_0000, 0b0000_0000];
        let mut reader = H264Reader::from_source(&data[..]);
        let mut coeff_level = [0; 16];

        assert!(matches!(
            residual_block(&mut reader, 0, 16, &mut coeff_level),
            Err(Error::InvalidSyntaxElement {
                element: "level_prefix",
                value: 26
            })
        ));
    }

    #[test]
    fn scatter_round_trip() {
        let mut full_16 = [0; 16];
        for (i, level) in full_16.iter_mut().enumerate() {
            *level = if i % 2 == 0 { i as i32 + 1 } else { -(i as i32) - 1 };
        }
        let mut full_15 = [0; 16];
        for (i, level) in full_15.iter_mut().take(15).enumerate() {
            *level = if i % 3 == 0 { -2 } else { 1 };
        }
        let mut last_16 = [0; 16];
        last_16[15] = 1;
        let mut ones_then_large = [0; 16];
        ones_then_large[0] = 100;
        ones_then_large[1] = -37;
        ones_then_large[2] = 9;
        ones_then_large[5] = 1;
        ones_then_large[9] = -1;
        ones_then_large[14] = 1;
        let mut sparse = [0; 16];
        sparse[0] = 5;
        sparse[3] = -1;
        sparse[5] = 2;
        sparse[10] = 1;
        let mut single_large = [0; 16];
        single_large[7] = -3000;

        let mut blocks: Vec<(i32, usize, [i32; 16])> = Vec::new();
        for nc in [0, 2, 4, 8] {
            blocks.push((nc, 16, full_16));
            blocks.push((nc, 15, full_15));
            blocks.push((nc, 16, last_16));
            blocks.push((nc, 15, ones_then_large));
            blocks.push((nc, 16, sparse));
            blocks.push((nc, 16, single_large));
            blocks.push((nc, 16, [0; 16]));
        }

        let chroma = [
            [3, 0, -1, 1],
            [1, 1, -1, -1],
            [0, 0, 0, -2],
            [0, 7, 0, 0],
        ];
        for levels in chroma.iter() {
            let mut block = [0; 16];
            block[..4].copy_from_slice(levels);
            blocks.push((-1, 4, block));
        }

        let chroma_422 = [
            [0, 2, 0, 0, -1, 0, 0, 1],
            [1, -1, 2, -2, 3, -3, 1, 1],
            [0, 0, 0, 0, 0, 0, 0, 1],
            [-9, 0, 0, 0, 0, 0, 0, 0],
        ];
        for levels in chroma_422.iter() {
            let mut block = [0; 16];
            block[..8].copy_from_slice(levels);
            blocks.push((-2, 8, block));
        }

        for (nc, max_num_coeff, levels) in blocks.iter() {
            let levels = &levels[..*max_num_coeff];
            let nonzero = levels.iter().filter(|level| **level != 0).count();

            let mut writer = BitWriter::new();
            let written = write_residual_block_cavlc(&mut writer, *nc, *max_num_coeff, levels).unwrap();
            let bits = writer.bits_written();
            let data = writer.into_bytes();

            let mut reader = H264Reader::from_source(&data[..]);
            let mut decoded = [0x55; 16];
            let total_coeff =
                residual_block(&mut reader, *nc, *max_num_coeff, &mut decoded[..*max_num_coeff]).unwrap();

            assert_eq!(nonzero as u8, written, "nC {} levels {:?}", nc, levels);
            assert_eq!(nonzero as u8, total_coeff, "nC {} levels {:?}", nc, levels);
            assert_eq!(levels, &decoded[..*max_num_coeff], "nC {}", nc);
            assert_eq!(bits, reader.position(), "nC {} levels {:?}", nc, levels);
        }
    }
}
