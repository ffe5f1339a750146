//! Variable-length-code tables

/// A single entry in a VLC table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Entry<T> {
    /// This entry represents a successful VLC parse.
    ///
    /// The value in `End` will be returned when it is reached in the table.
    End(T),

    /// This entry represents a fork in the table.
    ///
    /// Upon encountering a fork, another bit in the bitstream should be read.
    /// The fork provides a table index for the entry to consider when the bit
    /// is zero (left) or one (right).
    Fork(usize, usize),
}

/// A table whose entries yield `T`.
pub type Table<T> = [Entry<T>];

/// Index of the entry reached by bit sequences that are not a codeword.
const INVALID: usize = 1;

/// Build a decode tree yielding the index of each codeword.
///
/// Zero-length entries are not codewords. Bit sequences that match no
/// codeword decode to `None`.
fn build_table(bits: &[u32], lens: &[u8]) -> Vec<Entry<Option<u8>>> {
    let mut table = vec![Entry::Fork(INVALID, INVALID), Entry::End(None)];

    for (value, (&code, &len)) in bits.iter().zip(lens.iter()).enumerate() {
        if len == 0 {
            continue;
        }

        let mut node = 0;
        for depth in (0..len).rev() {
            let one = (code >> depth) & 1 == 1;
            let next = match table[node] {
                Entry::Fork(zero, one_index) => {
                    if one {
                        one_index
                    } else {
                        zero
                    }
                }
                Entry::End(_) => break,
            };

            let child = if depth == 0 {
                table.push(Entry::End(Some(value as u8)));
                table.len() - 1
            } else if next == INVALID {
                table.push(Entry::Fork(INVALID, INVALID));
                table.len() - 1
            } else {
                next
            };

            if let Entry::Fork(zero, one_index) = &mut table[node] {
                if one {
                    *one_index = child;
                } else {
                    *zero = child;
                }
            }
            node = child;
        }
    }

    table
}

fn widen<T: Copy + Into<u32>, const N: usize>(bits: &[T; N]) -> [u32; N] {
    let mut wide = [0; N];
    for (wide, bits) in wide.iter_mut().zip(bits.iter()) {
        *wide = (*bits).into();
    }
    wide
}

/// ITU-T Recommendation H.264 (08/2021) Table 9-5 column selected by `nC`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CoeffTokenTable {
    /// `0 <= nC < 2`, `2 <= nC < 4`, `4 <= nC < 8` and `8 <= nC`.
    Luma(usize),

    /// `nC == -1`, chroma DC of 4:2:0 macroblocks.
    ChromaDc420,

    /// `nC == -2`, chroma DC of 4:2:2 macroblocks.
    ChromaDc422,
}

impl CoeffTokenTable {
    pub fn for_nc(nc: i32) -> Self {
        match nc {
            -1 => Self::ChromaDc420,
            -2 => Self::ChromaDc422,
            0 | 1 => Self::Luma(0),
            2 | 3 => Self::Luma(1),
            4..=7 => Self::Luma(2),
            _ => Self::Luma(3),
        }
    }
}

/// Split a `coeff_token` table index into `TrailingOnes` and `TotalCoeff`.
pub fn map_coeff_token(val: u8) -> (usize, usize) {
    const TRAILING_ONES: [u8; 6] = [0, 0, 1, 0, 1, 2];
    const TOTAL_COEFF: [u8; 6] = [0, 1, 1, 2, 2, 2];

    if val < 6 {
        (
            TRAILING_ONES[val as usize] as usize,
            TOTAL_COEFF[val as usize] as usize,
        )
    } else {
        (((val - 6) & 3) as usize, ((val + 6) >> 2) as usize)
    }
}

/// The `coeff_token` table index of a `TrailingOnes`/`TotalCoeff` pair.
pub fn coeff_token_index(trailing_ones: usize, total_coeff: usize) -> u8 {
    (match total_coeff {
        0 => 0,
        1 => 1 + trailing_ones,
        2 => 3 + trailing_ones,
        _ => 6 + (total_coeff - 3) * 4 + trailing_ones,
    }) as u8
}

/// Decode trees for every CAVLC residual table.
pub struct CavlcTables {
    coeff_token: Vec<Vec<Entry<Option<u8>>>>,
    chroma_dc_420_coeff_token: Vec<Entry<Option<u8>>>,
    chroma_dc_422_coeff_token: Vec<Entry<Option<u8>>>,
    total_zeros: Vec<Vec<Entry<Option<u8>>>>,
    chroma_dc_420_total_zeros: Vec<Vec<Entry<Option<u8>>>>,
    chroma_dc_422_total_zeros: Vec<Vec<Entry<Option<u8>>>>,
    run_before: Vec<Vec<Entry<Option<u8>>>>,
}

impl CavlcTables {
    fn new() -> Self {
        Self {
            coeff_token: COEFF_TOKEN_BITS
                .iter()
                .zip(COEFF_TOKEN_LENS.iter())
                .map(|(bits, lens)| build_table(&widen(bits), lens))
                .collect(),
            chroma_dc_420_coeff_token: build_table(
                &widen(&CHROMA_DC_COEFF_TOKEN_BITS),
                &CHROMA_DC_COEFF_TOKEN_LENS,
            ),
            chroma_dc_422_coeff_token: build_table(
                &widen(&CHROMA_DC_422_COEFF_TOKEN_BITS),
                &CHROMA_DC_422_COEFF_TOKEN_LENS,
            ),
            total_zeros: TOTAL_ZERO_BITS
                .iter()
                .zip(TOTAL_ZERO_LENS.iter())
                .map(|(bits, lens)| build_table(&widen(bits), lens))
                .collect(),
            chroma_dc_420_total_zeros: CHROMA_DC_TOTAL_ZERO_BITS
                .iter()
                .zip(CHROMA_DC_TOTAL_ZERO_LENS.iter())
                .map(|(bits, lens)| build_table(&widen(bits), lens))
                .collect(),
            chroma_dc_422_total_zeros: CHROMA_DC_422_TOTAL_ZERO_BITS
                .iter()
                .zip(CHROMA_DC_422_TOTAL_ZERO_LENS.iter())
                .map(|(bits, lens)| build_table(&widen(bits), lens))
                .collect(),
            run_before: RUN_BEFORE_BITS
                .iter()
                .zip(RUN_BEFORE_LENS.iter())
                .map(|(bits, lens)| build_table(&widen(bits), lens))
                .collect(),
        }
    }

    pub fn coeff_token(&self, table: CoeffTokenTable) -> &Table<Option<u8>> {
        match table {
            CoeffTokenTable::Luma(index) => &self.coeff_token[index.min(3)],
            CoeffTokenTable::ChromaDc420 => &self.chroma_dc_420_coeff_token,
            CoeffTokenTable::ChromaDc422 => &self.chroma_dc_422_coeff_token,
        }
    }

    /// The `total_zeros` table for a block of `max_num_coeff` coefficients.
    ///
    /// `total_coeff` must lie in `1..max_num_coeff`.
    pub fn total_zeros(&self, max_num_coeff: usize, total_coeff: usize) -> &Table<Option<u8>> {
        let tables = match max_num_coeff {
            4 => &self.chroma_dc_420_total_zeros,
            8 => &self.chroma_dc_422_total_zeros,
            _ => &self.total_zeros,
        };

        &tables[(total_coeff - 1).min(tables.len() - 1)]
    }

    /// The `run_before` table for the given number of zeros left.
    pub fn run_before(&self, zeros_left: usize) -> &Table<Option<u8>> {
        &self.run_before[(zeros_left - 1).min(6)]
    }
}

lazy_static! {
    pub static ref CAVLC_TABLES: CavlcTables = CavlcTables::new();
}

fn code(bits: u32, len: u8) -> Option<(u32, u32)> {
    if len == 0 {
        None
    } else {
        Some((bits, len as u32))
    }
}

/// The codeword `(bits, length)` of a `coeff_token`.
pub fn coeff_token_code(table: CoeffTokenTable, trailing_ones: usize, total_coeff: usize) -> Option<(u32, u32)> {
    let index = coeff_token_index(trailing_ones, total_coeff) as usize;

    match table {
        CoeffTokenTable::Luma(table) => {
            let table = table.min(3);
            code(
                *COEFF_TOKEN_BITS[table].get(index)? as u32,
                *COEFF_TOKEN_LENS[table].get(index)?,
            )
        }
        CoeffTokenTable::ChromaDc420 => code(
            *CHROMA_DC_COEFF_TOKEN_BITS.get(index)? as u32,
            *CHROMA_DC_COEFF_TOKEN_LENS.get(index)?,
        ),
        CoeffTokenTable::ChromaDc422 => code(
            *CHROMA_DC_422_COEFF_TOKEN_BITS.get(index)? as u32,
            *CHROMA_DC_422_COEFF_TOKEN_LENS.get(index)?,
        ),
    }
}

/// The codeword of `total_zeros` for a block of `max_num_coeff` coefficients.
pub fn total_zeros_code(max_num_coeff: usize, total_coeff: usize, total_zeros: usize) -> Option<(u32, u32)> {
    let row = total_coeff.checked_sub(1)?;

    match max_num_coeff {
        4 => code(
            *CHROMA_DC_TOTAL_ZERO_BITS.get(row)?.get(total_zeros)? as u32,
            *CHROMA_DC_TOTAL_ZERO_LENS.get(row)?.get(total_zeros)?,
        ),
        8 => code(
            *CHROMA_DC_422_TOTAL_ZERO_BITS.get(row)?.get(total_zeros)? as u32,
            *CHROMA_DC_422_TOTAL_ZERO_LENS.get(row)?.get(total_zeros)?,
        ),
        _ => code(
            *TOTAL_ZERO_BITS.get(row)?.get(total_zeros)? as u32,
            *TOTAL_ZERO_LENS.get(row)?.get(total_zeros)?,
        ),
    }
}

/// The codeword of `run_before` given the number of zeros left.
pub fn run_before_code(zeros_left: usize, run_before: usize) -> Option<(u32, u32)> {
    let row = zeros_left.checked_sub(1)?.min(6);

    code(
        *RUN_BEFORE_BITS[row].get(run_before)? as u32,
        *RUN_BEFORE_LENS[row].get(run_before)?,
    )
}

/// Table 9-4 `coded_block_pattern` for `ChromaArrayType` 1 and 2, intra
/// macroblocks, indexed by `codeNum`.
pub const INTRA_CBP_CODES: [u8; 48] = [
    47, 31, 15, 0, 23, 27, 29, 30, 7, 11, 13, 14, 39, 43, 45, 46, 16, 3, 5, 10, 12, 19, 21, 26, 28,
    35, 37, 42, 44, 1, 2, 4, 8, 17, 18, 20, 24, 6, 9, 22, 25, 32, 33, 34, 36, 40, 38, 41,
];

/// Table 9-4 for `ChromaArrayType` 1 and 2, inter macroblocks.
pub const INTER_CBP_CODES: [u8; 48] = [
    0, 16, 1, 2, 4, 8, 32, 3, 5, 10, 12, 15, 47, 7, 11, 13, 14, 6, 9, 31, 35, 37, 42, 44, 33, 34, 36,
    40, 39, 43, 45, 46, 17, 18, 20, 24, 19, 21, 26, 28, 23, 27, 29, 30, 22, 25, 38, 41,
];

/// Table 9-4 for `ChromaArrayType` 0 and 3, intra macroblocks.
pub const MONO_INTRA_CBP_CODES: [u8; 16] = [15, 0, 7, 11, 13, 14, 3, 5, 10, 12, 1, 2, 4, 8, 6, 9];

/// Table 9-4 for `ChromaArrayType` 0 and 3, inter macroblocks.
pub const MONO_INTER_CBP_CODES: [u8; 16] = [0, 1, 2, 4, 8, 3, 5, 10, 12, 15, 7, 11, 13, 14, 6, 9];

/// The `codeNum` that `me(v)` maps to a `coded_block_pattern`.
pub fn cbp_code_num(chroma_array_type: u8, intra: bool, cbp: u8) -> Option<u32> {
    let map: &[u8] = match (chroma_array_type, intra) {
        (1 | 2, true) => &INTRA_CBP_CODES,
        (1 | 2, false) => &INTER_CBP_CODES,
        (_, true) => &MONO_INTRA_CBP_CODES,
        (_, false) => &MONO_INTER_CBP_CODES,
    };

    map.iter().position(|&entry| entry == cbp).map(|code| code as u32)
}

#[rustfmt::skip]
const COEFF_TOKEN_BITS: [[u16; 62]; 4] = [
  [
    0x01, 0x05, 0x01, 0x07, 0x04, 0x01, 0x07, 0x06,
    0x05, 0x03, 0x07, 0x06, 0x05, 0x03, 0x07, 0x06,
    0x05, 0x04, 0x0F, 0x06, 0x05, 0x04, 0x0B, 0x0E,
    0x05, 0x04, 0x08, 0x0A, 0x0D, 0x04, 0x0F, 0x0E,
    0x09, 0x04, 0x0B, 0x0A, 0x0D, 0x0C, 0x0F, 0x0E,
    0x09, 0x0C, 0x0B, 0x0A, 0x0D, 0x08, 0x0F, 0x01,
    0x09, 0x0C, 0x0B, 0x0E, 0x0D, 0x08, 0x07, 0x0A,
    0x09, 0x0C, 0x04, 0x06, 0x05, 0x08
  ], [
    0x03, 0x0B, 0x02, 0x07, 0x07, 0x03, 0x07, 0x0A,
    0x09, 0x05, 0x07, 0x06, 0x05, 0x04, 0x04, 0x06,
    0x05, 0x06, 0x07, 0x06, 0x05, 0x08, 0x0F, 0x06,
    0x05, 0x04, 0x0B, 0x0E, 0x0D, 0x04, 0x0F, 0x0A,
    0x09, 0x04, 0x0B, 0x0E, 0x0D, 0x0C, 0x08, 0x0A,
    0x09, 0x08, 0x0F, 0x0E, 0x0D, 0x0C, 0x0B, 0x0A,
    0x09, 0x0C, 0x07, 0x0B, 0x06, 0x08, 0x09, 0x08,
    0x0A, 0x01, 0x07, 0x06, 0x05, 0x04
  ], [
    0x0F, 0x0F, 0x0E, 0x0B, 0x0F, 0x0D, 0x08, 0x0C,
    0x0E, 0x0C, 0x0F, 0x0A, 0x0B, 0x0B, 0x0B, 0x08,
    0x09, 0x0A, 0x09, 0x0E, 0x0D, 0x09, 0x08, 0x0A,
    0x09, 0x08, 0x0F, 0x0E, 0x0D, 0x0D, 0x0B, 0x0E,
    0x0A, 0x0C, 0x0F, 0x0A, 0x0D, 0x0C, 0x0B, 0x0E,
    0x09, 0x0C, 0x08, 0x0A, 0x0D, 0x08, 0x0D, 0x07,
    0x09, 0x0C, 0x09, 0x0C, 0x0B, 0x0A, 0x05, 0x08,
    0x07, 0x06, 0x01, 0x04, 0x03, 0x02
  ], [
    0x03, 0x00, 0x01, 0x04, 0x05, 0x06, 0x08, 0x09,
    0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10, 0x11,
    0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19,
    0x1A, 0x1B, 0x1C, 0x1D, 0x1E, 0x1F, 0x20, 0x21,
    0x22, 0x23, 0x24, 0x25, 0x26, 0x27, 0x28, 0x29,
    0x2A, 0x2B, 0x2C, 0x2D, 0x2E, 0x2F, 0x30, 0x31,
    0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39,
    0x3A, 0x3B, 0x3C, 0x3D, 0x3E, 0x3F
  ]
];
#[rustfmt::skip]
const COEFF_TOKEN_LENS: [[u8; 62]; 4] = [
  [
     1,  6,  2,  8,  6,  3,  9,  8,  7,  5, 10,  9,  8,  6, 11, 10,
     9,  7, 13, 11, 10,  8, 13, 13, 11,  9, 13, 13, 13, 10, 14, 14,
    13, 11, 14, 14, 14, 13, 15, 15, 14, 14, 15, 15, 15, 14, 16, 15,
    15, 15, 16, 16, 16, 15, 16, 16, 16, 16, 16, 16, 16, 16
  ], [
     2,  6,  2,  6,  5,  3,  7,  6,  6,  4,  8,  6,  6,  4,  8,  7,
     7,  5,  9,  8,  8,  6, 11,  9,  9,  6, 11, 11, 11,  7, 12, 11,
    11,  9, 12, 12, 12, 11, 12, 12, 12, 11, 13, 13, 13, 12, 13, 13,
    13, 13, 13, 14, 13, 13, 14, 14, 14, 13, 14, 14, 14, 14
  ], [
     4,  6,  4,  6,  5,  4,  6,  5,  5,  4,  7,  5,  5,  4,  7,  5,
     5,  4,  7,  6,  6,  4,  7,  6,  6,  4,  8,  7,  7,  5,  8,  8,
     7,  6,  9,  8,  8,  7,  9,  9,  8,  8,  9,  9,  9,  8, 10,  9,
     9,  9, 10, 10, 10, 10, 10, 10, 10, 10, 10, 10, 10, 10
  ], [ 6; 62 ]
];

#[rustfmt::skip]
const CHROMA_DC_COEFF_TOKEN_BITS: [u8; 14] = [
    1, 7, 1, 4, 6, 1, 3, 3, 2, 5, 2, 3, 2, 0
];
#[rustfmt::skip]
const CHROMA_DC_COEFF_TOKEN_LENS: [u8; 14] = [
    2, 6, 1, 6, 6, 3, 6, 7, 7, 6, 6, 8, 8, 7
];

#[rustfmt::skip]
const TOTAL_ZERO_BITS: [[u8; 16]; 15] = [
    [ 1, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 3, 2, 1 ],
    [ 7, 6, 5, 4, 3, 5, 4, 3, 2, 3, 2, 3, 2, 1, 0, 0 ],
    [ 5, 7, 6, 5, 4, 3, 4, 3, 2, 3, 2, 1, 1, 0, 0, 0 ],
    [ 3, 7, 5, 4, 6, 5, 4, 3, 3, 2, 2, 1, 0, 0, 0, 0 ],
    [ 5, 4, 3, 7, 6, 5, 4, 3, 2, 1, 1, 0, 0, 0, 0, 0 ],
    [ 1, 1, 7, 6, 5, 4, 3, 2, 1, 1, 0, 0, 0, 0, 0, 0 ],
    [ 1, 1, 5, 4, 3, 3, 2, 1, 1, 0, 0, 0, 0, 0, 0, 0 ],
    [ 1, 1, 1, 3, 3, 2, 2, 1, 0, 0, 0, 0, 0, 0, 0, 0 ],
    [ 1, 0, 1, 3, 2, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0 ],
    [ 1, 0, 1, 3, 2, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0 ],
    [ 0, 1, 1, 2, 1, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0 ],
    [ 0, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0 ],
    [ 0, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0 ],
    [ 0, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0 ],
    [ 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0 ]
];
#[rustfmt::skip]
const TOTAL_ZERO_LENS: [[u8; 16]; 15] = [
    [ 1, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 9 ],
    [ 3, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 6, 6, 6, 6, 0 ],
    [ 4, 3, 3, 3, 4, 4, 3, 3, 4, 5, 5, 6, 5, 6, 0, 0 ],
    [ 5, 3, 4, 4, 3, 3, 3, 4, 3, 4, 5, 5, 5, 0, 0, 0 ],
    [ 4, 4, 4, 3, 3, 3, 3, 3, 4, 5, 4, 5, 0, 0, 0, 0 ],
    [ 6, 5, 3, 3, 3, 3, 3, 3, 4, 3, 6, 0, 0, 0, 0, 0 ],
    [ 6, 5, 3, 3, 3, 2, 3, 4, 3, 6, 0, 0, 0, 0, 0, 0 ],
    [ 6, 4, 5, 3, 2, 2, 3, 3, 6, 0, 0, 0, 0, 0, 0, 0 ],
    [ 6, 6, 4, 2, 2, 3, 2, 5, 0, 0, 0, 0, 0, 0, 0, 0 ],
    [ 5, 5, 3, 2, 2, 2, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0 ],
    [ 4, 4, 3, 3, 1, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0 ],
    [ 4, 4, 2, 1, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0 ],
    [ 3, 3, 1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0 ],
    [ 2, 2, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0 ],
    [ 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0 ]
];

#[rustfmt::skip]
const CHROMA_DC_TOTAL_ZERO_BITS: [[u8; 4]; 3] = [
    [ 1, 1, 1, 0 ], [ 1, 1, 0, 0 ], [ 1, 0, 0, 0 ]
];
#[rustfmt::skip]
const CHROMA_DC_TOTAL_ZERO_LENS: [[u8; 4]; 3] = [
    [ 1, 2, 3, 3 ], [ 1, 2, 2, 0 ], [ 1, 1, 0, 0 ]
];

#[rustfmt::skip]
const RUN_BEFORE_BITS: [[u8; 15]; 7] = [
    [ 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0 ],
    [ 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0 ],
    [ 3, 2, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0 ],
    [ 3, 2, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0 ],
    [ 3, 2, 3, 2, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0 ],
    [ 3, 0, 1, 3, 2, 5, 4, 0, 0, 0, 0, 0, 0, 0, 0 ],
    [ 7, 6, 5, 4, 3, 2, 1, 1, 1, 1, 1, 1, 1, 1, 1 ]
];
#[rustfmt::skip]
const RUN_BEFORE_LENS: [[u8; 15]; 7] = [
    [ 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,  0,  0 ],
    [ 1, 2, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,  0,  0 ],
    [ 2, 2, 2, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0,  0,  0 ],
    [ 2, 2, 2, 3, 3, 0, 0, 0, 0, 0, 0, 0, 0,  0,  0 ],
    [ 2, 2, 3, 3, 3, 3, 0, 0, 0, 0, 0, 0, 0,  0,  0 ],
    [ 2, 3, 3, 3, 3, 3, 3, 0, 0, 0, 0, 0, 0,  0,  0 ],
    [ 3, 3, 3, 3, 3, 3, 3, 4, 5, 6, 7, 8, 9, 10, 11 ]
];

#[rustfmt::skip]
const CHROMA_DC_422_COEFF_TOKEN_BITS: [u8; 30] = [
    1, 15, 1, 14, 13, 1, 7, 12, 11, 1, 6, 5, 10, 1, 7, 6,
    4, 9, 7, 6, 5, 8, 7, 6, 5, 4, 7, 5, 4, 4
];
#[rustfmt::skip]
const CHROMA_DC_422_COEFF_TOKEN_LENS: [u8; 30] = [
    1, 7, 2, 7, 7, 3, 9, 7, 7, 5, 9, 9, 7, 6, 10, 10,
    9, 7, 11, 11, 10, 7, 12, 12, 11, 10, 13, 12, 12, 11
];

#[rustfmt::skip]
const CHROMA_DC_422_TOTAL_ZERO_BITS: [[u8; 8]; 7] = [
    [ 1, 2, 3, 2, 3, 1, 1, 0 ],
    [ 0, 1, 1, 4, 5, 6, 7, 0 ],
    [ 0, 1, 1, 2, 6, 7, 0, 0 ],
    [ 6, 0, 1, 2, 7, 0, 0, 0 ],
    [ 0, 1, 2, 3, 0, 0, 0, 0 ],
    [ 0, 1, 1, 0, 0, 0, 0, 0 ],
    [ 0, 1, 0, 0, 0, 0, 0, 0 ]
];
#[rustfmt::skip]
const CHROMA_DC_422_TOTAL_ZERO_LENS: [[u8; 8]; 7] = [
    [ 1, 3, 3, 4, 4, 4, 5, 5 ],
    [ 3, 2, 3, 3, 3, 3, 3, 0 ],
    [ 3, 3, 2, 2, 3, 3, 0, 0 ],
    [ 3, 2, 2, 2, 3, 0, 0, 0 ],
    [ 2, 2, 2, 2, 0, 0, 0, 0 ],
    [ 2, 2, 1, 0, 0, 0, 0, 0 ],
    [ 1, 1, 0, 0, 0, 0, 0, 0 ]
];

#[cfg(test)]
mod tests {
    use crate::parser::reader::H264Reader;
    use crate::parser::vlc::{
        cbp_code_num, coeff_token_code, coeff_token_index, map_coeff_token, run_before_code,
        total_zeros_code, CoeffTokenTable, CAVLC_TABLES,
    };

    #[test]
    fn coeff_token_indices() {
        for total_coeff in 0..=16 {
            for trailing_ones in 0..=total_coeff.min(3) {
                let index = coeff_token_index(trailing_ones, total_coeff);
                assert_eq!((trailing_ones, total_coeff), map_coeff_token(index));
            }
        }
    }

    #[test]
    fn decode_coeff_token() {
        // 0001 01 (0 <= nC < 2): TrailingOnes 0, TotalCoeff 1
        // 01 (nC == -1): TrailingOnes 0, TotalCoeff 0
        // 0000 0011 1 (nC == -2): TrailingOnes 0, TotalCoeff 3
        let data = [0b0001_0101, 0b0000_0011, 0b1000_0000];
        let mut reader = H264Reader::from_source(&data[..]);

        let token = reader
            .read_vlc(CAVLC_TABLES.coeff_token(CoeffTokenTable::for_nc(1)))
            .unwrap();
        assert_eq!(Some((0, 1)), token.map(map_coeff_token));

        let token = reader
            .read_vlc(CAVLC_TABLES.coeff_token(CoeffTokenTable::for_nc(-1)))
            .unwrap();
        assert_eq!(Some((0, 0)), token.map(map_coeff_token));

        let token = reader
            .read_vlc(CAVLC_TABLES.coeff_token(CoeffTokenTable::for_nc(-2)))
            .unwrap();
        assert_eq!(Some((0, 3)), token.map(map_coeff_token));
    }

    #[test]
    fn undefined_codeword() {
        // 000010 is not a codeword of the 8 <= nC table.
        let data = [0b0000_1000];
        let mut reader = H264Reader::from_source(&data[..]);

        let token = reader
            .read_vlc(CAVLC_TABLES.coeff_token(CoeffTokenTable::for_nc(9)))
            .unwrap();
        assert_eq!(None, token);
    }

    #[test]
    fn encoder_codes() {
        assert_eq!(Some((0b101, 6)), coeff_token_code(CoeffTokenTable::Luma(0), 0, 1));
        assert_eq!(Some((1, 1)), coeff_token_code(CoeffTokenTable::ChromaDc422, 0, 0));
        assert_eq!(None, coeff_token_code(CoeffTokenTable::ChromaDc420, 0, 5));
        assert_eq!(Some((1, 1)), total_zeros_code(16, 1, 0));
        assert_eq!(Some((0, 1)), total_zeros_code(15, 15, 0));
        assert_eq!(Some((1, 2)), total_zeros_code(8, 2, 1));
        assert_eq!(Some((1, 11)), run_before_code(14, 14));
        assert_eq!(None, run_before_code(0, 0));
        assert_eq!(Some(0), cbp_code_num(1, true, 47));
        assert_eq!(Some(3), cbp_code_num(0, false, 4));
        assert_eq!(None, cbp_code_num(3, false, 16));
    }
}
