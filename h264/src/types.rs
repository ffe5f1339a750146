//! Parsed H.264 slice data types

bitflags! {
    /// Options which influence how strictly slice data is parsed.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct ParserOption : u8 {
        /// Accept padding bits that do not carry their mandated value.
        ///
        /// `cabac_alignment_one_bit` and `pcm_alignment_zero_bit` violations
        /// are logged as warnings instead of failing the slice.
        const LENIENT_ALIGNMENT = 0b1;
    }
}

/// ITU-T Recommendation H.264 (08/2021) 7.4.3 `slice_type`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SliceType {
    P,
    B,
    I,
    Sp,
    Si,
}

impl SliceType {
    /// Interpret a coded `slice_type`, including the 5..=9 aliases.
    pub fn from_code(slice_type: u32) -> Option<Self> {
        match slice_type {
            0 | 5 => Some(Self::P),
            1 | 6 => Some(Self::B),
            2 | 7 => Some(Self::I),
            3 | 8 => Some(Self::Sp),
            4 | 9 => Some(Self::Si),
            _ => None,
        }
    }

    /// Whether every macroblock of the slice is intra coded.
    ///
    /// Such slices carry neither `mb_skip_run` nor `mb_skip_flag`.
    pub fn is_intra(self) -> bool {
        matches!(self, Self::I | Self::Si)
    }

    pub fn is_b(self) -> bool {
        matches!(self, Self::B)
    }
}

/// ITU-T Recommendation H.264 (08/2021) Tables 7-11, 7-13, 7-14, 7-17, 7-18
/// `MbPartPredMode` and `SubMbPredMode`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PredMode {
    Intra4x4,
    Intra8x8,
    Intra16x16,
    PredL0,
    PredL1,
    BiPred,
    Direct,

    /// The mode is not applicable (I_PCM, or partition beyond `NumMbPart`).
    Na,
}

impl PredMode {
    /// Whether the partition carries list 0 motion data.
    pub fn uses_list(self, list: usize) -> bool {
        match self {
            Self::PredL0 => list == 0,
            Self::PredL1 => list == 1,
            Self::BiPred => true,
            _ => false,
        }
    }

    pub fn is_intra(self) -> bool {
        matches!(self, Self::Intra4x4 | Self::Intra8x8 | Self::Intra16x16)
    }
}

/// Partitioning of one inter macroblock or sub-macroblock type.
#[derive(Copy, Clone, Debug)]
struct Partitioning {
    parts: u8,
    modes: [PredMode; 2],
    width: u8,
    height: u8,
}

const fn part(parts: u8, modes: [PredMode; 2], width: u8, height: u8) -> Partitioning {
    Partitioning {
        parts,
        modes,
        width,
        height,
    }
}

use PredMode::{BiPred as Bi, Direct as Dir, Na, PredL0 as L0, PredL1 as L1};

/// Table 7-13, `mb_type` 0..=4 of P and SP slices.
static P_PARTITIONS: [Partitioning; 5] = [
    part(1, [L0, Na], 16, 16), //P_L0_16x16
    part(2, [L0, L0], 16, 8),  //P_L0_L0_16x8
    part(2, [L0, L0], 8, 16),  //P_L0_L0_8x16
    part(4, [Na, Na], 8, 8),   //P_8x8
    part(4, [Na, Na], 8, 8),   //P_8x8ref0
];

/// Table 7-14, `mb_type` 0..=22 of B slices.
static B_PARTITIONS: [Partitioning; 23] = [
    part(0, [Dir, Na], 8, 8),  //B_Direct_16x16
    part(1, [L0, Na], 16, 16), //B_L0_16x16
    part(1, [L1, Na], 16, 16), //B_L1_16x16
    part(1, [Bi, Na], 16, 16), //B_Bi_16x16
    part(2, [L0, L0], 16, 8),  //B_L0_L0_16x8
    part(2, [L0, L0], 8, 16),  //B_L0_L0_8x16
    part(2, [L1, L1], 16, 8),  //B_L1_L1_16x8
    part(2, [L1, L1], 8, 16),  //B_L1_L1_8x16
    part(2, [L0, L1], 16, 8),  //B_L0_L1_16x8
    part(2, [L0, L1], 8, 16),  //B_L0_L1_8x16
    part(2, [L1, L0], 16, 8),  //B_L1_L0_16x8
    part(2, [L1, L0], 8, 16),  //B_L1_L0_8x16
    part(2, [L0, Bi], 16, 8),  //B_L0_Bi_16x8
    part(2, [L0, Bi], 8, 16),  //B_L0_Bi_8x16
    part(2, [L1, Bi], 16, 8),  //B_L1_Bi_16x8
    part(2, [L1, Bi], 8, 16),  //B_L1_Bi_8x16
    part(2, [Bi, L0], 16, 8),  //B_Bi_L0_16x8
    part(2, [Bi, L0], 8, 16),  //B_Bi_L0_8x16
    part(2, [Bi, L1], 16, 8),  //B_Bi_L1_16x8
    part(2, [Bi, L1], 8, 16),  //B_Bi_L1_8x16
    part(2, [Bi, Bi], 16, 8),  //B_Bi_Bi_16x8
    part(2, [Bi, Bi], 8, 16),  //B_Bi_Bi_8x16
    part(4, [Na, Na], 8, 8),   //B_8x8
];

/// Table 7-17, `sub_mb_type` of P and SP slices.
static SUB_P_PARTITIONS: [Partitioning; 4] = [
    part(1, [L0, Na], 8, 8), //P_L0_8x8
    part(2, [L0, Na], 8, 4), //P_L0_8x4
    part(2, [L0, Na], 4, 8), //P_L0_4x8
    part(4, [L0, Na], 4, 4), //P_L0_4x4
];

/// Table 7-18, `sub_mb_type` of B slices.
static SUB_B_PARTITIONS: [Partitioning; 13] = [
    part(4, [Dir, Na], 4, 4), //B_Direct_8x8
    part(1, [L0, Na], 8, 8),  //B_L0_8x8
    part(1, [L1, Na], 8, 8),  //B_L1_8x8
    part(1, [Bi, Na], 8, 8),  //B_Bi_8x8
    part(2, [L0, Na], 8, 4),  //B_L0_8x4
    part(2, [L0, Na], 4, 8),  //B_L0_4x8
    part(2, [L1, Na], 8, 4),  //B_L1_8x4
    part(2, [L1, Na], 4, 8),  //B_L1_4x8
    part(2, [Bi, Na], 8, 4),  //B_Bi_8x4
    part(2, [Bi, Na], 4, 8),  //B_Bi_4x8
    part(4, [L0, Na], 4, 4),  //B_L0_4x4
    part(4, [L1, Na], 4, 4),  //B_L1_4x4
    part(4, [Bi, Na], 4, 4),  //B_Bi_4x4
];

/// ITU-T Recommendation H.264 (08/2021) 7.4.5 `mb_type`
///
/// The payload is the type number within its table, not the coded value:
/// intra macroblocks in P and B slices are offset by 5 and 23 respectively
/// in the bitstream, but are stored here as `I(n)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MbType {
    /// Table 7-11: 0 is `I_NxN`, 1..=24 are `I_16x16_*`, 25 is `I_PCM`.
    I(u8),

    /// Table 7-12 `SI`.
    Si,

    /// Table 7-13: 0..=4, `P_L0_16x16` through `P_8x8ref0`.
    P(u8),

    /// Table 7-14: 0..=22, `B_Direct_16x16` through `B_8x8`.
    B(u8),

    /// Inferred for macroblocks skipped in P and SP slices.
    PSkip,

    /// Inferred for macroblocks skipped in B slices.
    BSkip,
}

pub const I_NXN: u8 = 0;
pub const I_PCM: u8 = 25;
pub const P_8X8: u8 = 3;
pub const P_8X8_REF0: u8 = 4;
pub const B_DIRECT_16X16: u8 = 0;
pub const B_8X8: u8 = 22;

const NUM_I_TYPES: u32 = 26;
const NUM_P_TYPES: u32 = 5;
const NUM_B_TYPES: u32 = 23;

impl MbType {
    /// Interpret a coded `mb_type` value for the given slice type.
    ///
    /// Returns `None` if the value lies outside every table of the slice.
    pub fn from_code(slice_type: SliceType, code: u32) -> Option<Self> {
        let intra = |code: u32| {
            if code < NUM_I_TYPES {
                Some(Self::I(code as u8))
            } else {
                None
            }
        };

        match slice_type {
            SliceType::I => intra(code),
            SliceType::Si if code == 0 => Some(Self::Si),
            SliceType::Si => intra(code - 1),
            SliceType::P | SliceType::Sp if code < NUM_P_TYPES => Some(Self::P(code as u8)),
            SliceType::P | SliceType::Sp => intra(code - NUM_P_TYPES),
            SliceType::B if code < NUM_B_TYPES => Some(Self::B(code as u8)),
            SliceType::B => intra(code - NUM_B_TYPES),
        }
    }

    /// The coded `mb_type` value of this type within the given slice type.
    ///
    /// Returns `None` for skipped types, which are never coded, and for types
    /// that cannot occur in the slice type.
    pub fn code(self, slice_type: SliceType) -> Option<u32> {
        match (self, slice_type) {
            (Self::I(n), SliceType::I) => Some(n as u32),
            (Self::I(n), SliceType::Si) => Some(n as u32 + 1),
            (Self::I(n), SliceType::P | SliceType::Sp) => Some(n as u32 + NUM_P_TYPES),
            (Self::I(n), SliceType::B) => Some(n as u32 + NUM_B_TYPES),
            (Self::Si, SliceType::Si) => Some(0),
            (Self::P(n), SliceType::P | SliceType::Sp) => Some(n as u32),
            (Self::B(n), SliceType::B) => Some(n as u32),
            _ => None,
        }
    }

    /// Build an `I_16x16` type from its prediction mode and coded block
    /// pattern components.
    pub fn intra_16x16(pred_mode: u8, cbp_chroma: u8, cbp_luma_coded: bool) -> Self {
        Self::I(1 + (pred_mode & 3) + 4 * cbp_chroma.min(2) + if cbp_luma_coded { 12 } else { 0 })
    }

    /// The skipped type inferred for the slice type.
    pub fn skip_for(slice_type: SliceType) -> Self {
        if slice_type.is_b() {
            Self::BSkip
        } else {
            Self::PSkip
        }
    }

    pub fn is_skip(self) -> bool {
        matches!(self, Self::PSkip | Self::BSkip)
    }

    pub fn is_pcm(self) -> bool {
        self == Self::I(I_PCM)
    }

    pub fn is_i_nxn(self) -> bool {
        self == Self::I(I_NXN)
    }

    pub fn is_intra_16x16(self) -> bool {
        matches!(self, Self::I(n) if (1..=24).contains(&n))
    }

    pub fn is_intra(self) -> bool {
        matches!(self, Self::I(_) | Self::Si)
    }

    pub fn is_b_direct_16x16(self) -> bool {
        self == Self::B(B_DIRECT_16X16)
    }

    pub fn is_p_8x8_ref0(self) -> bool {
        self == Self::P(P_8X8_REF0)
    }

    fn partitioning(self) -> Option<&'static Partitioning> {
        match self {
            Self::P(n) => P_PARTITIONS.get(n as usize),
            Self::B(n) => B_PARTITIONS.get(n as usize),
            Self::PSkip => P_PARTITIONS.first(),
            Self::BSkip => B_PARTITIONS.first(),
            _ => None,
        }
    }

    /// `NumMbPart(mb_type)`; intra types report a single partition.
    pub fn num_mb_part(self) -> usize {
        match self.partitioning() {
            Some(p) => p.parts as usize,
            None => 1,
        }
    }

    /// `MbPartPredMode(mb_type, mbPartIdx)`.
    ///
    /// `I_NxN` resolves to `Intra8x8` when `transform_size_8x8_flag` is set.
    pub fn mb_part_pred_mode(self, part: usize, transform_size_8x8_flag: bool) -> PredMode {
        match self {
            Self::I(I_NXN) if transform_size_8x8_flag => PredMode::Intra8x8,
            Self::I(I_NXN) | Self::Si => PredMode::Intra4x4,
            Self::I(I_PCM) => PredMode::Na,
            Self::I(_) => PredMode::Intra16x16,
            _ => self
                .partitioning()
                .and_then(|p| p.modes.get(part).copied())
                .unwrap_or(PredMode::Na),
        }
    }

    /// `MbPartWidth` and `MbPartHeight`, in luma samples.
    pub fn mb_part_size(self) -> (u8, u8) {
        match self.partitioning() {
            Some(p) => (p.width, p.height),
            None => (16, 16),
        }
    }

    /// The `Intra16x16PredMode` of an `I_16x16` type.
    pub fn intra_16x16_pred_mode(self) -> Option<u8> {
        match self {
            Self::I(n) if self.is_intra_16x16() => Some((n - 1) % 4),
            _ => None,
        }
    }

    /// The coded block pattern implied by an `I_16x16` type.
    pub fn intra_16x16_coded_block_pattern(self) -> Option<CodedBlockPattern> {
        match self {
            Self::I(n) if self.is_intra_16x16() => Some(CodedBlockPattern {
                luma: if n >= 13 { 15 } else { 0 },
                chroma: ((n - 1) / 4) % 3,
            }),
            _ => None,
        }
    }
}

/// ITU-T Recommendation H.264 (08/2021) 7.4.5.2 `sub_mb_type`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SubMbType {
    /// Table 7-17: 0..=3, `P_L0_8x8` through `P_L0_4x4`.
    P(u8),

    /// Table 7-18: 0..=12, `B_Direct_8x8` through `B_Bi_4x4`.
    B(u8),
}

pub const B_DIRECT_8X8: u8 = 0;

impl SubMbType {
    pub fn from_code(slice_type: SliceType, code: u32) -> Option<Self> {
        match slice_type {
            SliceType::B if code < SUB_B_PARTITIONS.len() as u32 => Some(Self::B(code as u8)),
            SliceType::P | SliceType::Sp if code < SUB_P_PARTITIONS.len() as u32 => {
                Some(Self::P(code as u8))
            }
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::P(n) | Self::B(n) => n as u32,
        }
    }

    fn partitioning(self) -> Option<&'static Partitioning> {
        match self {
            Self::P(n) => SUB_P_PARTITIONS.get(n as usize),
            Self::B(n) => SUB_B_PARTITIONS.get(n as usize),
        }
    }

    pub fn is_b_direct_8x8(self) -> bool {
        self == Self::B(B_DIRECT_8X8)
    }

    /// `NumSubMbPart(sub_mb_type)`.
    pub fn num_sub_mb_part(self) -> usize {
        self.partitioning().map(|p| p.parts as usize).unwrap_or(1)
    }

    /// `SubMbPredMode(sub_mb_type)`.
    pub fn sub_mb_pred_mode(self) -> PredMode {
        self.partitioning()
            .map(|p| p.modes[0])
            .unwrap_or(PredMode::Na)
    }

    /// `SubMbPartWidth` and `SubMbPartHeight`, in luma samples.
    pub fn sub_mb_part_size(self) -> (u8, u8) {
        self.partitioning()
            .map(|p| (p.width, p.height))
            .unwrap_or((8, 8))
    }
}

/// ITU-T Recommendation H.264 (08/2021) 7.4.5 `coded_block_pattern`
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CodedBlockPattern {
    /// `CodedBlockPatternLuma`, one bit per 8x8 luma region.
    pub luma: u8,

    /// `CodedBlockPatternChroma`: 0 (none), 1 (DC only) or 2 (DC and AC).
    pub chroma: u8,
}

impl CodedBlockPattern {
    pub fn from_code(cbp: u8) -> Self {
        Self {
            luma: cbp % 16,
            chroma: cbp / 16,
        }
    }

    pub fn code(self) -> u8 {
        self.chroma * 16 + self.luma
    }

    pub fn luma_coded(self, blk8x8: usize) -> bool {
        self.luma & (1 << blk8x8) != 0
    }

    pub fn is_empty(self) -> bool {
        self.luma == 0 && self.chroma == 0
    }
}

/// ITU-T Recommendation H.264 (08/2021) 7.3.5 `pcm_sample_luma`,
/// `pcm_sample_chroma`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PcmSamples {
    /// 256 luma samples in raster order.
    pub luma: Vec<u16>,

    /// `2 * MbWidthC * MbHeightC` chroma samples, all Cb samples first.
    pub chroma: Vec<u16>,
}

/// Coefficient levels of one colour plane coded with the luma syntax.
///
/// Every block not covered by the coded block pattern stays zero.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaneResidual {
    /// `Intra16x16DCLevel`
    pub dc: [i32; 16],

    /// `Intra16x16ACLevel`, indexed by 4x4 block.
    pub ac: [[i32; 15]; 16],

    /// `LumaLevel4x4`, indexed by 4x4 block.
    pub level4x4: [[i32; 16]; 16],

    /// `LumaLevel8x8`, indexed by 8x8 block.
    pub level8x8: [[i32; 64]; 4],

    /// `coded_block_flag` of the Intra16x16 DC block.
    pub dc_coded: bool,

    /// `coded_block_flag` of each 4x4 (or AC) block. CAVLC blocks count as
    /// coded when they carry coefficients.
    pub coded: [bool; 16],

    /// `coded_block_flag` of each 8x8 block.
    pub coded_8x8: [bool; 4],

    /// `TotalCoeff(coeff_token)` of each 4x4 (or AC) block.
    pub total_coeff: [u8; 16],
}

impl Default for PlaneResidual {
    fn default() -> Self {
        Self {
            dc: [0; 16],
            ac: [[0; 15]; 16],
            level4x4: [[0; 16]; 16],
            level8x8: [[0; 64]; 4],
            dc_coded: false,
            coded: [false; 16],
            coded_8x8: [false; 4],
            total_coeff: [0; 16],
        }
    }
}

/// ITU-T Recommendation H.264 (08/2021) 7.3.5.3 `residual`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Residual {
    /// Planes coded with `residual_luma`: luma, then Cb and Cr when
    /// `ChromaArrayType` is 3.
    pub planes: [PlaneResidual; 3],

    /// `ChromaDCLevel` per chroma component (4 or 8 coefficients used).
    pub chroma_dc: [[i32; 8]; 2],

    /// `ChromaACLevel` per chroma component and 4x4 block.
    pub chroma_ac: [[[i32; 15]; 8]; 2],

    pub chroma_dc_coded: [bool; 2],

    pub chroma_ac_coded: [[bool; 8]; 2],

    pub chroma_ac_total_coeff: [[u8; 8]; 2],
}

/// ITU-T Recommendation H.264 (08/2021) 7.3.5 `macroblock_layer`
///
/// One record is produced per macroblock address covered by the slice,
/// skipped macroblocks included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Macroblock {
    /// `CurrMbAddr` of this macroblock.
    pub address: u32,

    pub mb_type: MbType,

    /// Set for skipped macroblocks, whether signalled by `mb_skip_run` or
    /// `mb_skip_flag`.
    pub mb_skip_flag: bool,

    /// Read, or inferred, for macroblocks of MBAFF frames. Otherwise it
    /// equals `field_pic_flag`.
    pub mb_field_decoding_flag: bool,

    pub transform_size_8x8_flag: bool,

    /// Present when the macroblock is split into four 8x8 partitions.
    pub sub_mb_type: Option<[SubMbType; 4]>,

    pub coded_block_pattern: CodedBlockPattern,

    pub mb_qp_delta: i32,

    pub prev_intra4x4_pred_mode_flag: [bool; 16],

    pub rem_intra4x4_pred_mode: [u8; 16],

    pub prev_intra8x8_pred_mode_flag: [bool; 4],

    pub rem_intra8x8_pred_mode: [u8; 4],

    pub intra_chroma_pred_mode: u8,

    /// `ref_idx_l0` and `ref_idx_l1`, indexed by list then partition.
    pub ref_idx: [[u32; 4]; 2],

    /// `mvd_l0` and `mvd_l1`, indexed by list, partition, sub-partition and
    /// component.
    pub mvd: [[[[i32; 2]; 4]; 4]; 2],

    /// Raw samples of an `I_PCM` macroblock.
    pub pcm: Option<PcmSamples>,

    /// Coefficient levels; `None` when no residual was coded at all.
    pub residual: Option<Box<Residual>>,
}

impl Macroblock {
    /// A blank record for the macroblock at `address`.
    pub fn new(address: u32, mb_field_decoding_flag: bool) -> Self {
        Self {
            address,
            mb_type: MbType::I(I_NXN),
            mb_skip_flag: false,
            mb_field_decoding_flag,
            transform_size_8x8_flag: false,
            sub_mb_type: None,
            coded_block_pattern: CodedBlockPattern::default(),
            mb_qp_delta: 0,
            prev_intra4x4_pred_mode_flag: [false; 16],
            rem_intra4x4_pred_mode: [0; 16],
            prev_intra8x8_pred_mode_flag: [false; 4],
            rem_intra8x8_pred_mode: [0; 4],
            intra_chroma_pred_mode: 0,
            ref_idx: [[0; 4]; 2],
            mvd: [[[[0; 2]; 4]; 4]; 2],
            pcm: None,
            residual: None,
        }
    }

    /// A skipped macroblock record.
    pub fn skipped(address: u32, slice_type: SliceType, mb_field_decoding_flag: bool) -> Self {
        Self {
            mb_type: MbType::skip_for(slice_type),
            mb_skip_flag: true,
            ..Self::new(address, mb_field_decoding_flag)
        }
    }

    /// `MbPartPredMode(mb_type, part)` of this macroblock.
    pub fn pred_mode(&self, part: usize) -> PredMode {
        self.mb_type
            .mb_part_pred_mode(part, self.transform_size_8x8_flag)
    }

    /// The residual record, created on first use.
    pub fn residual_mut(&mut self) -> &mut Residual {
        self.residual.get_or_insert_with(Default::default)
    }
}

/// The fields of `seq_parameter_set_data()` that slice data depends on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceParameters {
    pub chroma_format_idc: u8,
    pub separate_colour_plane_flag: bool,
    pub bit_depth_luma_minus8: u8,
    pub bit_depth_chroma_minus8: u8,
    pub pic_width_in_mbs_minus1: u32,
    pub pic_height_in_map_units_minus1: u32,
    pub frame_mbs_only_flag: bool,
    pub mb_adaptive_frame_field_flag: bool,
    pub direct_8x8_inference_flag: bool,
}

impl Default for SequenceParameters {
    fn default() -> Self {
        Self {
            chroma_format_idc: 1,
            separate_colour_plane_flag: false,
            bit_depth_luma_minus8: 0,
            bit_depth_chroma_minus8: 0,
            pic_width_in_mbs_minus1: 0,
            pic_height_in_map_units_minus1: 0,
            frame_mbs_only_flag: true,
            mb_adaptive_frame_field_flag: false,
            direct_8x8_inference_flag: true,
        }
    }
}

/// The fields of `pic_parameter_set_rbsp()` that slice data depends on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PictureParameters {
    pub entropy_coding_mode_flag: bool,
    pub transform_8x8_mode_flag: bool,
}

/// The fields of `slice_header()` that slice data depends on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SliceHeader {
    pub slice_type: SliceType,
    pub first_mb_in_slice: u32,
    pub field_pic_flag: bool,
    pub num_ref_idx_l0_active_minus1: u32,
    pub num_ref_idx_l1_active_minus1: u32,
}

impl SliceHeader {
    pub fn new(slice_type: SliceType, first_mb_in_slice: u32) -> Self {
        Self {
            slice_type,
            first_mb_in_slice,
            field_pic_flag: false,
            num_ref_idx_l0_active_minus1: 0,
            num_ref_idx_l1_active_minus1: 0,
        }
    }
}
