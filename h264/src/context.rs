//! Per-slice decoding context

use crate::error::{Error, Result};
use crate::types::{ParserOption, PictureParameters, SequenceParameters, SliceHeader, SliceType};

/// Everything the slice data grammar needs to know about the active
/// parameter sets and slice header, derived once per slice.
#[derive(Clone, Debug)]
pub struct SliceContext {
    pub slice_type: SliceType,
    pub first_mb_in_slice: u32,
    pub entropy_coding_mode_flag: bool,
    pub transform_8x8_mode_flag: bool,
    pub direct_8x8_inference_flag: bool,
    pub field_pic_flag: bool,

    /// `MbaffFrameFlag`
    pub mbaff_frame_flag: bool,

    /// `num_ref_idx_l0_active_minus1` and `num_ref_idx_l1_active_minus1`.
    pub num_ref_idx_active_minus1: [u32; 2],

    /// `ChromaArrayType`
    pub chroma_array_type: u8,

    /// `SubWidthC` and `SubHeightC`; zero when there are no chroma arrays.
    pub sub_width_c: u8,
    pub sub_height_c: u8,

    /// `MbWidthC` and `MbHeightC`
    pub mb_width_c: u8,
    pub mb_height_c: u8,

    /// `BitDepthY` and `BitDepthC`
    pub bit_depth_luma: u8,
    pub bit_depth_chroma: u8,

    pub pic_width_in_mbs: u32,

    /// `PicSizeInMbs`
    pub pic_size_in_mbs: u32,

    pub options: ParserOption,

    /// `MbToSliceGroupMap`, when more than one slice group is in use.
    slice_group_map: Option<Vec<u8>>,
}

impl SliceContext {
    /// Derive the context for one slice.
    ///
    /// Parameter values outside the ranges allowed by the standard yield
    /// `Error::InvalidSyntaxElement`.
    pub fn new(
        sps: &SequenceParameters,
        pps: &PictureParameters,
        header: &SliceHeader,
    ) -> Result<Self> {
        if sps.chroma_format_idc > 3 {
            return Err(Error::InvalidSyntaxElement {
                element: "chroma_format_idc",
                value: sps.chroma_format_idc as i64,
            });
        }
        if sps.bit_depth_luma_minus8 > 6 {
            return Err(Error::InvalidSyntaxElement {
                element: "bit_depth_luma_minus8",
                value: sps.bit_depth_luma_minus8 as i64,
            });
        }
        if sps.bit_depth_chroma_minus8 > 6 {
            return Err(Error::InvalidSyntaxElement {
                element: "bit_depth_chroma_minus8",
                value: sps.bit_depth_chroma_minus8 as i64,
            });
        }
        for (element, value) in [
            (
                "num_ref_idx_l0_active_minus1",
                header.num_ref_idx_l0_active_minus1,
            ),
            (
                "num_ref_idx_l1_active_minus1",
                header.num_ref_idx_l1_active_minus1,
            ),
        ] {
            if value > 31 {
                return Err(Error::InvalidSyntaxElement {
                    element,
                    value: value as i64,
                });
            }
        }

        let chroma_array_type = if sps.separate_colour_plane_flag {
            0
        } else {
            sps.chroma_format_idc
        };
        let (sub_width_c, sub_height_c) = match chroma_array_type {
            1 => (2, 2),
            2 => (2, 1),
            3 => (1, 1),
            _ => (0, 0),
        };
        let (mb_width_c, mb_height_c) = if sub_width_c == 0 {
            (0, 0)
        } else {
            (16 / sub_width_c, 16 / sub_height_c)
        };

        let pic_width_in_mbs = sps.pic_width_in_mbs_minus1 + 1;
        let frame_height_in_mbs = (2 - sps.frame_mbs_only_flag as u32)
            * (sps.pic_height_in_map_units_minus1 + 1);
        let pic_height_in_mbs = frame_height_in_mbs / (1 + header.field_pic_flag as u32);

        Ok(Self {
            slice_type: header.slice_type,
            first_mb_in_slice: header.first_mb_in_slice,
            entropy_coding_mode_flag: pps.entropy_coding_mode_flag,
            transform_8x8_mode_flag: pps.transform_8x8_mode_flag,
            direct_8x8_inference_flag: sps.direct_8x8_inference_flag,
            field_pic_flag: header.field_pic_flag,
            mbaff_frame_flag: sps.mb_adaptive_frame_field_flag && !header.field_pic_flag,
            num_ref_idx_active_minus1: [
                header.num_ref_idx_l0_active_minus1,
                header.num_ref_idx_l1_active_minus1,
            ],
            chroma_array_type,
            sub_width_c,
            sub_height_c,
            mb_width_c,
            mb_height_c,
            bit_depth_luma: 8 + sps.bit_depth_luma_minus8,
            bit_depth_chroma: 8 + sps.bit_depth_chroma_minus8,
            pic_width_in_mbs,
            pic_size_in_mbs: pic_width_in_mbs * pic_height_in_mbs,
            options: ParserOption::empty(),
            slice_group_map: None,
        })
    }

    pub fn with_options(mut self, options: ParserOption) -> Self {
        self.options = options;
        self
    }

    /// Supply `MbToSliceGroupMap` for pictures using several slice groups.
    pub fn with_slice_group_map(mut self, map: Vec<u8>) -> Self {
        self.slice_group_map = Some(map);
        self
    }

    /// The address of the first macroblock of the slice.
    pub fn first_mb_address(&self) -> u32 {
        self.first_mb_in_slice * (1 + self.mbaff_frame_flag as u32)
    }

    /// ITU-T Recommendation H.264 (08/2021) 8.2.2 `NextMbAddress(n)`
    ///
    /// Returns `PicSizeInMbs` or more once no macroblock of the slice group
    /// follows `n`.
    pub fn next_mb_address(&self, n: u32) -> u32 {
        let mut next = n + 1;

        if let Some(map) = &self.slice_group_map {
            let group = map.get(n as usize).copied();
            while next < self.pic_size_in_mbs && map.get(next as usize).copied() != group {
                next += 1;
            }
        }

        next
    }

    /// `NumC8x8`, or zero when chroma is not coded separately from luma.
    pub fn num_c8x8(&self) -> usize {
        match self.chroma_array_type {
            1 | 2 => 4 / (self.sub_width_c as usize * self.sub_height_c as usize),
            _ => 0,
        }
    }

    /// `QpBdOffsetY`
    pub fn qp_bd_offset_y(&self) -> i32 {
        6 * (self.bit_depth_luma as i32 - 8)
    }

    /// The inclusive range `mb_qp_delta` must lie within.
    pub fn mb_qp_delta_range(&self) -> (i32, i32) {
        let half = self.qp_bd_offset_y() / 2;
        (-(26 + half), 25 + half)
    }

    /// Whether `ref_idx_lX` is present for a partition using the list.
    pub fn ref_idx_present(&self, list: usize, mb_field_decoding_flag: bool) -> bool {
        self.num_ref_idx_active_minus1[list] > 0 || mb_field_decoding_flag != self.field_pic_flag
    }

    /// The largest value `ref_idx_lX` may take.
    pub fn ref_idx_max(&self, list: usize, mb_field_decoding_flag: bool) -> u32 {
        let max = self.num_ref_idx_active_minus1[list];

        if self.mbaff_frame_flag && mb_field_decoding_flag {
            2 * max + 1
        } else {
            max
        }
    }

    /// Whether chroma DC and AC blocks follow the luma residual.
    pub fn has_chroma_blocks(&self) -> bool {
        matches!(self.chroma_array_type, 1 | 2)
    }

    /// Number of colour planes coded with the luma residual syntax.
    pub fn num_luma_like_planes(&self) -> usize {
        if self.chroma_array_type == 3 {
            3
        } else {
            1
        }
    }
}
