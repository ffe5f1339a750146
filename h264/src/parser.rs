//! H.264 slice data parser functions.

mod cabac;
mod cavlc;
mod macroblock;
mod reader;
mod residual;
mod slice;
mod syntax;
pub(crate) mod vlc;

pub use cabac::CabacReader;
pub use cavlc::{residual_block as decode_residual_block_cavlc, MAX_LEVEL_PREFIX};
pub use macroblock::decode_macroblock;
pub use reader::H264Reader;
pub use residual::decode_residual;
pub use slice::{decode_slice_data, decode_slice_data_cabac, SliceDataDecoder};
pub use syntax::{EntropyDecoder, SyntaxReader};
