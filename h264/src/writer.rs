//! H.264 slice data serialization.
//!
//! The mirror image of the parser: each function writes exactly the bits the
//! matching parser function consumes, and reports the record the parser will
//! produce from them.

mod bitwriter;
mod cabac;
mod cavlc;
mod macroblock;
mod residual;
mod slice;
mod syntax;

pub use bitwriter::BitWriter;
pub use cabac::CabacWriter;
pub use cavlc::residual_block as write_residual_block_cavlc;
pub use macroblock::write_macroblock;
pub use residual::write_residual;
pub use slice::{write_slice_data, write_slice_data_cabac};
pub use syntax::{EntropyEncoder, SyntaxWriter};
