//! Pure-rust H.264 slice data parser and writer
//!
//! Covers `slice_data()` and everything below it: skip runs and flags,
//! `macroblock_layer()`, macroblock and sub-macroblock prediction, and the
//! CAVLC and CABAC residual syntax. Slice headers, parameter sets and NAL
//! framing are left to the caller, which supplies their derived values as a
//! `SliceContext`. The CABAC arithmetic engine is supplied through the
//! `BinDecoder` and `BinEncoder` traits.

#[macro_use]
extern crate bitflags;

#[macro_use]
extern crate lazy_static;

pub mod cabac;
mod context;
mod error;
pub mod neighbour;
pub mod parser;
mod traits;
mod types;
pub mod writer;

pub use crate::cabac::{Bin, BinContext, BinDecoder, BinEncoder, BinTrace, BlockCategory, NoCabac};
pub use crate::context::SliceContext;
pub use crate::error::{Error, Result};
pub use crate::parser::{decode_slice_data, decode_slice_data_cabac, H264Reader, SliceDataDecoder};
pub use crate::types::*;
pub use crate::writer::{write_slice_data, write_slice_data_cabac, BitWriter};
