//! Traits

use num_traits::{CheckedShl, Zero};
use std::ops::BitOr;

/// Unsigned integers that `H264Reader::read_bits` can assemble a field into,
/// one byte-sized piece at a time.
pub trait BitReadable: Copy + CheckedShl + BitOr<Self, Output = Self> + Zero + From<u8> {}

impl<T> BitReadable for T where T: Copy + CheckedShl + BitOr<Self, Output = Self> + Zero + From<u8> {}
