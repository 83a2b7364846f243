use crate::result::*;

/// A checked cast to usize
///
/// Offsets in a memory-mapped archive are 64-bit,
/// but slicing the mapping needs a usize.
pub fn usize<I: Into<u64>>(i: I) -> DecodeResult<usize> {
    let i: u64 = i.into();
    std::convert::TryFrom::try_from(i).map_err(|_| DecodeError::InsufficientAddressSpace)
}
