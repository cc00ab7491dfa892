//! This module provides the [`ByteRange`] struct, which represents a range
//! of bytes by offset and length.

use std::fmt;
use std::ops::Range;

/// A contiguous byte range within a stored object, given by offset and length.
///
/// Slab headers and tile indexes are addressed with `ByteRange`s before being
/// handed to a storage context for reading.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct ByteRange {
	/// The starting offset of the byte range.
	pub offset: u64,
	/// The length of the byte range in bytes.
	pub length: u64,
}

impl ByteRange {
	/// Creates a new `ByteRange` with the specified `offset` and `length`.
	pub fn new(offset: u64, length: u64) -> Self {
		Self { offset, length }
	}

	/// Creates an empty `ByteRange`, starting at offset 0 with length 0.
	pub fn empty() -> Self {
		Self { offset: 0, length: 0 }
	}

	/// Converts the `ByteRange` to a `std::ops::Range<usize>`.
	pub fn as_range_usize(&self) -> Range<usize> {
		Range {
			start: self.offset as usize,
			end: (self.offset + self.length) as usize,
		}
	}
}

impl fmt::Debug for ByteRange {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "ByteRange[{},{}]", self.offset, self.length)
	}
}
