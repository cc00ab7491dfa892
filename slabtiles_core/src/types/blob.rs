//! This module provides the [`Blob`] struct, an owned byte buffer passed
//! between storage contexts, codecs and the slab reader.

use std::fmt;
use std::ops::Range;

/// An owned, contiguous byte buffer.
///
/// `Blob` is the unit of exchange for everything read from or written to a
/// storage context: slab headers, tile indexes and encoded tile payloads.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Blob(Vec<u8>);

impl Blob {
	/// Creates an empty `Blob`.
	pub fn new_empty() -> Self {
		Self(Vec::new())
	}

	/// Creates a zero-filled `Blob` of the given length.
	pub fn new_sized(length: usize) -> Self {
		Self(vec![0u8; length])
	}

	/// Returns the underlying bytes as a slice.
	pub fn as_slice(&self) -> &[u8] {
		&self.0
	}

	/// Returns the underlying bytes as a mutable slice.
	pub fn as_mut_slice(&mut self) -> &mut [u8] {
		&mut self.0
	}

	/// Returns a sub-slice of the buffer.
	///
	/// # Panics
	/// Panics if the range is out of bounds.
	pub fn get_range(&self, range: Range<usize>) -> &[u8] {
		&self.0[range]
	}

	/// Interprets the bytes as UTF-8, replacing invalid sequences.
	pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
		String::from_utf8_lossy(&self.0)
	}

	/// Returns the buffer length in bytes.
	pub fn len(&self) -> u64 {
		self.0.len() as u64
	}

	/// Returns `true` if the buffer holds no bytes.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Consumes the `Blob` and returns the underlying vector.
	pub fn into_vec(self) -> Vec<u8> {
		self.0
	}
}

impl From<Vec<u8>> for Blob {
	fn from(value: Vec<u8>) -> Self {
		Self(value)
	}
}

impl From<&[u8]> for Blob {
	fn from(value: &[u8]) -> Self {
		Self(value.to_vec())
	}
}

impl<const N: usize> From<&[u8; N]> for Blob {
	fn from(value: &[u8; N]) -> Self {
		Self(value.to_vec())
	}
}

impl fmt::Debug for Blob {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Blob({} bytes)", self.0.len())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_and_sized() {
		assert!(Blob::new_empty().is_empty());
		let blob = Blob::new_sized(7);
		assert_eq!(blob.len(), 7);
		assert_eq!(blob.as_slice(), &[0u8; 7]);
	}

	#[test]
	fn conversions() {
		let blob = Blob::from(b"slab");
		assert_eq!(blob.as_str(), "slab");
		assert_eq!(blob.get_range(1..3), b"la");
		assert_eq!(blob.into_vec(), b"slab".to_vec());
	}

	#[test]
	fn debug() {
		assert_eq!(format!("{:?}", Blob::from(b"123")), "Blob(3 bytes)");
	}
}
