//! Uniform byte-granular I/O across storage backends.
//!
//! # Overview
//!
//! A [`Storage`] context hides where slabs live: a directory tree, a Ceph
//! pool, an S3 bucket or a Swift container. The engine only ever asks for a
//! byte range of a named object, writes buffered objects, and probes for
//! existence. All calls block the calling thread; concurrency is
//! thread-per-request (a context is `Sync` and shared read-only through a
//! [`StorageBook`]).

mod book;
#[cfg(feature = "ceph")]
mod ceph;
mod file;
mod s3;
mod swift;
mod write_buffer;

pub use book::StorageBook;
#[cfg(feature = "ceph")]
pub use ceph::{CephConfig, CephStorage};
pub use file::FileStorage;
pub use s3::{S3Config, S3Storage};
pub use swift::{SwiftConfig, SwiftStorage};

use crate::Blob;
use log::warn;
use std::fmt::Debug;
use std::sync::Arc;
use thiserror::Error;

/// A shared, connected storage context.
pub type SharedStorage = Arc<dyn Storage>;

/// The backend family of a storage context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageType {
	File,
	Ceph,
	S3,
	Swift,
}

/// Errors surfaced by storage contexts.
///
/// The split matters to callers: `NotFound` becomes nodata at the level
/// boundary and is never retried, `Transient` is retried per the context's
/// attempt policy, everything else surfaces immediately.
#[derive(Debug, Error)]
pub enum StorageError {
	#[error("object '{0}' not found")]
	NotFound(String),

	#[error("transient failure on '{name}': {message}")]
	Transient { name: String, message: String },

	#[error("storage backend error on '{name}': {message}")]
	Backend { name: String, message: String },
}

impl StorageError {
	/// `true` for timeouts and 5xx-class failures worth another attempt.
	pub fn is_retryable(&self) -> bool {
		matches!(self, StorageError::Transient { .. })
	}
}

/// Blocking byte-granular access to named objects.
///
/// Reads are range reads and may come back short when the object ends before
/// `offset + size`; the slab reader relies on this to detect symbolic slabs.
/// Writes are buffered per object name between `open_to_write` and
/// `close_to_write`; object stores flush the whole buffer in one PUT on
/// close.
pub trait Storage: Debug + Send + Sync {
	/// The backend family.
	fn storage_type(&self) -> StorageType;

	/// The bucket, pool, container or root directory of this context.
	fn tray(&self) -> &str;

	/// Establishes the connection (authentication for object stores).
	fn connect(&self) -> Result<(), StorageError> {
		Ok(())
	}

	/// Reads up to `size` bytes of object `name` starting at `offset`.
	///
	/// Returns fewer bytes when the object is shorter; this is not an error.
	fn read(&self, offset: u64, size: u64, name: &str) -> Result<Blob, StorageError>;

	/// Probes whether the named object exists.
	fn exists(&self, name: &str) -> bool;

	/// Number of attempts for `read_retrying` (1 = no retry).
	fn read_attempts(&self) -> u32 {
		1
	}

	/// Reads with the context's retry policy: transient failures are retried
	/// up to `read_attempts` times, anything else surfaces immediately.
	fn read_retrying(&self, offset: u64, size: u64, name: &str) -> Result<Blob, StorageError> {
		let attempts = self.read_attempts().max(1);
		let mut last_error = None;
		for attempt in 1..=attempts {
			match self.read(offset, size, name) {
				Ok(blob) => return Ok(blob),
				Err(e) if e.is_retryable() && attempt < attempts => {
					warn!("retrying read of '{name}' after transient failure (attempt {attempt}/{attempts}): {e}");
					last_error = Some(e);
				}
				Err(e) => return Err(e),
			}
		}
		Err(last_error.expect("at least one attempt was made"))
	}

	/// Opens object `name` for writing.
	fn open_to_write(&self, name: &str) -> Result<(), StorageError>;

	/// Writes `data` at `offset` into the open object `name`.
	fn write(&self, data: &[u8], offset: u64, name: &str) -> Result<(), StorageError>;

	/// Replaces the open object `name` with `data`.
	fn write_full(&self, data: &[u8], name: &str) -> Result<(), StorageError>;

	/// Finalizes the open object `name` (single flush for object stores).
	fn close_to_write(&self, name: &str) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Mutex;

	/// A storage that fails a configurable number of reads before succeeding.
	#[derive(Debug)]
	struct FlakyStorage {
		failures_left: Mutex<u32>,
		attempts: u32,
	}

	impl Storage for FlakyStorage {
		fn storage_type(&self) -> StorageType {
			StorageType::S3
		}
		fn tray(&self) -> &str {
			"flaky"
		}
		fn read(&self, _offset: u64, size: u64, name: &str) -> Result<Blob, StorageError> {
			let mut failures = self.failures_left.lock().unwrap();
			if *failures > 0 {
				*failures -= 1;
				return Err(StorageError::Transient {
					name: name.to_owned(),
					message: "timeout".to_owned(),
				});
			}
			Ok(Blob::new_sized(size as usize))
		}
		fn exists(&self, _name: &str) -> bool {
			true
		}
		fn read_attempts(&self) -> u32 {
			self.attempts
		}
		fn open_to_write(&self, _name: &str) -> Result<(), StorageError> {
			Ok(())
		}
		fn write(&self, _data: &[u8], _offset: u64, _name: &str) -> Result<(), StorageError> {
			Ok(())
		}
		fn write_full(&self, _data: &[u8], _name: &str) -> Result<(), StorageError> {
			Ok(())
		}
		fn close_to_write(&self, _name: &str) -> Result<(), StorageError> {
			Ok(())
		}
	}

	#[test]
	fn retry_succeeds_after_transient_failure() {
		let storage = FlakyStorage {
			failures_left: Mutex::new(1),
			attempts: 3,
		};
		let blob = storage.read_retrying(0, 16, "object").unwrap();
		assert_eq!(blob.len(), 16);
	}

	#[test]
	fn retry_gives_up_after_attempts() {
		let storage = FlakyStorage {
			failures_left: Mutex::new(5),
			attempts: 3,
		};
		let err = storage.read_retrying(0, 16, "object").unwrap_err();
		assert!(err.is_retryable());
	}

	#[test]
	fn not_found_is_not_retried() {
		#[derive(Debug)]
		struct MissingStorage {
			calls: Mutex<u32>,
		}
		impl Storage for MissingStorage {
			fn storage_type(&self) -> StorageType {
				StorageType::File
			}
			fn tray(&self) -> &str {
				""
			}
			fn read(&self, _offset: u64, _size: u64, name: &str) -> Result<Blob, StorageError> {
				*self.calls.lock().unwrap() += 1;
				Err(StorageError::NotFound(name.to_owned()))
			}
			fn exists(&self, _name: &str) -> bool {
				false
			}
			fn read_attempts(&self) -> u32 {
				5
			}
			fn open_to_write(&self, _name: &str) -> Result<(), StorageError> {
				Ok(())
			}
			fn write(&self, _data: &[u8], _offset: u64, _name: &str) -> Result<(), StorageError> {
				Ok(())
			}
			fn write_full(&self, _data: &[u8], _name: &str) -> Result<(), StorageError> {
				Ok(())
			}
			fn close_to_write(&self, _name: &str) -> Result<(), StorageError> {
				Ok(())
			}
		}

		let storage = MissingStorage { calls: Mutex::new(0) };
		assert!(storage.read_retrying(0, 16, "gone").is_err());
		assert_eq!(*storage.calls.lock().unwrap(), 1);
	}
}
