//! In-memory write buffers for object-store contexts.
//!
//! Object storage needs a full-object PUT, so writes between `open_to_write`
//! and `close_to_write` accumulate here and are flushed in one piece.

use super::StorageError;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub(crate) struct WriteBuffers {
	buffers: Mutex<HashMap<String, Vec<u8>>>,
}

impl WriteBuffers {
	pub fn new() -> WriteBuffers {
		WriteBuffers::default()
	}

	pub fn open(&self, name: &str) {
		self.buffers.lock().unwrap().insert(name.to_owned(), Vec::new());
	}

	pub fn write(&self, data: &[u8], offset: u64, name: &str) -> Result<(), StorageError> {
		let mut buffers = self.buffers.lock().unwrap();
		let buffer = buffers.get_mut(name).ok_or_else(|| StorageError::Backend {
			name: name.to_owned(),
			message: "object was not opened for writing".to_owned(),
		})?;
		let end = offset as usize + data.len();
		if buffer.len() < end {
			buffer.resize(end, 0);
		}
		buffer[offset as usize..end].copy_from_slice(data);
		Ok(())
	}

	pub fn write_full(&self, data: &[u8], name: &str) -> Result<(), StorageError> {
		let mut buffers = self.buffers.lock().unwrap();
		let buffer = buffers.get_mut(name).ok_or_else(|| StorageError::Backend {
			name: name.to_owned(),
			message: "object was not opened for writing".to_owned(),
		})?;
		*buffer = data.to_vec();
		Ok(())
	}

	/// Removes and returns the buffer of `name`, ready to flush.
	pub fn take(&self, name: &str) -> Result<Vec<u8>, StorageError> {
		self
			.buffers
			.lock()
			.unwrap()
			.remove(name)
			.ok_or_else(|| StorageError::Backend {
				name: name.to_owned(),
				message: "object was not opened for writing".to_owned(),
			})
	}
}
