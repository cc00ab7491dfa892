//! This module provides the [`FileStorage`] context, which resolves object
//! names relative to a root directory.

use super::{Storage, StorageError, StorageType};
use crate::Blob;
use log::debug;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Mutex;

/// Storage context over a local filesystem tree.
///
/// The tray is the root directory; object names are joined below it. Reads
/// past the end of a file come back short, which is how symbolic slabs are
/// detected.
#[derive(Debug)]
pub struct FileStorage {
	root: PathBuf,
	writers: Mutex<HashMap<String, File>>,
}

impl FileStorage {
	pub fn new(root: impl Into<PathBuf>) -> FileStorage {
		FileStorage {
			root: root.into(),
			writers: Mutex::new(HashMap::new()),
		}
	}

	fn full_path(&self, name: &str) -> PathBuf {
		self.root.join(name)
	}
}

impl Storage for FileStorage {
	fn storage_type(&self) -> StorageType {
		StorageType::File
	}

	fn tray(&self) -> &str {
		self.root.to_str().unwrap_or("")
	}

	fn read(&self, offset: u64, size: u64, name: &str) -> Result<Blob, StorageError> {
		let path = self.full_path(name);
		debug!("file read: {size} bytes at offset {offset} in {path:?}");

		let mut file = File::open(&path).map_err(|e| {
			if e.kind() == std::io::ErrorKind::NotFound {
				StorageError::NotFound(name.to_owned())
			} else {
				StorageError::Backend {
					name: name.to_owned(),
					message: e.to_string(),
				}
			}
		})?;

		file.seek(SeekFrom::Start(offset)).map_err(|e| StorageError::Backend {
			name: name.to_owned(),
			message: e.to_string(),
		})?;

		let mut buffer = vec![0u8; size as usize];
		let mut filled = 0usize;
		// plain read can come back short before EOF, so loop until EOF or full
		loop {
			let n = file.read(&mut buffer[filled..]).map_err(|e| StorageError::Backend {
				name: name.to_owned(),
				message: e.to_string(),
			})?;
			if n == 0 {
				break;
			}
			filled += n;
			if filled == buffer.len() {
				break;
			}
		}
		buffer.truncate(filled);
		Ok(Blob::from(buffer))
	}

	fn exists(&self, name: &str) -> bool {
		self.full_path(name).is_file()
	}

	fn open_to_write(&self, name: &str) -> Result<(), StorageError> {
		let path = self.full_path(name);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).map_err(|e| StorageError::Backend {
				name: name.to_owned(),
				message: e.to_string(),
			})?;
		}
		let file = OpenOptions::new()
			.write(true)
			.create(true)
			.truncate(true)
			.open(&path)
			.map_err(|e| StorageError::Backend {
				name: name.to_owned(),
				message: e.to_string(),
			})?;
		self.writers.lock().unwrap().insert(name.to_owned(), file);
		Ok(())
	}

	fn write(&self, data: &[u8], offset: u64, name: &str) -> Result<(), StorageError> {
		let mut writers = self.writers.lock().unwrap();
		let file = writers.get_mut(name).ok_or_else(|| StorageError::Backend {
			name: name.to_owned(),
			message: "object was not opened for writing".to_owned(),
		})?;
		file
			.seek(SeekFrom::Start(offset))
			.and_then(|_| file.write_all(data))
			.map_err(|e| StorageError::Backend {
				name: name.to_owned(),
				message: e.to_string(),
			})
	}

	fn write_full(&self, data: &[u8], name: &str) -> Result<(), StorageError> {
		self.write(data, 0, name)
	}

	fn close_to_write(&self, name: &str) -> Result<(), StorageError> {
		let file = self.writers.lock().unwrap().remove(name);
		match file {
			Some(file) => file.sync_all().map_err(|e| StorageError::Backend {
				name: name.to_owned(),
				message: e.to_string(),
			}),
			None => Err(StorageError::Backend {
				name: name.to_owned(),
				message: "object was not opened for writing".to_owned(),
			}),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert_fs::TempDir;

	#[test]
	fn read_write_roundtrip() {
		let dir = TempDir::new().unwrap();
		let storage = FileStorage::new(dir.path());

		storage.open_to_write("sub/dir/object.tif").unwrap();
		storage.write(b"hello slab world", 0, "sub/dir/object.tif").unwrap();
		storage.write(b"SLAB", 6, "sub/dir/object.tif").unwrap();
		storage.close_to_write("sub/dir/object.tif").unwrap();

		assert!(storage.exists("sub/dir/object.tif"));
		let blob = storage.read(0, 16, "sub/dir/object.tif").unwrap();
		assert_eq!(blob.as_slice(), b"hello SLAB world");
	}

	#[test]
	fn short_read_at_end_of_file() {
		let dir = TempDir::new().unwrap();
		let storage = FileStorage::new(dir.path());

		storage.open_to_write("small").unwrap();
		storage.write_full(b"12345", "small").unwrap();
		storage.close_to_write("small").unwrap();

		// asking for more than the file holds returns what exists
		let blob = storage.read(0, 2048, "small").unwrap();
		assert_eq!(blob.as_slice(), b"12345");

		let blob = storage.read(3, 2048, "small").unwrap();
		assert_eq!(blob.as_slice(), b"45");
	}

	#[test]
	fn missing_object_is_not_found() {
		let dir = TempDir::new().unwrap();
		let storage = FileStorage::new(dir.path());

		assert!(!storage.exists("nope"));
		match storage.read(0, 16, "nope") {
			Err(StorageError::NotFound(name)) => assert_eq!(name, "nope"),
			other => panic!("expected NotFound, got {other:?}"),
		}
	}

	#[test]
	fn write_without_open_fails() {
		let dir = TempDir::new().unwrap();
		let storage = FileStorage::new(dir.path());
		assert!(storage.write(b"data", 0, "unopened").is_err());
	}
}
