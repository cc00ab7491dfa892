//! This module provides the [`StorageBook`], which shares connected storage
//! contexts across levels and requests.

use super::{SharedStorage, Storage, StorageError, StorageType};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Shared storage contexts keyed by `(type, tray)`.
///
/// Object-store credentials and connections are expensive; a book hands out
/// the same `Arc` for every level addressing the same bucket, pool or
/// container. Contexts are connected once, on first insertion.
#[derive(Debug, Default)]
pub struct StorageBook {
	contexts: Mutex<HashMap<(StorageType, String), SharedStorage>>,
}

impl StorageBook {
	pub fn new() -> StorageBook {
		StorageBook::default()
	}

	/// Returns the context for `(storage_type, tray)`, creating and
	/// connecting it with `create` when the book does not hold one yet.
	pub fn get_or_create(
		&self,
		storage_type: StorageType,
		tray: &str,
		create: impl FnOnce() -> Result<SharedStorage, StorageError>,
	) -> Result<SharedStorage, StorageError> {
		let mut contexts = self.contexts.lock().unwrap();
		if let Some(context) = contexts.get(&(storage_type, tray.to_owned())) {
			return Ok(Arc::clone(context));
		}
		let context = create()?;
		context.connect()?;
		contexts.insert((storage_type, tray.to_owned()), Arc::clone(&context));
		Ok(context)
	}

	/// Looks up an already registered context.
	pub fn get(&self, storage_type: StorageType, tray: &str) -> Option<SharedStorage> {
		self
			.contexts
			.lock()
			.unwrap()
			.get(&(storage_type, tray.to_owned()))
			.map(Arc::clone)
	}

	pub fn len(&self) -> usize {
		self.contexts.lock().unwrap().len()
	}

	pub fn is_empty(&self) -> bool {
		self.contexts.lock().unwrap().is_empty()
	}
}
