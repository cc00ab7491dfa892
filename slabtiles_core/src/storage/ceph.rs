//! This module provides the [`CephStorage`] context: slab objects in a Ceph
//! pool, accessed through librados.
//!
//! Only built with the `ceph` cargo feature, since it links against the
//! native librados.

use super::write_buffer::WriteBuffers;
use super::{Storage, StorageError, StorageType};
use crate::Blob;
use ceph::ceph::{Rados, connect_to_ceph};
use log::{debug, warn};
use std::env;
use std::sync::Mutex;
use std::time::Duration;

const FLUSH_ATTEMPTS: u32 = 10;

/// Connection parameters of a Ceph pool.
#[derive(Clone, Debug)]
pub struct CephConfig {
	pub cluster: String,
	pub user: String,
	pub conf_file: String,
	pub pool: String,
	pub read_attempts: u32,
	/// Mount, monitor and OSD operation timeouts, in seconds.
	pub mount_timeout: u32,
	pub mon_op_timeout: u32,
	pub osd_op_timeout: u32,
}

impl CephConfig {
	/// Builds a config for `pool` from the `ROK4_CEPH_*` environment.
	pub fn from_env(pool: &str) -> CephConfig {
		CephConfig {
			cluster: env::var("ROK4_CEPH_CLUSTERNAME").unwrap_or_else(|_| "ceph".to_owned()),
			user: env::var("ROK4_CEPH_USERNAME").unwrap_or_else(|_| "client.admin".to_owned()),
			conf_file: env::var("ROK4_CEPH_CONFFILE").unwrap_or_else(|_| "/etc/ceph/ceph.conf".to_owned()),
			pool: pool.to_owned(),
			read_attempts: 3,
			mount_timeout: 60,
			mon_op_timeout: 60,
			osd_op_timeout: 60,
		}
	}
}

/// Storage context over a Ceph pool.
pub struct CephStorage {
	config: CephConfig,
	cluster: Mutex<Option<Rados>>,
	write_buffers: WriteBuffers,
}

impl std::fmt::Debug for CephStorage {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CephStorage").field("config", &self.config).finish()
	}
}

impl CephStorage {
	pub fn new(config: CephConfig) -> CephStorage {
		CephStorage {
			config,
			cluster: Mutex::new(None),
			write_buffers: WriteBuffers::new(),
		}
	}

	fn backend_error(&self, name: &str, message: String) -> StorageError {
		StorageError::Backend {
			name: name.to_owned(),
			message,
		}
	}

	fn with_cluster<T>(
		&self,
		name: &str,
		operation: impl FnOnce(&Rados) -> Result<T, StorageError>,
	) -> Result<T, StorageError> {
		let mut guard = self.cluster.lock().unwrap();
		if guard.is_none() {
			let rados = connect_to_ceph(&self.config.user, &self.config.conf_file)
				.map_err(|e| self.backend_error(name, format!("cannot connect to Ceph cluster: {e}")))?;
			for (key, value) in [
				("client_mount_timeout", self.config.mount_timeout),
				("rados_mon_op_timeout", self.config.mon_op_timeout),
				("rados_osd_op_timeout", self.config.osd_op_timeout),
			] {
				rados
					.conf_set(key, &value.to_string())
					.map_err(|e| self.backend_error(name, format!("cannot set {key}: {e}")))?;
			}
			*guard = Some(rados);
		}
		operation(guard.as_ref().expect("cluster connected above"))
	}

	fn put_object(&self, name: &str, data: &[u8]) -> Result<(), StorageError> {
		self.with_cluster(name, |rados| {
			let ioctx = rados
				.get_rados_ioctx(&self.config.pool)
				.map_err(|e| self.backend_error(name, format!("cannot open pool: {e}")))?;
			ioctx
				.rados_object_write_full(name, data)
				.map_err(|e| self.backend_error(name, format!("cannot write object: {e}")))
		})
	}
}

impl Storage for CephStorage {
	fn storage_type(&self) -> StorageType {
		StorageType::Ceph
	}

	fn tray(&self) -> &str {
		&self.config.pool
	}

	fn connect(&self) -> Result<(), StorageError> {
		self.with_cluster(&self.config.pool.clone(), |_| Ok(()))
	}

	fn read(&self, offset: u64, size: u64, name: &str) -> Result<Blob, StorageError> {
		debug!("Ceph read: {size} bytes at offset {offset} in object {name}");

		self.with_cluster(name, |rados| {
			let ioctx = rados
				.get_rados_ioctx(&self.config.pool)
				.map_err(|e| self.backend_error(name, format!("cannot open pool: {e}")))?;

			let mut buffer = Vec::with_capacity(size as usize);
			match ioctx.rados_object_read(name, &mut buffer, offset) {
				Ok(_) => Ok(Blob::from(buffer)),
				Err(e) => {
					let message = e.to_string();
					if message.contains("No such file") || message.contains("ENOENT") {
						Err(StorageError::NotFound(name.to_owned()))
					} else if message.contains("ETIMEDOUT") || message.contains("timed out") {
						Err(StorageError::Transient {
							name: name.to_owned(),
							message,
						})
					} else {
						Err(self.backend_error(name, message))
					}
				}
			}
		})
	}

	fn exists(&self, name: &str) -> bool {
		self
			.with_cluster(name, |rados| {
				let ioctx = rados
					.get_rados_ioctx(&self.config.pool)
					.map_err(|e| self.backend_error(name, format!("cannot open pool: {e}")))?;
				Ok(ioctx.rados_object_stat(name).is_ok())
			})
			.unwrap_or(false)
	}

	fn read_attempts(&self) -> u32 {
		self.config.read_attempts
	}

	fn open_to_write(&self, name: &str) -> Result<(), StorageError> {
		self.write_buffers.open(name);
		Ok(())
	}

	fn write(&self, data: &[u8], offset: u64, name: &str) -> Result<(), StorageError> {
		self.write_buffers.write(data, offset, name)
	}

	fn write_full(&self, data: &[u8], name: &str) -> Result<(), StorageError> {
		self.write_buffers.write_full(data, name)
	}

	fn close_to_write(&self, name: &str) -> Result<(), StorageError> {
		let data = self.write_buffers.take(name)?;
		let mut last_error = None;
		for attempt in 1..=FLUSH_ATTEMPTS {
			match self.put_object(name, &data) {
				Ok(()) => return Ok(()),
				Err(e) => {
					warn!("flush of object '{name}' failed (attempt {attempt}/{FLUSH_ATTEMPTS}): {e}");
					last_error = Some(e);
					std::thread::sleep(Duration::from_millis(100 * u64::from(attempt)));
				}
			}
		}
		Err(last_error.expect("at least one attempt was made"))
	}
}
