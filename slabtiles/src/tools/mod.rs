//! The writer utilities behind the CLI subcommands.

pub mod cache2work;
pub mod pbf2cache;
pub mod work2cache;

use anyhow::{Context, Result, bail};
use clap::Args;
use slabtiles_core::storage::{FileStorage, S3Config, S3Storage, SharedStorage, Storage, SwiftConfig, SwiftStorage};
use std::sync::Arc;

/// Storage backend selection shared by the utilities; at most one of the
/// options may be given, the default is the local filesystem.
#[derive(Args, Debug, Default)]
pub struct BackendArgs {
	/// Read/write slabs in this Ceph pool
	#[arg(long, value_name = "POOL")]
	pub pool: Option<String>,

	/// Read/write slabs in this S3 bucket
	#[arg(long, value_name = "BUCKET")]
	pub bucket: Option<String>,

	/// Read/write slabs in this Swift container
	#[arg(long, value_name = "CONTAINER")]
	pub container: Option<String>,
}

impl BackendArgs {
	/// Builds and connects the storage context; credentials come from the
	/// `ROK4_*` environment.
	pub fn storage(&self) -> Result<SharedStorage> {
		let selected = [&self.pool, &self.bucket, &self.container]
			.iter()
			.filter(|option| option.is_some())
			.count();
		if selected > 1 {
			bail!("at most one of --pool, --bucket and --container may be given");
		}

		let storage: SharedStorage = if let Some(pool) = &self.pool {
			#[cfg(feature = "ceph")]
			{
				use slabtiles_core::storage::{CephConfig, CephStorage};
				Arc::new(CephStorage::new(CephConfig::from_env(pool)))
			}
			#[cfg(not(feature = "ceph"))]
			{
				bail!("pool '{pool}' is unreachable: built without the 'ceph' feature");
			}
		} else if let Some(bucket) = &self.bucket {
			Arc::new(S3Storage::new(S3Config::from_env(bucket))?)
		} else if let Some(container) = &self.container {
			// Keystone when a scope is configured, the legacy handshake otherwise
			let keystone = std::env::var("ROK4_KEYSTONE_DOMAINID").is_ok();
			Arc::new(SwiftStorage::new(SwiftConfig::from_env(container, keystone))?)
		} else {
			Arc::new(FileStorage::new(""))
		};

		storage.connect().context("cannot connect to the storage backend")?;
		Ok(storage)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use slabtiles_core::storage::StorageType;

	#[test]
	fn default_backend_is_the_filesystem() {
		let storage = BackendArgs::default().storage().unwrap();
		assert_eq!(storage.storage_type(), StorageType::File);
	}

	#[test]
	fn conflicting_backends_are_rejected() {
		let args = BackendArgs {
			pool: None,
			bucket: Some("b".to_owned()),
			container: Some("c".to_owned()),
		};
		assert!(args.storage().is_err());
	}
}
