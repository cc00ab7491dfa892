//! This module provides the [`SwiftStorage`] context: slab objects in an
//! OpenStack Swift container.
//!
//! Two authentication modes exist: the legacy TempAuth handshake
//! (`X-Storage-User` / `X-Storage-Pass`, which also yields the storage URL)
//! and a Keystone v3 password grant against a publicly configured endpoint.

use super::write_buffer::WriteBuffers;
use super::{Storage, StorageError, StorageType};
use crate::Blob;
use log::{debug, warn};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::json;
use std::env;
use std::sync::Mutex;
use std::time::Duration;

const FLUSH_ATTEMPTS: u32 = 10;

/// Connection parameters of a Swift container.
#[derive(Clone, Debug)]
pub struct SwiftConfig {
	pub auth_url: String,
	pub account: String,
	pub user: String,
	pub password: String,
	pub container: String,
	/// Use a Keystone v3 password grant instead of the legacy handshake.
	pub keystone: bool,
	pub domain_id: String,
	pub project_id: String,
	/// Storage endpoint used with Keystone (the token is valid against it).
	pub public_url: String,
	pub read_attempts: u32,
	pub ssl_no_verify: bool,
}

impl SwiftConfig {
	/// Builds a config for `container` from the `ROK4_SWIFT_*` /
	/// `ROK4_KEYSTONE_*` environment.
	pub fn from_env(container: &str, keystone: bool) -> SwiftConfig {
		SwiftConfig {
			auth_url: env::var("ROK4_SWIFT_AUTHURL").unwrap_or_else(|_| "http://localhost:8080/auth/v1.0".to_owned()),
			account: env::var("ROK4_SWIFT_ACCOUNT").unwrap_or_default(),
			user: env::var("ROK4_SWIFT_USER").unwrap_or_else(|_| "tester".to_owned()),
			password: env::var("ROK4_SWIFT_PASSWD").unwrap_or_else(|_| "password".to_owned()),
			container: container.to_owned(),
			keystone,
			domain_id: env::var("ROK4_KEYSTONE_DOMAINID").unwrap_or_default(),
			project_id: env::var("ROK4_KEYSTONE_PROJECTID").unwrap_or_default(),
			public_url: env::var("ROK4_SWIFT_PUBLICURL").unwrap_or_default(),
			read_attempts: 3,
			ssl_no_verify: env::var("ROK4_SSL_NO_VERIFY").is_ok(),
		}
	}
}

/// Token and endpoint obtained from authentication.
#[derive(Clone, Debug)]
struct SwiftSession {
	token: String,
	storage_url: String,
}

/// Storage context over a Swift container.
#[derive(Debug)]
pub struct SwiftStorage {
	config: SwiftConfig,
	client: Client,
	session: Mutex<Option<SwiftSession>>,
	write_buffers: WriteBuffers,
}

impl SwiftStorage {
	pub fn new(config: SwiftConfig) -> Result<SwiftStorage, StorageError> {
		let client = Client::builder()
			.tcp_keepalive(Duration::from_secs(600))
			.danger_accept_invalid_certs(config.ssl_no_verify)
			.build()
			.map_err(|e| StorageError::Backend {
				name: config.container.clone(),
				message: e.to_string(),
			})?;
		Ok(SwiftStorage {
			config,
			client,
			session: Mutex::new(None),
			write_buffers: WriteBuffers::new(),
		})
	}

	fn backend_error(&self, message: String) -> StorageError {
		StorageError::Backend {
			name: self.config.container.clone(),
			message,
		}
	}

	fn authenticate_keystone(&self) -> Result<SwiftSession, StorageError> {
		debug!("Keystone authentication against {}", self.config.auth_url);

		for (field, variable) in [
			(&self.config.domain_id, "ROK4_KEYSTONE_DOMAINID"),
			(&self.config.project_id, "ROK4_KEYSTONE_PROJECTID"),
			(&self.config.public_url, "ROK4_SWIFT_PUBLICURL"),
		] {
			if field.is_empty() {
				return Err(self.backend_error(format!("Keystone authentication needs {variable}")));
			}
		}

		let body = json!({
			"auth": {
				"scope": { "project": { "id": self.config.project_id } },
				"identity": {
					"methods": ["password"],
					"password": {
						"user": {
							"domain": { "id": self.config.domain_id },
							"name": self.config.user,
							"password": self.config.password,
						}
					}
				}
			}
		});

		let response = self
			.client
			.post(&self.config.auth_url)
			.header("Content-Type", "application/json")
			.body(body.to_string())
			.send()
			.map_err(|e| self.backend_error(format!("cannot authenticate to Keystone: {e}")))?;

		if !response.status().is_success() {
			return Err(self.backend_error(format!("Keystone authentication failed with {}", response.status())));
		}

		let token = response
			.headers()
			.get("X-Subject-Token")
			.and_then(|v| v.to_str().ok())
			.ok_or_else(|| self.backend_error("Keystone response carries no X-Subject-Token".to_owned()))?
			.to_owned();

		Ok(SwiftSession {
			token,
			storage_url: self.config.public_url.clone(),
		})
	}

	fn authenticate_legacy(&self) -> Result<SwiftSession, StorageError> {
		debug!("Swift authentication against {}", self.config.auth_url);

		if self.config.account.is_empty() {
			return Err(self.backend_error("Swift authentication needs ROK4_SWIFT_ACCOUNT".to_owned()));
		}

		let storage_user = format!("{}:{}", self.config.account, self.config.user);
		let response = self
			.client
			.get(&self.config.auth_url)
			.header("X-Storage-User", &storage_user)
			.header("X-Storage-Pass", &self.config.password)
			.header("X-Auth-User", &storage_user)
			.header("X-Auth-Key", &self.config.password)
			.send()
			.map_err(|e| self.backend_error(format!("cannot authenticate to Swift: {e}")))?;

		if !response.status().is_success() {
			return Err(self.backend_error(format!("Swift authentication failed with {}", response.status())));
		}

		let header = |key: &str| {
			response
				.headers()
				.get(key)
				.and_then(|v| v.to_str().ok())
				.map(str::to_owned)
		};

		let token = header("X-Auth-Token")
			.ok_or_else(|| self.backend_error("Swift response carries no X-Auth-Token".to_owned()))?;
		let storage_url = header("X-Storage-Url")
			.ok_or_else(|| self.backend_error("Swift response carries no X-Storage-Url".to_owned()))?;

		Ok(SwiftSession { token, storage_url })
	}

	fn session(&self) -> Result<SwiftSession, StorageError> {
		let mut guard = self.session.lock().unwrap();
		if let Some(session) = guard.as_ref() {
			return Ok(session.clone());
		}
		let session = if self.config.keystone {
			self.authenticate_keystone()?
		} else {
			self.authenticate_legacy()?
		};
		*guard = Some(session.clone());
		Ok(session)
	}

	fn object_url(&self, session: &SwiftSession, name: &str) -> String {
		format!("{}/{}/{}", session.storage_url, self.config.container, name)
	}

	fn classify(name: &str, error: &reqwest::Error) -> StorageError {
		if error.is_timeout() || error.is_connect() {
			StorageError::Transient {
				name: name.to_owned(),
				message: error.to_string(),
			}
		} else {
			StorageError::Backend {
				name: name.to_owned(),
				message: error.to_string(),
			}
		}
	}

	fn classify_status(name: &str, status: StatusCode) -> StorageError {
		if status == StatusCode::NOT_FOUND {
			StorageError::NotFound(name.to_owned())
		} else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
			StorageError::Transient {
				name: name.to_owned(),
				message: format!("HTTP status {status}"),
			}
		} else {
			StorageError::Backend {
				name: name.to_owned(),
				message: format!("HTTP status {status}"),
			}
		}
	}

	fn put_object(&self, name: &str, data: &[u8]) -> Result<(), StorageError> {
		let session = self.session()?;
		let response = self
			.client
			.put(self.object_url(&session, name))
			.header("X-Auth-Token", &session.token)
			.body(data.to_vec())
			.send()
			.map_err(|e| Self::classify(name, &e))?;

		if !response.status().is_success() {
			return Err(Self::classify_status(name, response.status()));
		}
		Ok(())
	}
}

impl Storage for SwiftStorage {
	fn storage_type(&self) -> StorageType {
		StorageType::Swift
	}

	fn tray(&self) -> &str {
		&self.config.container
	}

	fn connect(&self) -> Result<(), StorageError> {
		self.session().map(|_| ())
	}

	fn read(&self, offset: u64, size: u64, name: &str) -> Result<Blob, StorageError> {
		debug!("Swift read: {size} bytes at offset {offset} in object {name}");

		let session = self.session()?;
		let response = self
			.client
			.get(self.object_url(&session, name))
			.header("X-Auth-Token", &session.token)
			.header("Range", format!("bytes={}-{}", offset, offset + size - 1))
			.send()
			.map_err(|e| Self::classify(name, &e))?;

		let status = response.status();
		if status == StatusCode::RANGE_NOT_SATISFIABLE {
			return Ok(Blob::new_empty());
		}
		if !status.is_success() {
			return Err(Self::classify_status(name, status));
		}

		let bytes = response.bytes().map_err(|e| Self::classify(name, &e))?;
		if status == StatusCode::OK {
			let start = (offset as usize).min(bytes.len());
			let end = (start + size as usize).min(bytes.len());
			return Ok(Blob::from(&bytes[start..end]));
		}
		Ok(Blob::from(&*bytes))
	}

	fn exists(&self, name: &str) -> bool {
		let Ok(session) = self.session() else {
			return false;
		};
		self
			.client
			.head(self.object_url(&session, name))
			.header("X-Auth-Token", &session.token)
			.send()
			.map(|r| r.status().is_success())
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

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn keystone_requires_scope_parameters() {
		let storage = SwiftStorage::new(SwiftConfig {
			auth_url: "http://localhost:5000/v3/auth/tokens".to_owned(),
			account: String::new(),
			user: "tester".to_owned(),
			password: "password".to_owned(),
			container: "tiles".to_owned(),
			keystone: true,
			domain_id: String::new(),
			project_id: String::new(),
			public_url: String::new(),
			read_attempts: 3,
			ssl_no_verify: false,
		})
		.unwrap();

		let err = storage.connect().unwrap_err();
		assert!(err.to_string().contains("ROK4_KEYSTONE_DOMAINID"));
	}

	#[test]
	fn legacy_requires_account() {
		let storage = SwiftStorage::new(SwiftConfig {
			auth_url: "http://localhost:8080/auth/v1.0".to_owned(),
			account: String::new(),
			user: "tester".to_owned(),
			password: "password".to_owned(),
			container: "tiles".to_owned(),
			keystone: false,
			domain_id: String::new(),
			project_id: String::new(),
			public_url: String::new(),
			read_attempts: 3,
			ssl_no_verify: false,
		})
		.unwrap();

		let err = storage.connect().unwrap_err();
		assert!(err.to_string().contains("ROK4_SWIFT_ACCOUNT"));
	}
}
