// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Encrypted-at-rest key/value scope for device identity and issued config.
//!
//! [`FileStore`] keeps one AES-256-GCM sealed JSON map next to a 0600 master
//! key file. Values leave the store wrapped in [`Secret`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use aes_gcm::{
	aead::{Aead, KeyInit},
	Aes256Gcm, Key, Nonce,
};
use async_trait::async_trait;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use burrow_common_secret::{Secret, SecretString, REDACTED};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument, warn};
use zeroize::Zeroizing;

pub const MASTER_KEY_FILENAME: &str = "store.key";
pub const STORE_FILENAME: &str = "store.enc";

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const ENVELOPE_VERSION: u8 = 1;

/// Names of the values kept in the device scope.
pub mod slot {
	pub const PRIVATE_KEY: &str = "wg_private_key";
	pub const PUBLIC_KEY: &str = "wg_public_key";
	pub const PRESHARED_KEY: &str = "wg_preshared_key";
	pub const ASSIGNED_IP: &str = "wg_assigned_ip";
	pub const SERVER_PUBLIC_KEY: &str = "wg_server_public_key";
	pub const SERVER_ENDPOINT: &str = "wg_server_endpoint";
	pub const DNS: &str = "wg_dns";
	pub const ALLOWED_IPS: &str = "wg_allowed_ips";
	pub const KEEPALIVE: &str = "wg_keepalive";
}

#[derive(Error, Debug)]
pub enum StoreError {
	#[error("store IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("store format error: {0}")]
	Format(#[from] serde_json::Error),

	#[error("encryption failed: {0}")]
	Encryption(String),

	#[error("decryption failed: {0}")]
	Decryption(String),

	#[error("master key file is corrupt")]
	InvalidMasterKey,
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait SecureStore: Send + Sync + fmt::Debug {
	async fn get(&self, key: &str) -> Result<Option<SecretString>>;

	async fn put(&self, key: &str, value: &str) -> Result<()>;

	/// Write several values as one update.
	async fn put_all(&self, entries: &[(&str, &str)]) -> Result<()> {
		for (key, value) in entries {
			self.put(key, value).await?;
		}
		Ok(())
	}

	async fn remove(&self, key: &str) -> Result<()>;

	/// Wipe the whole scope.
	async fn clear(&self) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
	version: u8,
	nonce: String,
	ciphertext: String,
}

type Entries = BTreeMap<String, String>;

/// File-backed [`SecureStore`].
pub struct FileStore {
	dir: PathBuf,
	master_key: Zeroizing<[u8; KEY_SIZE]>,
	write_lock: Mutex<()>,
}

impl fmt::Debug for FileStore {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FileStore")
			.field("dir", &self.dir)
			.field("master_key", &REDACTED)
			.finish()
	}
}

impl FileStore {
	/// Open the store in `dir`, creating the directory and master key on
	/// first use.
	#[instrument(skip_all, fields(dir = %dir.as_ref().display()))]
	pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
		let dir = dir.as_ref().to_path_buf();
		fs::create_dir_all(&dir).await?;
		let master_key = load_or_create_master_key(&dir.join(MASTER_KEY_FILENAME)).await?;
		Ok(Self {
			dir,
			master_key,
			write_lock: Mutex::new(()),
		})
	}

	pub fn path(&self) -> PathBuf {
		self.dir.join(STORE_FILENAME)
	}

	async fn read_entries(&self) -> Result<Entries> {
		let path = self.path();
		if !path.exists() {
			return Ok(Entries::new());
		}
		let contents = fs::read_to_string(&path).await?;
		let envelope: Envelope = serde_json::from_str(&contents)?;
		let plaintext = open_envelope(&self.master_key, &envelope)?;
		Ok(serde_json::from_slice(&plaintext)?)
	}

	async fn write_entries(&self, entries: &Entries) -> Result<()> {
		let plaintext = Zeroizing::new(serde_json::to_vec(entries)?);
		let envelope = seal(&self.master_key, &plaintext)?;
		let contents = serde_json::to_string_pretty(&envelope)?;
		write_private_file(&self.path(), contents.as_bytes()).await?;
		debug!(path = ?self.path(), entries = entries.len(), "secure store written");
		Ok(())
	}

	async fn update(&self, apply: impl FnOnce(&mut Entries)) -> Result<()> {
		let _guard = self.write_lock.lock().await;
		let mut entries = self.read_entries().await?;
		apply(&mut entries);
		self.write_entries(&entries).await
	}
}

#[async_trait]
impl SecureStore for FileStore {
	async fn get(&self, key: &str) -> Result<Option<SecretString>> {
		let mut entries = self.read_entries().await?;
		Ok(entries.remove(key).map(Secret::new))
	}

	async fn put(&self, key: &str, value: &str) -> Result<()> {
		self.update(|entries| {
			entries.insert(key.to_string(), value.to_string());
		})
		.await
	}

	async fn put_all(&self, values: &[(&str, &str)]) -> Result<()> {
		self.update(|entries| {
			for (key, value) in values {
				entries.insert((*key).to_string(), (*value).to_string());
			}
		})
		.await
	}

	async fn remove(&self, key: &str) -> Result<()> {
		self.update(|entries| {
			entries.remove(key);
		})
		.await
	}

	async fn clear(&self) -> Result<()> {
		let _guard = self.write_lock.lock().await;
		match fs::remove_file(self.path()).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}
}

/// In-memory [`SecureStore`] for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
	entries: RwLock<HashMap<String, SecretString>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl SecureStore for MemoryStore {
	async fn get(&self, key: &str) -> Result<Option<SecretString>> {
		Ok(self.entries.read().await.get(key).cloned())
	}

	async fn put(&self, key: &str, value: &str) -> Result<()> {
		self.entries
			.write()
			.await
			.insert(key.to_string(), Secret::new(value.to_string()));
		Ok(())
	}

	async fn remove(&self, key: &str) -> Result<()> {
		self.entries.write().await.remove(key);
		Ok(())
	}

	async fn clear(&self) -> Result<()> {
		self.entries.write().await.clear();
		Ok(())
	}
}

async fn load_or_create_master_key(path: &Path) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
	if path.exists() {
		let encoded = Zeroizing::new(fs::read_to_string(path).await?);
		let decoded = Zeroizing::new(
			BASE64_STANDARD
				.decode(encoded.trim())
				.map_err(|_| StoreError::InvalidMasterKey)?,
		);
		if decoded.len() != KEY_SIZE {
			return Err(StoreError::InvalidMasterKey);
		}
		let mut key = Zeroizing::new([0u8; KEY_SIZE]);
		key.copy_from_slice(&decoded);
		return Ok(key);
	}

	let mut key = Zeroizing::new([0u8; KEY_SIZE]);
	OsRng.fill_bytes(&mut key[..]);
	let encoded = Zeroizing::new(format!("{}\n", BASE64_STANDARD.encode(key.as_slice())));
	write_private_file(path, encoded.as_bytes()).await?;
	debug!(path = %path.display(), "created secure store master key");
	Ok(key)
}

fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<Envelope> {
	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
	let mut nonce = [0u8; NONCE_SIZE];
	OsRng.fill_bytes(&mut nonce);
	let ciphertext = cipher
		.encrypt(Nonce::from_slice(&nonce), plaintext)
		.map_err(|e| StoreError::Encryption(e.to_string()))?;
	Ok(Envelope {
		version: ENVELOPE_VERSION,
		nonce: BASE64_STANDARD.encode(nonce),
		ciphertext: BASE64_STANDARD.encode(ciphertext),
	})
}

fn open_envelope(key: &[u8; KEY_SIZE], envelope: &Envelope) -> Result<Zeroizing<Vec<u8>>> {
	if envelope.version != ENVELOPE_VERSION {
		return Err(StoreError::Decryption(format!(
			"unsupported envelope version {}",
			envelope.version
		)));
	}
	let nonce = BASE64_STANDARD
		.decode(&envelope.nonce)
		.map_err(|e| StoreError::Decryption(e.to_string()))?;
	if nonce.len() != NONCE_SIZE {
		return Err(StoreError::Decryption("bad nonce length".to_string()));
	}
	let ciphertext = BASE64_STANDARD
		.decode(&envelope.ciphertext)
		.map_err(|e| StoreError::Decryption(e.to_string()))?;

	let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
	let plaintext = cipher
		.decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
		.map_err(|e| StoreError::Decryption(e.to_string()))?;
	Ok(Zeroizing::new(plaintext))
}

/// Write `contents` via a temp file and rename, readable by the owner only.
async fn write_private_file(path: &Path, contents: &[u8]) -> Result<()> {
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).await?;
	}

	let temp_path = path.with_extension("tmp");
	let mut file = fs::File::create(&temp_path).await?;
	file.write_all(contents).await?;
	file.sync_all().await?;
	drop(file);

	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;
		let perms = std::fs::Permissions::from_mode(0o600);
		if let Err(e) = std::fs::set_permissions(&temp_path, perms) {
			warn!(path = ?temp_path, error = %e, "failed to set file permissions to 0600");
		}
	}

	fs::rename(&temp_path, path).await?;
	Ok(())
}
