// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Curve25519 key material in the encoding `wg(8)` uses: standard, padded
//! base64 of exactly 32 bytes (44 characters).

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use burrow_common_secret::{Secret, REDACTED};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

pub const KEY_LEN: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
	#[error("invalid key length: expected 32 bytes, got {0}")]
	InvalidLength(usize),

	#[error("invalid base64 encoding: {0}")]
	InvalidBase64(#[from] base64::DecodeError),
}

pub type Result<T> = std::result::Result<T, KeyError>;

fn decode_key(s: &str) -> Result<[u8; KEY_LEN]> {
	let mut bytes = BASE64_STANDARD.decode(s.trim())?;
	if bytes.len() != KEY_LEN {
		let len = bytes.len();
		bytes.zeroize();
		return Err(KeyError::InvalidLength(len));
	}
	let mut arr = [0u8; KEY_LEN];
	arr.copy_from_slice(&bytes);
	bytes.zeroize();
	Ok(arr)
}

/// A device's private scalar. Stays on the device that generated it.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct WgPrivateKey {
	bytes: [u8; KEY_LEN],
}

impl WgPrivateKey {
	pub fn generate() -> Self {
		let secret = StaticSecret::random_from_rng(OsRng);
		Self {
			bytes: secret.to_bytes(),
		}
	}

	pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
		Self { bytes }
	}

	pub fn from_base64(s: &str) -> Result<Self> {
		decode_key(s).map(Self::from_bytes)
	}

	pub fn to_base64(&self) -> Secret<String> {
		Secret::new(BASE64_STANDARD.encode(self.bytes))
	}

	pub fn public_key(&self) -> WgPublicKey {
		let secret = StaticSecret::from(self.bytes);
		WgPublicKey {
			bytes: *PublicKey::from(&secret).as_bytes(),
		}
	}
}

impl fmt::Debug for WgPrivateKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WgPrivateKey")
			.field("bytes", &REDACTED)
			.finish()
	}
}

impl fmt::Display for WgPrivateKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl Serialize for WgPrivateKey {
	fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(REDACTED)
	}
}

/// A peer's identity on the overlay. Safe to log and transmit.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WgPublicKey {
	bytes: [u8; KEY_LEN],
}

impl WgPublicKey {
	pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
		Self { bytes }
	}

	pub fn from_base64(s: &str) -> Result<Self> {
		decode_key(s).map(Self::from_bytes)
	}

	pub fn to_base64(&self) -> String {
		BASE64_STANDARD.encode(self.bytes)
	}

	pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
		&self.bytes
	}
}

impl fmt::Debug for WgPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let b64 = self.to_base64();
		f.debug_struct("WgPublicKey")
			.field("prefix", &format!("{}...", &b64[..8]))
			.finish()
	}
}

impl fmt::Display for WgPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_base64())
	}
}

impl std::str::FromStr for WgPublicKey {
	type Err = KeyError;

	fn from_str(s: &str) -> Result<Self> {
		Self::from_base64(s)
	}
}

impl Serialize for WgPublicKey {
	fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.to_base64())
	}
}

impl<'de> Deserialize<'de> for WgPublicKey {
	fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Self::from_base64(&s).map_err(serde::de::Error::custom)
	}
}

#[derive(Clone)]
pub struct WgKeyPair {
	private: WgPrivateKey,
	public: WgPublicKey,
}

impl WgKeyPair {
	pub fn generate() -> Self {
		Self::from_private_key(WgPrivateKey::generate())
	}

	pub fn from_private_key(private: WgPrivateKey) -> Self {
		let public = private.public_key();
		Self { private, public }
	}

	pub fn private_key(&self) -> &WgPrivateKey {
		&self.private
	}

	pub fn public_key(&self) -> &WgPublicKey {
		&self.public
	}
}

impl fmt::Debug for WgKeyPair {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WgKeyPair")
			.field("private", &self.private)
			.field("public", &self.public)
			.finish()
	}
}

/// Symmetric key layered on top of the Noise handshake, one per peer.
#[derive(Clone, PartialEq, Eq, Zeroize)]
#[zeroize(drop)]
pub struct PresharedKey {
	bytes: [u8; KEY_LEN],
}

impl PresharedKey {
	pub fn generate() -> Self {
		let mut bytes = [0u8; KEY_LEN];
		OsRng.fill_bytes(&mut bytes);
		Self { bytes }
	}

	pub fn from_base64(s: &str) -> Result<Self> {
		decode_key(s).map(|bytes| Self { bytes })
	}

	pub fn to_base64(&self) -> Secret<String> {
		Secret::new(BASE64_STANDARD.encode(self.bytes))
	}
}

impl fmt::Debug for PresharedKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PresharedKey")
			.field("bytes", &REDACTED)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	const ZERO_KEY_B64: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

	#[test]
	fn zero_key_is_44_padded_chars() {
		let key = WgPublicKey::from_bytes([0u8; 32]);
		assert_eq!(key.to_base64(), ZERO_KEY_B64);
		assert_eq!(key.to_base64().len(), 44);
	}

	#[test]
	fn rejects_wrong_length() {
		let short = BASE64_STANDARD.encode([1u8; 16]);
		assert_eq!(
			WgPublicKey::from_base64(&short),
			Err(KeyError::InvalidLength(16))
		);
		let long = BASE64_STANDARD.encode([1u8; 33]);
		assert_eq!(
			WgPublicKey::from_base64(&long),
			Err(KeyError::InvalidLength(33))
		);
	}

	#[test]
	fn rejects_garbage() {
		assert!(matches!(
			WgPublicKey::from_base64("not base64!"),
			Err(KeyError::InvalidBase64(_))
		));
	}

	#[test]
	fn keypair_public_matches_private() {
		let keypair = WgKeyPair::generate();
		let restored =
			WgPrivateKey::from_base64(keypair.private_key().to_base64().expose()).unwrap();
		assert_eq!(&restored.public_key(), keypair.public_key());
	}

	#[test]
	fn private_key_formats_are_redacted() {
		let private = WgPrivateKey::generate();
		let b64 = private.to_base64().expose().clone();
		assert_eq!(private.to_string(), REDACTED);
		assert!(!format!("{:?}", private).contains(&b64));
		assert_eq!(serde_json::to_string(&private).unwrap(), "\"[REDACTED]\"");
	}

	#[test]
	fn preshared_keys_are_fresh() {
		let a = PresharedKey::generate();
		let b = PresharedKey::generate();
		assert_ne!(a, b);
		assert_eq!(a.to_base64().expose().len(), 44);
		assert!(!format!("{a:?}").contains(a.to_base64().expose()));
	}

	#[test]
	fn public_key_debug_shows_prefix_only() {
		let key = WgPublicKey::from_bytes([7u8; 32]);
		let debug = format!("{key:?}");
		assert!(debug.contains("..."));
		assert!(!debug.contains(&key.to_base64()));
	}

	proptest! {
		#[test]
		fn public_key_base64_roundtrip(bytes in prop::array::uniform32(any::<u8>())) {
			let encoded = WgPublicKey::from_bytes(bytes).to_base64();
			prop_assert_eq!(encoded.len(), 44);
			let decoded = WgPublicKey::from_base64(&encoded).unwrap();
			prop_assert_eq!(decoded.to_base64(), encoded);
		}

		#[test]
		fn private_key_display_never_leaks(bytes in prop::array::uniform32(any::<u8>())) {
			let private = WgPrivateKey::from_bytes(bytes);
			let b64 = BASE64_STANDARD.encode(bytes);
			let displayed = format!("{private}");
			let debugged = format!("{private:?}");
			prop_assert!(!displayed.contains(&b64));
			prop_assert!(!debugged.contains(&b64));
		}
	}
}
