//! Client secret sealing with AES-256-GCM.
//!
//! Sealed format: base64(nonce_12bytes || ciphertext || tag_16bytes).
//! The secret exists in plaintext only in memory, for the duration of an
//! authentication call.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;

use crate::AuthError;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Symmetric key used to seal the platform client secret.
#[derive(Clone)]
pub struct SecretCipher {
	key: [u8; KEY_LEN],
}

impl SecretCipher {
	/// Builds a cipher from a base64-encoded 32-byte key.
	pub fn from_base64(encoded: &str) -> Result<Self, AuthError> {
		let bytes = base64::engine::general_purpose::STANDARD
			.decode(encoded.trim())
			.map_err(|e| AuthError::Cipher(format!("invalid key encoding: {}", e)))?;
		if bytes.len() != KEY_LEN {
			return Err(AuthError::Cipher(format!(
				"key must be {} bytes, got {}",
				KEY_LEN,
				bytes.len()
			)));
		}
		let mut key = [0u8; KEY_LEN];
		key.copy_from_slice(&bytes);
		Ok(Self { key })
	}

	pub fn from_key(key: [u8; KEY_LEN]) -> Self {
		Self { key }
	}

	/// Encrypts plaintext into base64(nonce || ciphertext || tag).
	pub fn seal(&self, plaintext: &str) -> Result<String, AuthError> {
		let cipher = Aes256Gcm::new_from_slice(&self.key)
			.map_err(|_| AuthError::Cipher("invalid key".to_string()))?;

		let mut nonce_bytes = [0u8; NONCE_LEN];
		rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut nonce_bytes);
		let nonce = Nonce::from_slice(&nonce_bytes);

		let ciphertext = cipher
			.encrypt(nonce, plaintext.as_bytes())
			.map_err(|_| AuthError::Cipher("encryption failed".to_string()))?;

		let mut envelope = Vec::with_capacity(NONCE_LEN + ciphertext.len());
		envelope.extend_from_slice(&nonce_bytes);
		envelope.extend_from_slice(&ciphertext);
		Ok(base64::engine::general_purpose::STANDARD.encode(envelope))
	}

	/// Decrypts a sealed secret produced by [`SecretCipher::seal`].
	pub fn open(&self, sealed: &str) -> Result<String, AuthError> {
		let envelope = base64::engine::general_purpose::STANDARD
			.decode(sealed.trim())
			.map_err(|e| AuthError::Cipher(format!("invalid envelope encoding: {}", e)))?;
		if envelope.len() <= NONCE_LEN {
			return Err(AuthError::Cipher("envelope too short".to_string()));
		}

		let cipher = Aes256Gcm::new_from_slice(&self.key)
			.map_err(|_| AuthError::Cipher("invalid key".to_string()))?;
		let nonce = Nonce::from_slice(&envelope[..NONCE_LEN]);

		let plaintext = cipher
			.decrypt(nonce, &envelope[NONCE_LEN..])
			.map_err(|_| AuthError::Cipher("decryption failed".to_string()))?;

		String::from_utf8(plaintext)
			.map_err(|_| AuthError::Cipher("secret is not valid UTF-8".to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn cipher() -> SecretCipher {
		SecretCipher::from_key([7u8; KEY_LEN])
	}

	#[test]
	fn seal_open_round_trip() {
		let cipher = cipher();
		let sealed = cipher.seal("client-secret-value").unwrap();
		assert_ne!(sealed, "client-secret-value");
		assert_eq!(cipher.open(&sealed).unwrap(), "client-secret-value");
	}

	#[test]
	fn sealing_twice_produces_distinct_envelopes() {
		let cipher = cipher();
		let a = cipher.seal("secret").unwrap();
		let b = cipher.seal("secret").unwrap();
		assert_ne!(a, b);
	}

	#[test]
	fn tampered_envelope_is_rejected() {
		let cipher = cipher();
		let sealed = cipher.seal("secret").unwrap();
		let mut bytes = base64::engine::general_purpose::STANDARD
			.decode(&sealed)
			.unwrap();
		let last = bytes.len() - 1;
		bytes[last] ^= 0xff;
		let tampered = base64::engine::general_purpose::STANDARD.encode(bytes);
		assert!(cipher.open(&tampered).is_err());
	}

	#[test]
	fn wrong_key_cannot_open() {
		let sealed = cipher().seal("secret").unwrap();
		let other = SecretCipher::from_key([8u8; KEY_LEN]);
		assert!(other.open(&sealed).is_err());
	}
}
