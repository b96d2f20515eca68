//! Fails-closed authenticated encryption for Secret/Project credential
//! values. On-disk representation: `nonce_hex:tag_hex:ciphertext_hex`.
//!
//! Built from the same `aes-gcm` + `sha2` + `zeroize` dependency set the
//! credential store used for its OS-keyring path; here the key is derived
//! and held in-process instead of handed to the OS.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Fixed application-level salt for the key-derivation step. Not a secret by
/// itself — the master secret is what must stay confidential.
const KDF_SALT: &[u8] = b"mesoclaw-fleet-secretbox-v1";

#[derive(Debug, thiserror::Error)]
pub enum SecretBoxError {
    #[error("authentication tag mismatch")]
    Integrity,
    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),
    #[error("master secret not configured")]
    MissingMasterSecret,
}

/// Holds the process-wide 256-bit key, derived once at startup and wiped on drop.
pub struct SecretBox {
    key: Zeroizing<[u8; 32]>,
}

impl SecretBox {
    /// Derive the key from an operator-provided master secret. Absence of a
    /// master secret at startup is a fatal configuration error; callers
    /// should reject an empty `master_secret` before calling this.
    pub fn new(master_secret: &str) -> Result<Self, SecretBoxError> {
        if master_secret.is_empty() {
            return Err(SecretBoxError::MissingMasterSecret);
        }
        let mut hasher = Sha256::new();
        hasher.update(KDF_SALT);
        hasher.update(master_secret.as_bytes());
        let digest = hasher.finalize();
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Ok(Self { key: Zeroizing::new(key) })
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_ref()))
    }

    /// Encrypt `plaintext`, returning `nonce_hex:tag_hex:ciphertext_hex`.
    pub fn encrypt(&self, plaintext: &[u8]) -> String {
        let cipher = self.cipher();
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut out = cipher.encrypt(&nonce, plaintext).expect("aes-gcm encryption is infallible for valid keys");

        // `out` is ciphertext || tag (16 bytes); split so the on-disk format
        // carries tag and ciphertext as separate hex fields.
        let tag = out.split_off(out.len() - 16);
        format!("{}:{}:{}", hex::encode(nonce), hex::encode(tag), hex::encode(out))
    }

    /// Decrypt a `nonce_hex:tag_hex:ciphertext_hex` string produced by `encrypt`.
    /// Any tag mismatch is reported as [`SecretBoxError::Integrity`] — callers
    /// must treat this as fatal for the affected value, not retry or surface
    /// the ciphertext to the operator.
    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, SecretBoxError> {
        let mut parts = encoded.splitn(3, ':');
        let (Some(nonce_hex), Some(tag_hex), Some(ct_hex)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(SecretBoxError::MalformedCiphertext(encoded.to_owned()));
        };

        let nonce_bytes =
            hex::decode(nonce_hex).map_err(|e| SecretBoxError::MalformedCiphertext(e.to_string()))?;
        let tag_bytes = hex::decode(tag_hex).map_err(|e| SecretBoxError::MalformedCiphertext(e.to_string()))?;
        let ct_bytes = hex::decode(ct_hex).map_err(|e| SecretBoxError::MalformedCiphertext(e.to_string()))?;

        if nonce_bytes.len() != 12 || tag_bytes.len() != 16 {
            return Err(SecretBoxError::MalformedCiphertext(encoded.to_owned()));
        }

        let mut combined = ct_bytes;
        combined.extend_from_slice(&tag_bytes);

        let nonce = Nonce::from_slice(&nonce_bytes);
        self.cipher()
            .decrypt(nonce, combined.as_ref())
            .map_err(|_| SecretBoxError::Integrity)
    }

    pub fn encrypt_str(&self, plaintext: &str) -> String {
        self.encrypt(plaintext.as_bytes())
    }

    pub fn decrypt_str(&self, encoded: &str) -> Result<String, SecretBoxError> {
        let bytes = self.decrypt(encoded)?;
        String::from_utf8(bytes).map_err(|e| SecretBoxError::MalformedCiphertext(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let sb = SecretBox::new("correct horse battery staple").unwrap();
        let encoded = sb.encrypt_str("sk-ant-super-secret");
        assert_eq!(encoded.matches(':').count(), 2);
        assert_eq!(sb.decrypt_str(&encoded).unwrap(), "sk-ant-super-secret");
    }

    #[test]
    fn tampered_ciphertext_fails_closed() {
        let sb = SecretBox::new("master").unwrap();
        let mut encoded = sb.encrypt_str("value");
        let last = encoded.pop().unwrap();
        encoded.push(if last == 'a' { 'b' } else { 'a' });
        assert!(matches!(sb.decrypt_str(&encoded), Err(SecretBoxError::Integrity)));
    }

    #[test]
    fn tampered_tag_fails_closed() {
        let sb = SecretBox::new("master").unwrap();
        let encoded = sb.encrypt_str("value");
        let mut parts: Vec<&str> = encoded.splitn(3, ':').collect();
        let mut tag = parts[1].to_owned();
        tag.replace_range(0..2, "ff");
        parts[1] = &tag;
        let tampered = parts.join(":");
        assert!(matches!(sb.decrypt_str(&tampered), Err(SecretBoxError::Integrity)));
    }

    #[test]
    fn malformed_input_is_rejected() {
        let sb = SecretBox::new("master").unwrap();
        assert!(matches!(
            sb.decrypt_str("not-the-right-format"),
            Err(SecretBoxError::MalformedCiphertext(_))
        ));
    }

    #[test]
    fn empty_master_secret_rejected() {
        assert!(matches!(SecretBox::new(""), Err(SecretBoxError::MissingMasterSecret)));
    }

    #[test]
    fn different_keys_cannot_cross_decrypt() {
        let sb1 = SecretBox::new("key-one").unwrap();
        let sb2 = SecretBox::new("key-two").unwrap();
        let encoded = sb1.encrypt_str("value");
        assert!(matches!(sb2.decrypt_str(&encoded), Err(SecretBoxError::Integrity)));
    }
}
