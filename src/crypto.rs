//! Credential encryption at rest.
//!
//! Envelope format is `iv:tag:ciphertext`, each part lowercase hex, with a
//! fresh 16-byte IV per call under AES-256-GCM.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadCore, AeadInPlace, KeyInit, OsRng};
use aes_gcm::aes::Aes256;
use aes_gcm::AesGcm;
use thiserror::Error;

use crate::payments::error::PaymentError;

type Aes256Gcm16 = AesGcm<Aes256, U16>;

const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;
const KEY_HEX_LEN: usize = 64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encryption key must be {KEY_HEX_LEN} hex characters")]
    InvalidKey,

    #[error("malformed credential envelope")]
    MalformedEnvelope,

    #[error("credential envelope failed authentication")]
    DecryptionFailed,

    #[error("credential encryption failed")]
    EncryptionFailed,
}

impl From<CryptoError> for PaymentError {
    fn from(err: CryptoError) -> Self {
        PaymentError::Crypto {
            message: err.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct CredentialCipher {
    cipher: Aes256Gcm16,
}

impl std::fmt::Debug for CredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialCipher([REDACTED])")
    }
}

impl CredentialCipher {
    pub fn from_hex_key(key_hex: &str) -> Result<Self, CryptoError> {
        let key_hex = key_hex.trim();
        if key_hex.len() != KEY_HEX_LEN {
            return Err(CryptoError::InvalidKey);
        }
        let key = hex::decode(key_hex).map_err(|_| CryptoError::InvalidKey)?;
        let cipher = Aes256Gcm16::new_from_slice(&key).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let iv = Aes256Gcm16::generate_nonce(&mut OsRng);
        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(&iv, b"", &mut buffer)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(buffer)
        ))
    }

    pub fn decrypt(&self, envelope: &str) -> Result<String, CryptoError> {
        let mut parts = envelope.split(':');
        let (iv, tag, ciphertext) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(iv), Some(tag), Some(ct), None) => (iv, tag, ct),
            _ => return Err(CryptoError::MalformedEnvelope),
        };

        let iv = decode_lower_hex(iv)?;
        let tag = decode_lower_hex(tag)?;
        let mut buffer = decode_lower_hex(ciphertext)?;
        if iv.len() != IV_LEN || tag.len() != TAG_LEN {
            return Err(CryptoError::MalformedEnvelope);
        }

        self.cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(&iv),
                b"",
                &mut buffer,
                GenericArray::from_slice(&tag),
            )
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(buffer).map_err(|_| CryptoError::DecryptionFailed)
    }
}

/// Upper-case digits are rejected so every bit of the envelope text is
/// significant.
fn decode_lower_hex(part: &str) -> Result<Vec<u8>, CryptoError> {
    if !part
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return Err(CryptoError::MalformedEnvelope);
    }
    hex::decode(part).map_err(|_| CryptoError::MalformedEnvelope)
}
