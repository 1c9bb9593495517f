//! Optional AES-GCM-at-rest encryption for session/message columns.
//! Layout is `nonce (12 bytes) ‖ ciphertext ‖ tag (16 bytes)`; any bitflip in
//! either the nonce or the ciphertext fails GCM's tag check on decrypt.

use aes::{Aes128, Aes192, Aes256};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{consts::U12, Aead, KeyInit};
use aes_gcm::AesGcm;
use base64::Engine;
use rand::RngCore;

use kore_commons::error::{KoreError, KoreResult};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

type Nonce = GenericArray<u8, U12>;

enum Cipher {
    Aes128(AesGcm<Aes128, U12>),
    Aes192(AesGcm<Aes192, U12>),
    Aes256(AesGcm<Aes256, U12>),
}

impl Cipher {
    fn new(key: &[u8]) -> KoreResult<Self> {
        match key.len() {
            16 => Ok(Self::Aes128(AesGcm::new(GenericArray::from_slice(key)))),
            24 => Ok(Self::Aes192(AesGcm::new(GenericArray::from_slice(key)))),
            32 => Ok(Self::Aes256(AesGcm::new(GenericArray::from_slice(key)))),
            other => Err(KoreError::Validation(format!("AES-GCM key must be 16, 24, or 32 bytes, got {other}"))),
        }
    }

    fn encrypt(&self, nonce: &Nonce, plaintext: &[u8]) -> KoreResult<Vec<u8>> {
        let result = match self {
            Self::Aes128(c) => c.encrypt(nonce, plaintext),
            Self::Aes192(c) => c.encrypt(nonce, plaintext),
            Self::Aes256(c) => c.encrypt(nonce, plaintext),
        };
        result.map_err(|_| KoreError::Fatal("AES-GCM encryption failed".into()))
    }

    fn decrypt(&self, nonce: &Nonce, ciphertext: &[u8]) -> KoreResult<Vec<u8>> {
        let result = match self {
            Self::Aes128(c) => c.decrypt(nonce, ciphertext),
            Self::Aes192(c) => c.decrypt(nonce, ciphertext),
            Self::Aes256(c) => c.decrypt(nonce, ciphertext),
        };
        result.map_err(|_| KoreError::Decrypt("AES-GCM tag verification failed".into()))
    }
}

pub struct SessionCipher {
    cipher: Cipher,
}

impl SessionCipher {
    pub fn new(key: &[u8]) -> KoreResult<Self> {
        Ok(Self { cipher: Cipher::new(key)? })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> KoreResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self.cipher.encrypt(nonce, plaintext)?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn decrypt(&self, blob: &[u8]) -> KoreResult<Vec<u8>> {
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(KoreError::Decrypt("ciphertext shorter than nonce + tag".into()));
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        self.cipher.decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
    }

    pub fn encrypt_to_base64(&self, plaintext: &str) -> KoreResult<String> {
        Ok(base64::engine::general_purpose::STANDARD.encode(self.encrypt(plaintext.as_bytes())?))
    }

    pub fn decrypt_from_base64(&self, encoded: &str) -> KoreResult<String> {
        let blob = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| KoreError::Decrypt(e.to_string()))?;
        String::from_utf8(self.decrypt(&blob)?).map_err(|e| KoreError::Decrypt(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_for_every_supported_key_size() {
        for key_len in [16, 24, 32] {
            let key = vec![0u8; key_len];
            let cipher = SessionCipher::new(&key).unwrap();
            let blob = cipher.encrypt(b"secret").unwrap();
            assert_eq!(blob.len(), NONCE_LEN + b"secret".len() + TAG_LEN);
            assert_eq!(cipher.decrypt(&blob).unwrap(), b"secret");
        }
    }

    #[test]
    fn tampered_byte_fails_decryption() {
        let cipher = SessionCipher::new(&[0u8; 32]).unwrap();
        let mut blob = cipher.encrypt(b"secret").unwrap();
        blob[20] ^= 0xff;
        assert!(matches!(cipher.decrypt(&blob), Err(KoreError::Decrypt(_))));
    }

    #[test]
    fn rejects_unsupported_key_length() {
        assert!(SessionCipher::new(&[0u8; 10]).is_err());
    }

    #[test]
    fn base64_round_trip_preserves_unicode_text() {
        let cipher = SessionCipher::new(&[1u8; 16]).unwrap();
        let encoded = cipher.encrypt_to_base64("héllo wörld 🌍").unwrap();
        assert_eq!(cipher.decrypt_from_base64(&encoded).unwrap(), "héllo wörld 🌍");
    }
}
