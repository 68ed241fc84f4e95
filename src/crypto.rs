//! Jaskier Shared Pattern — crypto
//! AES-256-GCM encryption for provider credentials at rest (config.json).
//! Ported from the OAuth token encryption in `oauth.rs`: same key
//! derivation, same `"enc:base64(nonce||ciphertext)"` wire format, same
//! graceful degradation to plaintext when no key is configured.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

const ENCRYPTED_PREFIX: &str = "enc:";

/// Derive a 256-bit key from `GATEWAY_ENCRYPTION_KEY`, falling back to a
/// `master.key` file under `config_dir` (generated on first run).
pub fn encryption_key(config_dir: &std::path::Path) -> Option<[u8; 32]> {
    let raw = std::env::var("GATEWAY_ENCRYPTION_KEY")
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(|| read_or_create_master_key(config_dir))?;

    let hash = Sha256::digest(raw.as_bytes());
    let mut key = [0u8; 32];
    key.copy_from_slice(&hash);
    Some(key)
}

fn read_or_create_master_key(config_dir: &std::path::Path) -> Option<String> {
    let path = config_dir.join("master.key");
    if let Ok(existing) = std::fs::read_to_string(&path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }

    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    let key = hex::encode(bytes);

    if std::fs::create_dir_all(config_dir).is_ok() && std::fs::write(&path, &key).is_ok() {
        tracing::info!("crypto: generated new master key at {}", path.display());
    } else {
        tracing::warn!("crypto: could not persist master key — secrets will not survive restart reliably");
    }
    Some(key)
}

/// Encrypt a plaintext secret. Returns `"enc:<...>"`, or the plaintext
/// itself if no key could be derived (dev mode — not a fatal condition).
pub fn encrypt(plaintext: &str, key_bytes: Option<&[u8; 32]>) -> String {
    let Some(key_bytes) = key_bytes else {
        return plaintext.to_string();
    };

    use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
    use aes_gcm::Aes256Gcm;

    let cipher = Aes256Gcm::new_from_slice(key_bytes).expect("AES-256-GCM key is exactly 32 bytes");
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    match cipher.encrypt(&nonce, plaintext.as_bytes()) {
        Ok(ciphertext) => {
            let mut combined = nonce.to_vec();
            combined.extend_from_slice(&ciphertext);
            format!("{ENCRYPTED_PREFIX}{}", STANDARD.encode(&combined))
        }
        Err(e) => {
            tracing::error!("crypto: encryption failed: {e} — storing plaintext");
            plaintext.to_string()
        }
    }
}

/// Decrypt a value produced by [`encrypt`]. Passes legacy plaintext through.
pub fn decrypt(stored: &str, key_bytes: Option<&[u8; 32]>) -> Option<String> {
    let Some(encoded) = stored.strip_prefix(ENCRYPTED_PREFIX) else {
        return Some(stored.to_string());
    };

    let key_bytes = key_bytes?;
    let combined = STANDARD.decode(encoded).ok()?;
    if combined.len() < 12 {
        tracing::error!("crypto: ciphertext too short");
        return None;
    }

    use aes_gcm::aead::{Aead, KeyInit};
    use aes_gcm::{Aes256Gcm, Nonce};

    let (nonce_bytes, ciphertext) = combined.split_at(12);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new_from_slice(key_bytes).expect("AES-256-GCM key is exactly 32 bytes");

    match cipher.decrypt(nonce, ciphertext) {
        Ok(plaintext) => String::from_utf8(plaintext).ok(),
        Err(e) => {
            tracing::error!("crypto: decryption failed: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_with_key() {
        let key = [7u8; 32];
        let enc = encrypt("sk-ant-secret", Some(&key));
        assert!(enc.starts_with(ENCRYPTED_PREFIX));
        assert_eq!(decrypt(&enc, Some(&key)).unwrap(), "sk-ant-secret");
    }

    #[test]
    fn round_trip_without_key_is_plaintext() {
        let enc = encrypt("sk-ant-secret", None);
        assert_eq!(enc, "sk-ant-secret");
        assert_eq!(decrypt(&enc, None).unwrap(), "sk-ant-secret");
    }

    #[test]
    fn decrypt_wrong_key_fails() {
        let key_a = [1u8; 32];
        let key_b = [2u8; 32];
        let enc = encrypt("secret", Some(&key_a));
        assert!(decrypt(&enc, Some(&key_b)).is_none());
    }

    #[test]
    fn legacy_plaintext_passes_through() {
        assert_eq!(decrypt("plain-value", Some(&[3u8; 32])).unwrap(), "plain-value");
    }
}
