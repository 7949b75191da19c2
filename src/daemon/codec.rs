//! Device-bound authenticated encryption. Every raw sample and every forwarded aggregate goes
//! through [Codec] before it leaves memory.

use std::fs;

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Key, Nonce, Tag,
};
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use tracing::{info, warn};

use super::{error::TrackerError, storage::entities::EncryptedEnvelope};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

const KEY_SALT: &[u8] = b"workchain-ledger-salt-v1";
/// scrypt cost parameters: N = 2^14, r = 8, p = 1.
const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

const MACHINE_ID_PATHS: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyOrigin {
    /// Derived from a stable device identifier, so later runs can read the ledger.
    Device,
    /// Random key for this run only. Ciphertexts written now are unreadable after restart.
    Session,
}

/// Process-wide secret. Lives in memory only and is never logged.
pub struct DeviceKey {
    bytes: [u8; KEY_LEN],
    origin: KeyOrigin,
}

impl std::fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceKey")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl DeviceKey {
    /// Derives the key from the best identifier this device offers, falling back to a
    /// session key.
    pub fn derive() -> Self {
        let Some(identifier) = device_identifier() else {
            warn!("No device identifier available, using a session-only key");
            return Self::session();
        };
        match Self::from_identifier(&identifier) {
            Ok(key) => {
                info!("Initialized device-bound key");
                key
            }
            Err(e) => {
                warn!("Failed to derive device key {e}, using a session-only key");
                Self::session()
            }
        }
    }

    /// [DeviceKey::derive] on the blocking pool. scrypt is too slow to run on the runtime thread.
    pub async fn derive_off_runtime() -> Self {
        match tokio::task::spawn_blocking(Self::derive).await {
            Ok(key) => key,
            Err(e) => {
                warn!("Key derivation task failed {e}, using a session-only key");
                Self::session()
            }
        }
    }

    pub fn from_identifier(identifier: &str) -> Result<Self, TrackerError> {
        let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_LEN)
            .map_err(|e| TrackerError::KeyDerivation(e.to_string()))?;
        let mut bytes = [0u8; KEY_LEN];
        scrypt::scrypt(identifier.as_bytes(), KEY_SALT, &params, &mut bytes)
            .map_err(|e| TrackerError::KeyDerivation(e.to_string()))?;
        Ok(Self {
            bytes,
            origin: KeyOrigin::Device,
        })
    }

    pub fn session() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self {
            bytes,
            origin: KeyOrigin::Session,
        }
    }

    pub fn origin(&self) -> KeyOrigin {
        self.origin
    }
}

/// Best effort identifier of this machine: the systemd/dbus machine id, then the host name.
fn device_identifier() -> Option<String> {
    MACHINE_ID_PATHS
        .iter()
        .filter_map(|path| fs::read_to_string(path).ok())
        .map(|id| id.trim().to_string())
        .find(|id| !id.is_empty())
        .or_else(|| sysinfo::System::host_name().filter(|name| !name.is_empty()))
}

/// AES-256-GCM keyed by a [DeviceKey]. Each call to [Codec::encrypt] draws a fresh random
/// 96-bit nonce.
pub struct Codec {
    cipher: Aes256Gcm,
    origin: KeyOrigin,
}

impl Codec {
    pub fn new(key: &DeviceKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.bytes)),
            origin: key.origin,
        }
    }

    pub fn key_origin(&self) -> KeyOrigin {
        self.origin
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedEnvelope, TrackerError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let mut buffer = plaintext.to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut buffer)
            .map_err(|_| TrackerError::EncryptionFailure)?;

        Ok(EncryptedEnvelope {
            ciphertext: buffer,
            nonce: nonce.to_vec(),
            tag: tag.to_vec(),
        })
    }

    pub fn decrypt(&self, envelope: &EncryptedEnvelope) -> Result<Vec<u8>, TrackerError> {
        if envelope.nonce.len() != NONCE_LEN || envelope.tag.len() != TAG_LEN {
            return Err(TrackerError::AuthenticationFailure);
        }
        let mut buffer = envelope.ciphertext.clone();
        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&envelope.nonce),
                b"",
                &mut buffer,
                Tag::from_slice(&envelope.tag),
            )
            .map_err(|_| TrackerError::AuthenticationFailure)?;
        Ok(buffer)
    }

    /// Round-trips a fixed message. A failure is surfaced in the tracker status.
    pub fn self_test(&self) -> bool {
        const SELF_TEST_PLAINTEXT: &[u8] = b"Hello, WorkChain!";
        self.encrypt(SELF_TEST_PLAINTEXT)
            .and_then(|envelope| self.decrypt(&envelope))
            .is_ok_and(|plaintext| plaintext == SELF_TEST_PLAINTEXT)
    }
}
