use thiserror::Error;

/// Failures of the tracking pipeline. None of them is fatal to the process: the tracker logs
/// them and keeps sampling.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The OS returned nothing for this tick. The tick is skipped.
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// Tag mismatch or a tampered nonce/ciphertext. Never treated as plaintext.
    #[error("envelope failed authentication")]
    AuthenticationFailure,

    #[error("encryption failed")]
    EncryptionFailure,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("storage failure: {0}")]
    StorageFailure(#[from] rusqlite::Error),

    #[error("ledger worker is no longer running")]
    StorageUnavailable,

    #[error("ledger row is corrupt: {0}")]
    CorruptRecord(String),

    /// Network or sink error while pushing a blob off the device.
    #[error("forwarding failed: {0}")]
    ForwardFailure(String),

    #[error("encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
