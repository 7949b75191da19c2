use sha2::{Digest, Sha256};

/// Hex encoded SHA-256 of `data`. Used for window fingerprints and screenshot digests, so that
/// neither titles nor pixels ever have to be kept around.
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    format!("{:x}", Sha256::digest(data.as_ref()))
}

/// Shortened form of a digest for log lines.
pub fn short(digest: &str) -> &str {
    digest.get(..16).unwrap_or(digest)
}

#[cfg(test)]
mod tests {
    use super::{sha256_hex, short};

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_short_handles_small_input() {
        assert_eq!(short("abcd"), "abcd");
        assert_eq!(short(&sha256_hex("abc")), "ba7816bf8f01cfea");
    }
}
