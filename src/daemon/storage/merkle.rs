use sha2::{Digest, Sha256};

use super::entities::EncryptedEnvelope;

/// Digest of one stored envelope: `sha256(ciphertext || nonce || tag)`.
pub fn envelope_digest(envelope: &EncryptedEnvelope) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(&envelope.ciphertext);
    hasher.update(&envelope.nonce);
    hasher.update(&envelope.tag);
    hasher.finalize().into()
}

/// Hex Merkle root over the given envelopes, in ledger order. An odd node is paired with
/// itself. `None` for an empty day.
pub fn day_root(envelopes: &[EncryptedEnvelope]) -> Option<String> {
    let mut level: Vec<[u8; 32]> = envelopes.iter().map(envelope_digest).collect();
    if level.is_empty() {
        return None;
    }
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                let mut hasher = Sha256::new();
                hasher.update(left);
                hasher.update(right);
                hasher.finalize().into()
            })
            .collect();
    }
    Some(hex(&level[0]))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use sha2::{Digest, Sha256};

    use crate::daemon::storage::entities::EncryptedEnvelope;

    use super::{day_root, envelope_digest, hex};

    fn envelope(byte: u8) -> EncryptedEnvelope {
        EncryptedEnvelope {
            ciphertext: vec![byte; 8],
            nonce: vec![byte; 12],
            tag: vec![byte; 16],
        }
    }

    #[test]
    fn test_empty_day_has_no_root() {
        assert_eq!(day_root(&[]), None);
    }

    #[test]
    fn test_single_leaf_is_its_digest() {
        let leaf = envelope(1);
        assert_eq!(day_root(&[leaf.clone()]), Some(hex(&envelope_digest(&leaf))));
    }

    #[test]
    fn test_odd_leaf_pairs_with_itself() {
        let leaves = [envelope(1), envelope(2), envelope(3)];
        let digests: Vec<[u8; 32]> = leaves.iter().map(envelope_digest).collect();
        let node = |l: &[u8; 32], r: &[u8; 32]| -> [u8; 32] {
            let mut hasher = Sha256::new();
            hasher.update(l);
            hasher.update(r);
            hasher.finalize().into()
        };
        let expected = node(&node(&digests[0], &digests[1]), &node(&digests[2], &digests[2]));
        assert_eq!(day_root(&leaves), Some(hex(&expected)));
    }

    #[test]
    fn test_root_depends_on_order() {
        let forward = day_root(&[envelope(1), envelope(2)]);
        let backward = day_root(&[envelope(2), envelope(1)]);
        assert_ne!(forward, backward);
    }
}
