//! Content fingerprints for code contexts using BLAKE3

use crate::extract::ArtifactMap;
use crate::types::{ArtifactKind, Fingerprint, ResolutionOrder};
use blake3::Hasher;

/// Compute the fingerprint of an artifact map
///
/// Fingerprint = hash(order || for each entry in key order:
/// kind || id_len || id || original_len || payload_len || payload)
///
/// Two extractions of the same inputs with the same order produce the same
/// fingerprint, which is what makes re-applying a configuration a no-op.
pub fn compute_fingerprint(entries: &ArtifactMap, order: ResolutionOrder) -> Fingerprint {
    let mut hasher = Hasher::new();

    let order_tag: &[u8] = match order {
        ResolutionOrder::ChildFirst => b"child-first",
        ResolutionOrder::ParentFirst => b"parent-first",
    };
    hasher.update(order_tag);

    for (key, entry) in entries.iter() {
        hasher.update(match key.kind {
            ArtifactKind::Code => b"c",
            ArtifactKind::DataFile => b"f",
        });
        hasher.update(&(key.id.len() as u64).to_be_bytes());
        hasher.update(key.id.as_bytes());
        hasher.update(&entry.original_len.to_be_bytes());
        hasher.update(&(entry.payload.len() as u64).to_be_bytes());
        hasher.update(&entry.payload);
    }

    *hasher.finalize().as_bytes()
}

/// Short hex rendering for logs
pub fn short_hex(fingerprint: &Fingerprint) -> String {
    hex::encode(&fingerprint[..8])
}
