// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Advisory Lock Keys
//!
//! Deterministic 32-bit key derivation for per-(document, stage) advisory
//! locks. The computation is bit-exact and part of the external contract:
//!
//! ```text
//! lock_id = (first 8 hex chars of sha256(document_id ":" stage_name)
//!            interpreted as uint32) & 0x7FFFFFFF
//! ```
//!
//! Masking to 31 bits keeps the key valid as a signed integer for stores
//! whose advisory-lock functions take `int4`.

use sha2::{Digest, Sha256};

use crate::value_objects::{DocumentId, StageName};

/// Derives the advisory lock key for a (document, stage) pair.
pub fn advisory_lock_key(document_id: DocumentId, stage: StageName) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(document_id.to_string().as_bytes());
    hasher.update(b":");
    hasher.update(stage.as_str().as_bytes());
    let digest = hasher.finalize();

    // First 8 hex chars == first 4 bytes, big-endian
    let word = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    word & 0x7FFF_FFFF
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_key_is_deterministic() {
        let doc = DocumentId::new();
        assert_eq!(
            advisory_lock_key(doc, StageName::Upload),
            advisory_lock_key(doc, StageName::Upload)
        );
    }

    #[test]
    fn test_key_differs_per_stage_and_document() {
        let doc = DocumentId::new();
        let other = DocumentId::new();
        assert_ne!(
            advisory_lock_key(doc, StageName::Upload),
            advisory_lock_key(doc, StageName::Embedding)
        );
        assert_ne!(
            advisory_lock_key(doc, StageName::Upload),
            advisory_lock_key(other, StageName::Upload)
        );
    }

    #[test]
    fn test_key_fits_in_31_bits() {
        for stage in StageName::ALL {
            let key = advisory_lock_key(DocumentId::new(), stage);
            assert!(key <= 0x7FFF_FFFF);
        }
    }

    #[test]
    fn test_bit_exact_derivation() {
        // Derivation must match sha256 over "<uuid>:<stage>" with the first
        // four digest bytes read big-endian and masked to 31 bits.
        let doc = DocumentId::from_uuid(Uuid::nil());
        let mut hasher = Sha256::new();
        hasher.update(b"00000000-0000-0000-0000-000000000000:upload");
        let digest = hasher.finalize();
        let expected =
            u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) & 0x7FFF_FFFF;
        assert_eq!(advisory_lock_key(doc, StageName::Upload), expected);
    }
}
