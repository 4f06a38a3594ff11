#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `checksums` centralises the single strong digest this workspace relies
//! on: SHA-256. The block exchange protocol addresses every block and every
//! file by its SHA-256 digest, so this crate is deliberately narrow -- it
//! does not carry the rolling-checksum or MD4/MD5 machinery a full rsync
//! reimplementation needs, because the engine never performs delta
//! matching, only whole-block content addressing.
//!
//! # Design
//!
//! [`Sha256`] wraps `sha2::Sha256` behind a small streaming API so callers
//! never depend on the `sha2` crate directly. [`hex_lower`] and
//! [`content_hash`] implement the two encodings the rest of the workspace
//! needs: a single block digest, and the digest-of-joined-hex-digests used
//! as a whole-file content hash.
//!
//! # Invariants
//!
//! - Hex encoding is always lowercase. `hashes()` and `content_hash()` in
//!   the `blocks` crate must use this same casing consistently within one
//!   run, per the wire-compatibility note in the block exchange protocol.

mod sha256;

pub use sha256::Sha256;

/// Length in bytes of a SHA-256 digest.
pub const DIGEST_LEN: usize = 32;

/// Lowercase hex encoding of a digest, matching the reference
/// implementation's default casing.
#[must_use]
pub fn hex_lower(digest: &[u8]) -> String {
    hex::encode(digest)
}

/// Computes the content hash of an ordered list of block digests: the
/// SHA-256 of the ASCII string formed by joining the lowercase hex
/// encoding of each digest with `,`.
#[must_use]
pub fn content_hash<'a, I>(block_hashes: I) -> String
where
    I: IntoIterator<Item = &'a [u8; 32]>,
{
    let joined = block_hashes
        .into_iter()
        .map(|hash| hex_lower(hash))
        .collect::<Vec<_>>()
        .join(",");
    hex_lower(&Sha256::digest(joined.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_of_no_blocks_is_digest_of_empty_string() {
        let empty: Vec<&[u8; 32]> = Vec::new();
        assert_eq!(content_hash(empty), hex_lower(&Sha256::digest(b"")));
    }

    #[test]
    fn content_hash_joins_with_comma() {
        let a = [0x11u8; 32];
        let b = [0x22u8; 32];
        let expected_input = format!("{},{}", hex_lower(&a), hex_lower(&b));
        let expected = hex_lower(&Sha256::digest(expected_input.as_bytes()));
        assert_eq!(content_hash([&a, &b]), expected);
    }

    #[test]
    fn hex_lower_is_always_lowercase() {
        let digest = Sha256::digest(b"abc");
        let encoded = hex_lower(&digest);
        assert_eq!(encoded, encoded.to_ascii_lowercase());
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn hex_lower_roundtrips_through_hex_decode(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let encoded = hex_lower(&bytes);
            prop_assert_eq!(hex::decode(&encoded).unwrap(), bytes);
            prop_assert_eq!(encoded, encoded.to_ascii_lowercase());
        }

        #[test]
        fn content_hash_matches_digest_of_comma_joined_hex(
            digests in proptest::collection::vec(proptest::array::uniform32(any::<u8>()), 0..8),
        ) {
            let refs: Vec<&[u8; 32]> = digests.iter().collect();
            let actual = content_hash(refs);

            let joined = digests
                .iter()
                .map(|digest| hex_lower(digest))
                .collect::<Vec<_>>()
                .join(",");
            let expected = hex_lower(&Sha256::digest(joined.as_bytes()));
            prop_assert_eq!(actual, expected);
        }
    }
}
