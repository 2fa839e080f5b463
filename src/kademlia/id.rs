//! Kademlia identifier module
//!
//! 160-bit identifiers with XOR distance, used both as node ids and as
//! content addresses.

use crate::error::KadfsError;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Identifier length in bytes
pub const ID_LENGTH: usize = 20;

/// Identifier length in bits
pub const ID_BITS: usize = ID_LENGTH * 8;

/// A 160-bit Kademlia identifier
///
/// Ordering is big-endian byte comparison, which matches the numeric order
/// of the identifier interpreted as a 160-bit unsigned integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KademliaId(pub [u8; ID_LENGTH]);

impl KademliaId {
    /// Create a new KademliaId from bytes
    pub fn new(id: [u8; ID_LENGTH]) -> Self {
        Self(id)
    }

    /// Hash arbitrary bytes into a content address
    pub fn hash(data: &[u8]) -> Self {
        let digest = Sha1::digest(data);
        let mut id = [0u8; ID_LENGTH];
        id.copy_from_slice(&digest);
        Self(id)
    }

    /// Generate a uniformly random KademliaId
    pub fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut id = [0u8; ID_LENGTH];
        rng.fill(&mut id);
        Self(id)
    }

    /// Generate a random id sharing exactly the first `n` bits with `id`
    ///
    /// The first `n` bits are copied from `id`, bit `n` is forced to the
    /// opposite of `id`'s bit `n`, and all remaining bits are random. Used to
    /// pick a refresh target inside a specific bucket's region.
    pub fn random_with_common_prefix(id: &KademliaId, n: usize) -> Self {
        debug_assert!(n < ID_BITS);
        let mut out = Self::random().0;
        let byte = n / 8;
        let bit = n % 8;

        out[..byte].copy_from_slice(&id.0[..byte]);
        // Top `bit` bits of the boundary byte come from the prefix
        let mask: u8 = if bit == 0 { 0 } else { !(0xff >> bit) };
        out[byte] = (id.0[byte] & mask) | (out[byte] & !mask);
        // Bit n must differ so the shared prefix is exactly n bits long
        let flip = 0x80 >> bit;
        out[byte] = (out[byte] & !flip) | ((id.0[byte] ^ flip) & flip);

        Self(out)
    }

    /// XOR distance to another identifier
    pub fn distance(&self, other: &KademliaId) -> KademliaId {
        let mut result = [0u8; ID_LENGTH];
        for i in 0..ID_LENGTH {
            result[i] = self.0[i] ^ other.0[i];
        }
        KademliaId(result)
    }

    /// Number of leading zero bits; `ID_BITS` for the zero identifier
    pub fn leading_zeros(&self) -> usize {
        for (i, byte) in self.0.iter().enumerate() {
            if *byte != 0 {
                return i * 8 + byte.leading_zeros() as usize;
            }
        }
        ID_BITS
    }

    /// Get bit `i` (0 is the most significant bit)
    pub fn bit(&self, i: usize) -> bool {
        let byte = i / 8;
        let shift = 7 - (i % 8);
        (self.0[byte] >> shift) & 1 != 0
    }

    /// Get the identifier as bytes
    pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
        &self.0
    }

    /// Get the identifier as a hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse an identifier from a hex string
    pub fn from_hex(hex_str: &str) -> Result<Self, KadfsError> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| KadfsError::parse_error_with_source("Invalid hex id", e.to_string()))?;
        if bytes.len() != ID_LENGTH {
            return Err(KadfsError::parse_error(format!(
                "Id must be {} bytes, got {}",
                ID_LENGTH,
                bytes.len()
            )));
        }
        let mut id = [0u8; ID_LENGTH];
        id.copy_from_slice(&bytes);
        Ok(Self(id))
    }
}

impl std::fmt::Display for KademliaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_symmetric() {
        for _ in 0..32 {
            let a = KademliaId::random();
            let b = KademliaId::random();
            assert_eq!(a.distance(&b), b.distance(&a));
        }
    }

    #[test]
    fn test_distance_identity() {
        let a = KademliaId::random();
        assert_eq!(a.distance(&a), KademliaId::new([0u8; ID_LENGTH]));
    }

    #[test]
    fn test_ordering_is_big_endian() {
        let small = KademliaId::new([0u8; ID_LENGTH]);
        let mut large = [0u8; ID_LENGTH];
        large[0] = 1;
        let large = KademliaId::new(large);
        assert!(small < large);

        let mut tail = [0u8; ID_LENGTH];
        tail[ID_LENGTH - 1] = 0xff;
        assert!(KademliaId::new(tail) < large);
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = KademliaId::hash(b"some file contents");
        let b = KademliaId::hash(b"some file contents");
        let c = KademliaId::hash(b"other contents");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_hex_round_trip() {
        let id = KademliaId::random();
        let parsed = KademliaId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(KademliaId::from_hex("zz").is_err());
        assert!(KademliaId::from_hex("abcd").is_err());
    }

    #[test]
    fn test_leading_zeros() {
        assert_eq!(KademliaId::new([0u8; ID_LENGTH]).leading_zeros(), ID_BITS);
        let mut id = [0u8; ID_LENGTH];
        id[0] = 0x80;
        assert_eq!(KademliaId::new(id).leading_zeros(), 0);
        let mut id = [0u8; ID_LENGTH];
        id[2] = 0x10;
        assert_eq!(KademliaId::new(id).leading_zeros(), 19);
    }

    #[test]
    fn test_random_with_common_prefix_all_lengths() {
        let id = KademliaId::random();
        for n in 0..ID_BITS {
            let generated = KademliaId::random_with_common_prefix(&id, n);
            for i in 0..n {
                assert_eq!(generated.bit(i), id.bit(i), "bit {} differs for n={}", i, n);
            }
            assert_ne!(generated.bit(n), id.bit(n), "bit {} must differ for n={}", n, n);
            // Shared prefix is exactly n: the distance's highest set bit is at n
            assert_eq!(id.distance(&generated).leading_zeros(), n);
        }
    }
}
