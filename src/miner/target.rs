// src/miner/target.rs
//! Difficulty comparator
//!
//! Pools hand out targets in two encodings:
//! - compact: 4 bytes (8 hex chars), a little-endian `u32` from which the
//!   share difficulty is derived as `0xFFFFFFFF / t`
//! - full: 32 bytes (64 hex chars), the little-endian 256-bit threshold itself
//!
//! Both are canonicalized to one threshold at parse time. A digest, read as a
//! little-endian 256-bit integer, qualifies iff it is strictly below that
//! threshold. Thresholds live in 512-bit space because difficulty 1 yields
//! exactly `2^256`.

use crate::utils::error::MinerError;
use primitive_types::{U256, U512};
use std::fmt;

/// Number of hex characters in a compact target
const COMPACT_HEX_LEN: usize = 8;

/// Number of hex characters in a full target
const FULL_HEX_LEN: usize = 64;

/// How a target was encoded on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetEncoding {
    /// 4-byte compact form (little-endian `u32`)
    Compact(u32),
    /// 32-byte full form (little-endian 256-bit threshold)
    Full([u8; 32]),
}

/// A pool target resolved to its canonical threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    encoding: TargetEncoding,
    threshold: U512,
}

impl Target {
    /// Parses a target from its hex wire form
    ///
    /// # Errors
    /// - `InvalidTarget` when the length is neither 8 nor 64 hex chars, or the
    ///   compact value is zero (infinite difficulty)
    /// - `InputError` when the string is not valid hex
    pub fn from_hex(hex_str: &str) -> Result<Self, MinerError> {
        match hex_str.len() {
            COMPACT_HEX_LEN => {
                let mut bytes = [0u8; 4];
                hex::decode_to_slice(hex_str, &mut bytes)?;
                Self::compact(u32::from_le_bytes(bytes))
            }
            FULL_HEX_LEN => {
                let mut bytes = [0u8; 32];
                hex::decode_to_slice(hex_str, &mut bytes)?;
                Ok(Self::full(bytes))
            }
            n => Err(MinerError::InvalidTarget(format!(
                "expected {} or {} hex chars, got {}",
                COMPACT_HEX_LEN, FULL_HEX_LEN, n
            ))),
        }
    }

    /// Builds a target from the compact 32-bit encoding
    pub fn compact(value: u32) -> Result<Self, MinerError> {
        if value == 0 {
            return Err(MinerError::InvalidTarget(
                "compact target of zero has no finite difficulty".into(),
            ));
        }

        let difficulty = u64::from(u32::MAX) / u64::from(value);
        Ok(Self {
            encoding: TargetEncoding::Compact(value),
            threshold: threshold_for_difficulty(difficulty),
        })
    }

    /// Builds a target from the full 32-byte little-endian threshold
    pub fn full(bytes: [u8; 32]) -> Self {
        Self {
            encoding: TargetEncoding::Full(bytes),
            threshold: U512::from(U256::from_little_endian(&bytes)),
        }
    }

    /// Canonical threshold a digest must stay strictly below
    pub fn threshold(&self) -> U512 {
        self.threshold
    }

    /// Full 32-byte little-endian form of the canonical threshold
    ///
    /// Difficulty 1 has no 32-byte form; it expands to all `ff`, which
    /// rejects the single all-`ff` digest the compact form accepts.
    pub fn expand_to_full(&self) -> [u8; 32] {
        U256::try_from(self.threshold)
            .unwrap_or(U256::MAX)
            .to_little_endian()
    }

    /// Share difficulty represented by this target
    ///
    /// Saturates at `u64::MAX` for a zero threshold.
    pub fn difficulty(&self) -> u64 {
        match self.encoding {
            TargetEncoding::Compact(value) => u64::from(u32::MAX) / u64::from(value),
            TargetEncoding::Full(_) if self.threshold.is_zero() => u64::MAX,
            TargetEncoding::Full(_) => {
                let difficulty = ((U512::one() << 256) - 1) / self.threshold;
                if difficulty > U512::from(u64::MAX) {
                    u64::MAX
                } else {
                    difficulty.low_u64()
                }
            }
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.encoding {
            TargetEncoding::Compact(value) => write!(f, "{}", hex::encode(value.to_le_bytes())),
            TargetEncoding::Full(bytes) => write!(f, "{}", hex::encode(bytes)),
        }
    }
}

/// Computes `floor(2^256 / difficulty)` exactly
fn threshold_for_difficulty(difficulty: u64) -> U512 {
    (U512::one() << 256) / U512::from(difficulty.max(1))
}

/// Decides whether a digest satisfies a target
///
/// # Arguments
/// * `digest` - 32-byte hash output, little-endian as produced by the hasher
/// * `target` - Canonicalized pool target
pub fn meets_target(digest: &[u8; 32], target: &Target) -> bool {
    U512::from(U256::from_little_endian(digest)) < target.threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_compact_target_expands_to_floor_division() {
        let target = Target::from_hex("f33c0000").unwrap();

        assert_eq!(target.difficulty(), 275_265);
        assert_eq!(
            target.expand_to_full(),
            hex!("d600bb8c2762fb638e6ea4daa807d4ee1fe0612716332d67e3dcf906f33c0000"),
            "Threshold must be floor(2^256 / 275265) in little-endian"
        );
    }

    #[test]
    fn test_compact_and_full_forms_agree() {
        let digests = [
            [0u8; 32],
            [0xffu8; 32],
            hex!("d500bb8c2762fb638e6ea4daa807d4ee1fe0612716332d67e3dcf906f33c0000"),
            hex!("d600bb8c2762fb638e6ea4daa807d4ee1fe0612716332d67e3dcf906f33c0000"),
            hex!("d700bb8c2762fb638e6ea4daa807d4ee1fe0612716332d67e3dcf906f33c0000"),
            hex!("0000000000000000000000000000000000000000000000000000000000010000"),
            hex!("ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff0000"),
            hex!("1e224f25c9a7b7e0d3d7b4d7529a7a3d7b4d7529a7a3d79b6c2f5283fa4ace34"),
        ];

        // Difficulty 1 has no exact 32-byte form, see below
        for compact in ["f33c0000", "ffffff7f", "01000000", "10270000", "ffff0000"] {
            let compact_target = Target::from_hex(compact).unwrap();
            let full_target = Target::full(compact_target.expand_to_full());

            for digest in &digests {
                assert_eq!(
                    meets_target(digest, &compact_target),
                    meets_target(digest, &full_target),
                    "Compact {} and its full expansion disagree on {}",
                    compact,
                    hex::encode(digest)
                );
            }
        }
    }

    #[test]
    fn test_threshold_is_strict() {
        let target = Target::from_hex("f33c0000").unwrap();
        let at_threshold = target.expand_to_full();
        let mut below = at_threshold;
        below[0] -= 1;

        assert!(!meets_target(&at_threshold, &target), "digest == threshold must fail");
        assert!(meets_target(&below, &target), "digest == threshold - 1 must pass");
    }

    #[test]
    fn test_digest_is_read_little_endian() {
        let target = Target::from_hex("f33c0000").unwrap();

        // Small value stored in the low-order (first) byte qualifies
        let mut low = [0u8; 32];
        low[0] = 0xff;
        assert!(meets_target(&low, &target));

        // The same byte in the most significant position does not
        let mut high = [0u8; 32];
        high[31] = 0xff;
        assert!(!meets_target(&high, &target));
    }

    #[test]
    fn test_padded_compact_form_is_not_used() {
        // Right-padding "f33c0000" with 'f' would accept anything whose reversed hex sorts below
        // "f33c0000ffff...". This digest sorts below that string but is far above the threshold.
        let target = Target::from_hex("f33c0000").unwrap();
        let digest = hex!("00000000000000000000000000000000000000000000000000000000003cf300");

        assert!(!meets_target(&digest, &target));
    }

    #[test]
    fn test_difficulty_one_accepts_every_digest() {
        let target = Target::from_hex("ffffffff").unwrap();

        assert_eq!(target.difficulty(), 1);
        assert_eq!(target.threshold(), U512::one() << 256);
        assert!(meets_target(&[0u8; 32], &target));
        assert!(meets_target(&[0xffu8; 32], &target), "2^256 - 1 < 2^256");

        // The saturated full expansion is the only place the two forms differ
        let expanded = Target::full(target.expand_to_full());
        assert_eq!(target.expand_to_full(), [0xffu8; 32]);
        assert!(!meets_target(&[0xffu8; 32], &expanded));
    }

    #[test]
    fn test_higher_difficulty_gives_smaller_threshold() {
        let easy = Target::from_hex("ffff0000").unwrap();
        let hard = Target::from_hex("f33c0000").unwrap();

        assert!(hard.difficulty() > easy.difficulty());
        assert!(hard.threshold() < easy.threshold());
    }

    #[test]
    fn test_full_target_round_trips_to_hex() {
        let wire = "00000000ffffffffffffffffffffffffffffffffffffffffffffffffffffffff";
        let target = Target::from_hex(wire).unwrap();

        assert_eq!(target.to_string(), wire);
        assert_eq!(target.expand_to_full().to_vec(), hex::decode(wire).unwrap());
    }

    #[test]
    fn test_zero_full_target_rejects_everything() {
        let target = Target::full([0u8; 32]);

        assert_eq!(target.difficulty(), u64::MAX);
        assert!(!meets_target(&[0u8; 32], &target));
    }

    #[test]
    fn test_rejects_malformed_targets() {
        assert!(matches!(Target::from_hex("00000000"), Err(MinerError::InvalidTarget(_))));
        assert!(matches!(Target::from_hex("f33c"), Err(MinerError::InvalidTarget(_))));
        assert!(matches!(Target::from_hex("zz3c0000"), Err(MinerError::InputError(_))));
    }
}
