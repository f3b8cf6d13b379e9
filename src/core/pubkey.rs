//! 32-byte account addresses and program-derived address derivation.

use std::fmt;
use std::str::FromStr;

use curve25519_dalek::edwards::CompressedEdwardsY;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{AssetError, Result};

/// Size of an address in bytes.
pub const PUBKEY_BYTES: usize = 32;

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";
const MAX_SEED_LEN: usize = 32;

/// Seed prefix of a governance's native treasury.
pub const NATIVE_TREASURY_SEED: &[u8] = b"native-treasury";

/// An on-chain account address.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pubkey([u8; PUBKEY_BYTES]);

impl Pubkey {
    #[must_use]
    pub const fn new_from_array(bytes: [u8; PUBKEY_BYTES]) -> Self {
        Self(bytes)
    }

    /// Build from a slice that must be exactly 32 bytes long.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; PUBKEY_BYTES] = bytes
            .try_into()
            .map_err(|_| AssetError::InvalidPubkey(format!("{} bytes", bytes.len())))?;
        Ok(Self(array))
    }

    #[must_use]
    pub const fn to_bytes(self) -> [u8; PUBKEY_BYTES] {
        self.0
    }

    #[must_use]
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    /// Whether the address is a valid ed25519 point (wallets) rather than a PDA.
    #[must_use]
    pub fn is_on_curve(&self) -> bool {
        CompressedEdwardsY(self.0).decompress().is_some()
    }

    /// Hash seeds with a program id into a candidate address.
    ///
    /// Returns `None` when the hash lands on the curve.
    pub fn create_program_address(seeds: &[&[u8]], program_id: &Self) -> Result<Option<Self>> {
        if let Some(seed) = seeds.iter().find(|s| s.len() > MAX_SEED_LEN) {
            return Err(AssetError::InvalidPubkey(format!(
                "seed of {} bytes exceeds {MAX_SEED_LEN}",
                seed.len()
            )));
        }
        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update(seed);
        }
        hasher.update(program_id.0);
        hasher.update(PDA_MARKER);
        let candidate = Self(hasher.finalize().into());
        Ok((!candidate.is_on_curve()).then_some(candidate))
    }

    /// Find the first off-curve address for `seeds`, searching bump seeds from 255 down.
    pub fn find_program_address(seeds: &[&[u8]], program_id: &Self) -> Result<(Self, u8)> {
        for bump in (0..=u8::MAX).rev() {
            let bump_seed = [bump];
            let mut with_bump: Vec<&[u8]> = seeds.to_vec();
            with_bump.push(&bump_seed);
            if let Some(address) = Self::create_program_address(&with_bump, program_id)? {
                return Ok((address, bump));
            }
        }
        Err(AssetError::InvalidPubkey(
            "no viable bump seed for program address".to_string(),
        ))
    }
}

/// Address holding a governance's native balance.
pub fn native_treasury_address(program_id: &Pubkey, governance: &Pubkey) -> Result<Pubkey> {
    let seeds: [&[u8]; 2] = [NATIVE_TREASURY_SEED, governance.as_ref()];
    Pubkey::find_program_address(&seeds, program_id).map(|(address, _)| address)
}

impl AsRef<[u8]> for Pubkey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Pubkey {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let bytes = bs58::decode(trimmed)
            .into_vec()
            .map_err(|_| AssetError::InvalidPubkey(trimmed.to_string()))?;
        Self::try_from_slice(&bytes).map_err(|_| AssetError::InvalidPubkey(trimmed.to_string()))
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", self.to_base58())
    }
}

impl Serialize for Pubkey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for Pubkey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Well-known program ids.
pub mod programs {
    pub const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
    pub const STAKE_PROGRAM: &str = "Stake11111111111111111111111111111111111111";
    pub const UPGRADEABLE_LOADER: &str = "BPFLoaderUpgradeab1e11111111111111111111111";
    pub const GOVERNANCE_PROGRAM: &str = "GovER5Lthms3bLBqWub97yVrMmEogzX7xNjdXpPPCVZw";
}

#[cfg(test)]
mod tests {
    use super::*;

    const WSOL: &str = "So11111111111111111111111111111111111111112";

    #[test]
    fn base58_round_trips_known_mint() {
        let key: Pubkey = WSOL.parse().unwrap();
        assert_eq!(key.to_string(), WSOL);
        assert_eq!(key.to_bytes()[0], 0x06);
    }

    #[test]
    fn rejects_wrong_length_and_alphabet() {
        assert!("abc".parse::<Pubkey>().is_err());
        assert!("0OIl".parse::<Pubkey>().is_err());
        assert!(Pubkey::try_from_slice(&[1u8; 31]).is_err());
    }

    #[test]
    fn serde_uses_base58_text() {
        let key: Pubkey = WSOL.parse().unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{WSOL}\""));
        let back: Pubkey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn native_treasury_is_off_curve_and_deterministic() {
        let program: Pubkey = programs::GOVERNANCE_PROGRAM.parse().unwrap();
        let governance = Pubkey::new_from_array([7u8; 32]);
        let first = native_treasury_address(&program, &governance).unwrap();
        let second = native_treasury_address(&program, &governance).unwrap();
        assert_eq!(first, second);
        assert!(!first.is_on_curve());
        assert_ne!(first, governance);
    }

    #[test]
    fn native_treasury_matches_known_vectors() {
        let program: Pubkey = programs::GOVERNANCE_PROGRAM.parse().unwrap();
        let cases = [
            ([7u8; 32], "2dHAAeTEBrLdxyY47c1yQDzGNP8gJCyvX2K1vrtEE6nH", 255),
            // First candidates land on the curve, so the search steps down.
            ([1u8; 32], "795aYPvAQGYhafBrc3pDShQNF5nba1DTZJWGHRK2ryxL", 253),
        ];
        for (bytes, expected, expected_bump) in cases {
            let governance = Pubkey::new_from_array(bytes);
            let seeds: [&[u8]; 2] = [NATIVE_TREASURY_SEED, governance.as_ref()];
            let (address, bump) = Pubkey::find_program_address(&seeds, &program).unwrap();
            assert_eq!(address.to_string(), expected, "governance {governance}");
            assert_eq!(bump, expected_bump);
            assert_eq!(native_treasury_address(&program, &governance).unwrap(), address);
        }
        assert_eq!(
            Pubkey::new_from_array([1u8; 32]).to_string(),
            "4vJ9JU1bJJE96FWSJKvHsmmFADCg4gpZQff4P3bkLKi"
        );
    }

    #[test]
    fn native_treasury_differs_per_governance() {
        let program: Pubkey = programs::GOVERNANCE_PROGRAM.parse().unwrap();
        let a = native_treasury_address(&program, &Pubkey::new_from_array([1u8; 32])).unwrap();
        let b = native_treasury_address(&program, &Pubkey::new_from_array([2u8; 32])).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn found_bump_reproduces_address() {
        let program: Pubkey = programs::GOVERNANCE_PROGRAM.parse().unwrap();
        let governance = Pubkey::new_from_array([9u8; 32]);
        let seeds: [&[u8]; 2] = [NATIVE_TREASURY_SEED, governance.as_ref()];
        let (address, bump) = Pubkey::find_program_address(&seeds, &program).unwrap();
        let bump_seed = [bump];
        let recreated = Pubkey::create_program_address(
            &[NATIVE_TREASURY_SEED, governance.as_ref(), &bump_seed],
            &program,
        )
        .unwrap();
        assert_eq!(recreated, Some(address));
    }

    #[test]
    fn oversized_seed_is_rejected() {
        let program = Pubkey::new_from_array([3u8; 32]);
        let long = [0u8; 33];
        assert!(Pubkey::create_program_address(&[&long], &program).is_err());
    }
}
