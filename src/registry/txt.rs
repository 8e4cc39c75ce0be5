// SPDX-License-Identifier: MIT

//! Current-version (`version=1`) TXT ownership record encoding and
//! decoding, and the base36 owner-hash used to disambiguate co-owned
//! names inside a TXT record's own name.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::constants::{OWNER_HASH_LEN, TXT_HERITAGE, TXT_OWNERSHIP_VERSION};
use crate::errors::RegistryError;

const BASE36_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Size of the base36 output space (36^[`OWNER_HASH_LEN`]), the modulus
/// the owner-hash mix reduces into.
const HASH_MODULUS: u128 = 2_821_109_907_456;

/// Multiplicative-congruential finishing constants for the owner-hash
/// mix. The multiplier is coprime with `HASH_MODULUS`, so the mix is a
/// bijection over it and doesn't collapse the digest's distribution.
const HASH_MIX_MULTIPLIER: u128 = 2_625_729_712_811;
const HASH_MIX_INCREMENT: u128 = 2_088_272_882_497;

/// Base36 hash of an owner ID, fixed at [`OWNER_HASH_LEN`] characters,
/// embedded in ownership TXT record names to disambiguate co-owners of
/// the same endpoint. This is a wire contract: any other external-dns-
/// compatible agent reading the same zone must derive the same name for
/// the same owner ID, so the digest slice and mix below are fixed
/// points, not swappable implementation details.
#[must_use]
pub fn base36_hash8(owner_id: &str) -> String {
    let digest = Sha256::digest(owner_id.as_bytes());
    let mut folded: u128 = 0;
    for byte in &digest[3..11] {
        folded = (folded << 8) | u128::from(*byte);
    }
    folded %= HASH_MODULUS;

    let mixed = (folded * HASH_MIX_MULTIPLIER + HASH_MIX_INCREMENT) % HASH_MODULUS;
    let mut value = mixed as u64;

    let mut chars = [b'0'; OWNER_HASH_LEN];
    for slot in chars.iter_mut().rev() {
        *slot = BASE36_ALPHABET[(value % 36) as usize];
        value /= 36;
    }
    String::from_utf8(chars.to_vec()).expect("base36 alphabet is ASCII")
}

/// Parsed ownership metadata recovered from a current-version TXT target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnershipMetadata {
    pub owner_id: String,
    pub version: String,
    pub labels: BTreeMap<String, String>,
}

/// Parses a TXT target of the form
/// `heritage=external-dns,external-dns/owner=<id>,external-dns/version=<v>[,external-dns/<k>=<v>...]`.
pub fn parse_ownership_target(name: &str, target: &str) -> Result<OwnershipMetadata, RegistryError> {
    let stripped = target.trim_matches('"');
    let mut parts = stripped.split(',');

    let heritage = parts.next().ok_or_else(|| RegistryError::Unparsable {
        name: name.to_string(),
        reason: "empty target".to_string(),
    })?;
    if heritage != TXT_HERITAGE {
        return Err(RegistryError::Unparsable {
            name: name.to_string(),
            reason: format!("missing or unexpected heritage marker '{heritage}'"),
        });
    }

    let mut owner_id = None;
    let mut version = None;
    let mut labels = BTreeMap::new();

    for part in parts {
        let Some((key, value)) = part.split_once('=') else {
            return Err(RegistryError::Unparsable {
                name: name.to_string(),
                reason: format!("malformed key=value pair '{part}'"),
            });
        };
        let Some(key) = key.strip_prefix("external-dns/") else {
            return Err(RegistryError::Unparsable {
                name: name.to_string(),
                reason: format!("unrecognized key '{key}'"),
            });
        };
        match key {
            "owner" => owner_id = Some(value.to_string()),
            "version" => version = Some(value.to_string()),
            other => {
                labels.insert(other.to_string(), value.to_string());
            }
        }
    }

    let owner_id = owner_id.ok_or_else(|| RegistryError::Contradictory {
        name: name.to_string(),
        reason: "missing owner".to_string(),
    })?;

    Ok(OwnershipMetadata {
        owner_id,
        version: version.unwrap_or_else(|| "legacy".to_string()),
        labels,
    })
}

/// Builds a current-version ownership TXT target string.
#[must_use]
pub fn build_ownership_target(owner_id: &str, labels: &BTreeMap<String, String>) -> String {
    let mut target = format!(
        "{TXT_HERITAGE},external-dns/owner={owner_id},external-dns/version={TXT_OWNERSHIP_VERSION}"
    );
    for (key, value) in labels {
        target.push_str(&format!(",external-dns/{key}={value}"));
    }
    target
}

/// Builds the ownership TXT record name: `<prefix><hash8>-<lowercaseType>-<dnsName>`,
/// with a leading wildcard label replaced by `wildcard_replacement` if given.
#[must_use]
pub fn build_ownership_name(
    prefix: Option<&str>,
    suffix: Option<&str>,
    owner_id: &str,
    record_type_lowercase: &str,
    dns_name: &str,
    wildcard_replacement: Option<&str>,
) -> String {
    let hash = base36_hash8(owner_id);
    let dns_name = match (dns_name.strip_prefix("*."), wildcard_replacement) {
        (Some(rest), Some(replacement)) => format!("{replacement}.{rest}"),
        _ => dns_name.to_string(),
    };
    let core = format!("{hash}-{record_type_lowercase}-{dns_name}");
    match (prefix, suffix) {
        (Some(p), _) => format!("{p}{core}"),
        (None, Some(s)) => format!("{core}{s}"),
        (None, None) => core,
    }
}
