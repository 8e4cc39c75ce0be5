// SPDX-License-Identifier: MIT

//! Legacy TXT ownership format decoding. At least three historical
//! encodings exist besides the current `version=1` form; the registry
//! reads all of them but writes only the current form. The `version`
//! label selects a decoder — absence of the label means legacy, and per
//! the design notes the `version` label must be trusted over structural
//! inference, since legacy owner-ID prefixes can collide with record-type
//! strings.

use crate::endpoint::RecordType;
use crate::errors::RegistryError;

/// Endpoint identity recovered from a legacy-format TXT record name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveredIdentity {
    pub dns_name: String,
    pub record_type: Option<RecordType>,
}

/// Historical naming schemes, oldest first. The table is consulted in
/// order; the first scheme whose shape matches the name wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegacyScheme {
    /// `<prefix><name>` with no type or owner-hash segment.
    AffixOnly,
    /// `<prefix><lowercaseType>-<name>`.
    AffixAndType,
    /// `<prefix><ownerHash8>-<lowercaseType>-<name>` without a `version` label.
    AffixOwnerHashAndType,
}

/// Strips a configured prefix/suffix and attempts each legacy scheme in
/// turn, returning the first that structurally matches.
pub fn recover_legacy_identity(
    name: &str,
    prefix: Option<&str>,
    suffix: Option<&str>,
) -> Result<RecoveredIdentity, RegistryError> {
    let mut stripped = name;
    if let Some(p) = prefix {
        stripped = stripped.strip_prefix(p).unwrap_or(stripped);
    }
    if let Some(s) = suffix {
        stripped = stripped.strip_suffix(s).unwrap_or(stripped);
    }

    // AffixOwnerHashAndType: "<8charhash>-<type>-<name>"
    if let Some((hash, rest)) = stripped.split_once('-') {
        if hash.len() == 8 && hash.chars().all(|c| c.is_ascii_alphanumeric()) {
            if let Some((type_str, dns_name)) = rest.split_once('-') {
                if let Ok(record_type) = type_str.parse::<RecordType>() {
                    return Ok(RecoveredIdentity {
                        dns_name: dns_name.to_string(),
                        record_type: Some(record_type),
                    });
                }
            }
        }
    }

    // AffixAndType: "<type>-<name>"
    if let Some((type_str, dns_name)) = stripped.split_once('-') {
        if let Ok(record_type) = type_str.parse::<RecordType>() {
            return Ok(RecoveredIdentity {
                dns_name: dns_name.to_string(),
                record_type: Some(record_type),
            });
        }
    }

    // AffixOnly: no type or hash segment recoverable; type must come from
    // the sibling data record during read-path correlation.
    if stripped.is_empty() {
        return Err(RegistryError::Unparsable {
            name: name.to_string(),
            reason: "empty name after affix stripping".to_string(),
        });
    }

    Ok(RecoveredIdentity {
        dns_name: stripped.to_string(),
        record_type: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_affix_owner_hash_and_type_scheme() {
        let recovered = recover_legacy_identity("txt-2tqs20a7-cname-foo.example.org", Some("txt-"), None).unwrap();
        assert_eq!(recovered.dns_name, "foo.example.org");
        assert_eq!(recovered.record_type, Some(RecordType::Cname));
    }

    #[test]
    fn recovers_affix_and_type_scheme() {
        let recovered = recover_legacy_identity("txt-cname-foo.example.org", Some("txt-"), None).unwrap();
        assert_eq!(recovered.dns_name, "foo.example.org");
        assert_eq!(recovered.record_type, Some(RecordType::Cname));
    }

    #[test]
    fn falls_back_to_affix_only_scheme() {
        let recovered = recover_legacy_identity("txt-foo.example.org", Some("txt-"), None).unwrap();
        assert_eq!(recovered.dns_name, "foo.example.org");
        assert_eq!(recovered.record_type, None);
    }
}
