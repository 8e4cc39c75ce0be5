// SPDX-License-Identifier: MIT

//! The TXT-backed ownership registry: bidirectional translation between
//! provider-visible endpoints and operator-visible endpoints carrying
//! owner-merged labels. Encode/decode logic lives in [`txt`] and
//! [`legacy`]; optional target encryption lives in [`encryption`].

pub mod encryption;
pub mod legacy;
pub mod txt;

use std::collections::{BTreeMap, BTreeSet};

use crate::constants::{ENCRYPTION_NONCE_BYTES, MERGE_KEYS};
use crate::endpoint::{Endpoint, EndpointKey, RecordType};
use crate::errors::RegistryError;
use crate::provider::ChangeSet;
use encryption::TxtEncryption;

/// Registry configuration: prefix/suffix are mutually exclusive, owner ID
/// must be non-empty, an encryption key if supplied must be exactly 32
/// bytes.
#[derive(Clone, Debug, Default)]
pub struct RegistryConfig {
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub owner_id: String,
    pub wildcard_replacement: Option<String>,
    pub encryption_key: Option<[u8; 32]>,
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.prefix.is_some() && self.suffix.is_some() {
            return Err(RegistryError::PrefixAndSuffixConflict);
        }
        if self.owner_id.is_empty() {
            return Err(RegistryError::EmptyOwnerId);
        }
        Ok(())
    }
}

/// One owner's claim on a host, recovered from a TXT ownership record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnerClaim {
    pub owner_id: String,
    pub group: Option<String>,
    pub labels: BTreeMap<String, String>,
}

/// The host-indexed projection of all TXT ownership records in a zone:
/// grouped owners (for traffic-management group semantics) and ungrouped
/// owners, each carrying their merged labels. Built lazily per host by
/// the Delegation engine, which is the sole consumer of this query
/// surface.
#[derive(Clone, Debug, Default)]
pub struct RegistryMap {
    pub groups: BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>,
    pub ungrouped_owners: BTreeMap<String, BTreeMap<String, String>>,
}

impl RegistryMap {
    #[must_use]
    pub fn from_claims(claims: &[OwnerClaim]) -> Self {
        let mut map = Self::default();
        for claim in claims {
            match &claim.group {
                Some(group) => {
                    map.groups
                        .entry(group.clone())
                        .or_default()
                        .insert(claim.owner_id.clone(), claim.labels.clone());
                }
                None => {
                    map.ungrouped_owners
                        .insert(claim.owner_id.clone(), claim.labels.clone());
                }
            }
        }
        map
    }

    #[must_use]
    pub fn group_ids(&self) -> Vec<&String> {
        self.groups.keys().collect()
    }

    #[must_use]
    pub fn ungrouped_owner_ids(&self) -> Vec<&String> {
        self.ungrouped_owners.keys().collect()
    }

    /// Owners outside `group`, for the "other-group targets" query the
    /// Delegation engine uses to detect cross-group conflicts.
    #[must_use]
    pub fn owners_outside_group(&self, group: &str) -> BTreeSet<String> {
        let mut owners: BTreeSet<String> = self.ungrouped_owners.keys().cloned().collect();
        for (g, members) in &self.groups {
            if g != group {
                owners.extend(members.keys().cloned());
            }
        }
        owners
    }
}

/// TXT metadata recovered for one endpoint identity, indexed by owner.
type OwnerMetadataByKey = BTreeMap<EndpointKey, Vec<(String, BTreeMap<String, String>)>>;

/// Bidirectional translator between provider state and operator-visible
/// endpoints.
pub struct Registry {
    config: RegistryConfig,
    encryption: Option<TxtEncryption>,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        config.validate()?;
        let encryption = match &config.encryption_key {
            Some(key) => Some(TxtEncryption::new(key)?),
            None => None,
        };
        Ok(Self { config, encryption })
    }

    fn ownership_name(&self, owner_id: &str, record_type: RecordType, dns_name: &str) -> String {
        txt::build_ownership_name(
            self.config.prefix.as_deref(),
            self.config.suffix.as_deref(),
            owner_id,
            record_type.as_lowercase(),
            dns_name,
            self.config.wildcard_replacement.as_deref(),
        )
    }

    fn decrypt_if_needed(&self, target: &str) -> Result<String, RegistryError> {
        match &self.encryption {
            Some(enc) => enc.decrypt(target),
            None => Ok(target.to_string()),
        }
    }

    /// Whether a TXT endpoint's single target is a candidate ownership
    /// record (step 2 of the read path).
    fn is_ownership_candidate(&self, endpoint: &Endpoint) -> bool {
        endpoint.record_type == RecordType::Txt && endpoint.targets.len() == 1
    }

    /// Recovers `(endpointKey, ownerID, labels)` from one candidate TXT
    /// endpoint. `recover_legacy_identity`'s scheme table is tried oldest
    /// last, newest first, and the current `<hash8>-<type>-<name>` naming
    /// scheme is itself the newest entry in that table, so both
    /// current-version and legacy TXTs resolve their endpoint identity
    /// through the same name-structure parse; only the target string's
    /// `version` field distinguishes them for [`Self::read_path`]'s
    /// migration flag.
    fn decode_ownership_endpoint(
        &self,
        txt_endpoint: &Endpoint,
    ) -> Result<(EndpointKey, String, BTreeMap<String, String>), RegistryError> {
        let raw_target = &txt_endpoint.targets[0];
        let plaintext = self.decrypt_if_needed(raw_target)?;
        let metadata = txt::parse_ownership_target(&txt_endpoint.dns_name, &plaintext)?;

        let recovered = legacy::recover_legacy_identity(
            &txt_endpoint.dns_name,
            self.config.prefix.as_deref(),
            self.config.suffix.as_deref(),
        )?;
        let record_type = recovered.record_type.ok_or_else(|| RegistryError::Unparsable {
            name: txt_endpoint.dns_name.clone(),
            reason: "TXT name missing a record-type segment; cannot disambiguate without one".to_string(),
        })?;
        let key = EndpointKey::new(recovered.dns_name, record_type, txt_endpoint.set_identifier.clone());
        Ok((key, metadata.owner_id, metadata.labels))
    }

    /// Merges per-owner labels for one endpoint per the multi-owner
    /// merge-key rule: the `owner` key and the configured merge keys
    /// aggregate across all known owners; every other key reflects only
    /// the instance's own owner view.
    fn merge_labels(&self, owners: &[(String, BTreeMap<String, String>)]) -> BTreeMap<String, String> {
        let mut merged = BTreeMap::new();

        let mut owner_ids: Vec<String> = owners.iter().map(|(o, _)| o.clone()).collect();
        owner_ids.sort();
        owner_ids.dedup();
        merged.insert("owner".to_string(), owner_ids.join(","));

        for key in MERGE_KEYS.iter().filter(|k| **k != "owner") {
            let mut values: Vec<String> = owners
                .iter()
                .filter_map(|(_, labels)| labels.get(*key).cloned())
                .collect();
            values.sort();
            values.dedup();
            if !values.is_empty() {
                merged.insert((*key).to_string(), values.join(","));
            }
        }

        if let Some((_, labels)) = owners.iter().find(|(o, _)| o == &self.config.owner_id) {
            for (k, v) in labels {
                if !MERGE_KEYS.contains(&k.as_str()) {
                    merged.insert(k.clone(), v.clone());
                }
            }
        }
        merged
    }

    /// The Registry read path: partitions provider records into
    /// data and ownership TXTs, decodes ownership metadata, and attaches
    /// owner-merged labels onto each surviving data record. Unparsable or
    /// contradictory TXTs are logged and skipped; the data record survives
    /// ownerless rather than failing the whole read.
    pub fn read_path(&self, provider_records: Vec<Endpoint>) -> Vec<Endpoint> {
        let mut data_records = Vec::new();
        let mut ownership_by_key: OwnerMetadataByKey = BTreeMap::new();

        for record in provider_records {
            if self.is_ownership_candidate(&record) {
                match self.decode_ownership_endpoint(&record) {
                    Ok((key, owner_id, labels)) => {
                        ownership_by_key.entry(key).or_default().push((owner_id, labels));
                    }
                    Err(err) => {
                        tracing::warn!(name = %record.dns_name, error = %err, "ignoring unparsable ownership TXT");
                    }
                }
            } else {
                data_records.push(record);
            }
        }

        for record in &mut data_records {
            let key = record.key();
            if let Some(owners) = ownership_by_key.get(&key) {
                let merged = self.merge_labels(owners);
                let is_owned_by_us = owners.iter().any(|(o, _)| o == &self.config.owner_id);
                record.labels.extend(merged);
                if !is_owned_by_us {
                    continue;
                }
            } else if record
                .provider_specific
                .get("txt/legacy-owned")
                .is_some_and(|v| v == "true")
            {
                // Migration: an instance-owned record with no version-1 TXT
                // yet. Flag it so the write path rewrites the TXT.
                record
                    .provider_specific
                    .insert("txt/force-update".to_string(), "true".to_string());
            }
        }

        data_records
    }

    /// Synthesizes ownership TXT mutations for a planned data change set.
    /// `existing_txt_names` lets the caller route an already-present TXT
    /// into `update_news` rather than `creates`.
    ///
    /// An entry in `update_news` can mean either a co-owner joining (this
    /// instance's id is present in the merged `owner` label) or a co-owner
    /// leaving (the planner's downgrade path removed this instance's id but
    /// left the record for the remaining owners, see `planner::with_owner_removed`).
    /// Only the join case re-affirms this instance's own ownership TXT; the
    /// leave case must delete it instead, or the TXT would silently survive
    /// its owner's departure.
    pub fn synthesize_write_changes(
        &self,
        mut changes: ChangeSet,
        existing_txt_names: &BTreeSet<String>,
    ) -> Result<ChangeSet, RegistryError> {
        let mut txt_creates = Vec::new();
        let mut txt_update_news = Vec::new();
        let mut txt_deletes = Vec::new();

        for data_endpoint in &changes.creates {
            txt_creates.push(self.build_txt_endpoint(data_endpoint, existing_txt_names, &mut txt_update_news)?);
        }
        for data_endpoint in &changes.update_news {
            if self.still_claims_ownership(data_endpoint) {
                txt_update_news.push(self.build_txt_endpoint_for_update(data_endpoint)?);
            } else {
                txt_deletes.push(self.build_txt_delete(data_endpoint)?);
            }
        }
        for data_endpoint in &changes.deletes {
            txt_deletes.push(self.build_txt_delete(data_endpoint)?);
        }

        changes.creates.extend(txt_creates);
        changes.update_news.extend(txt_update_news);
        changes.deletes.extend(txt_deletes);
        Ok(changes)
    }

    /// Whether this instance's own owner id is still present in an updated
    /// data endpoint's merged `owner` label.
    fn still_claims_ownership(&self, data_endpoint: &Endpoint) -> bool {
        data_endpoint
            .labels
            .get("owner")
            .is_some_and(|owners| owners.split(',').any(|o| o == self.config.owner_id))
    }

    fn build_txt_endpoint(
        &self,
        data_endpoint: &Endpoint,
        existing_txt_names: &BTreeSet<String>,
        update_news: &mut Vec<Endpoint>,
    ) -> Result<Endpoint, RegistryError> {
        let txt_endpoint = self.make_ownership_endpoint(data_endpoint)?;
        if existing_txt_names.contains(&txt_endpoint.dns_name) {
            update_news.push(txt_endpoint.clone());
        }
        Ok(txt_endpoint)
    }

    fn build_txt_endpoint_for_update(&self, data_endpoint: &Endpoint) -> Result<Endpoint, RegistryError> {
        self.make_ownership_endpoint(data_endpoint)
    }

    fn build_txt_delete(&self, data_endpoint: &Endpoint) -> Result<Endpoint, RegistryError> {
        self.make_ownership_endpoint(data_endpoint)
    }

    fn make_ownership_endpoint(&self, data_endpoint: &Endpoint) -> Result<Endpoint, RegistryError> {
        let name = self.ownership_name(&self.config.owner_id, data_endpoint.record_type, &data_endpoint.dns_name);
        let relevant_labels: BTreeMap<String, String> = data_endpoint
            .labels
            .iter()
            .filter(|(k, _)| *k != "owner")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let target = txt::build_ownership_target(&self.config.owner_id, &relevant_labels);
        let target = match &self.encryption {
            Some(enc) => {
                let nonce = [0u8; ENCRYPTION_NONCE_BYTES];
                enc.encrypt(&target, &nonce)?
            }
            None => target,
        };

        Ok(Endpoint {
            dns_name: name,
            record_type: RecordType::Txt,
            set_identifier: data_endpoint.set_identifier.clone(),
            ttl: data_endpoint.ttl,
            targets: vec![target],
            labels: BTreeMap::new(),
            provider_specific: BTreeMap::new(),
        })
    }
}
