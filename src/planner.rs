// SPDX-License-Identifier: MIT

//! Pure, synchronous change-set computation: no I/O, so the drift
//! computation can be unit-tested directly without standing up a
//! provider or a cluster.

use std::collections::{BTreeMap, BTreeSet};

use crate::endpoint::{Endpoint, EndpointKey, RecordType};
use crate::provider::ChangeSet;

/// Computes Create/Update/Delete batches for one operator instance,
/// honoring multi-owner semantics.
pub struct Planner {
    owner_id: String,
    authoritative_types: BTreeSet<RecordType>,
}

fn owners_of(endpoint: &Endpoint) -> BTreeSet<String> {
    endpoint
        .labels
        .get("owner")
        .map(|v| v.split(',').filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

fn with_owner_removed(mut endpoint: Endpoint, owner_id: &str) -> Endpoint {
    let remaining: Vec<&str> = endpoint
        .labels
        .get("owner")
        .map(|v| v.split(',').filter(|o| *o != owner_id && !o.is_empty()).collect())
        .unwrap_or_default();
    endpoint.labels.insert("owner".to_string(), remaining.join(","));
    endpoint
}

/// Compares the fields the planner treats as data-equal: ttl, targets as
/// a sorted multiset, and provider-specific keys (labels are
/// owner-merged and therefore excluded from the data-equality check).
fn data_equal(a: &Endpoint, b: &Endpoint) -> bool {
    if a.ttl != b.ttl {
        return false;
    }
    let mut a_targets = a.targets.clone();
    let mut b_targets = b.targets.clone();
    a_targets.sort();
    b_targets.sort();
    if a_targets != b_targets {
        return false;
    }
    a.provider_specific == b.provider_specific
}

impl Planner {
    #[must_use]
    pub fn new(owner_id: impl Into<String>, authoritative_types: BTreeSet<RecordType>) -> Self {
        Self {
            owner_id: owner_id.into(),
            authoritative_types,
        }
    }

    /// Deduplicates a desired-endpoint list by identity key, keeping only
    /// the last logical entry for any repeated key (duplicates within a
    /// single batch are forbidden; the planner coalesces them).
    fn coalesce(desired: Vec<Endpoint>) -> BTreeMap<EndpointKey, Endpoint> {
        let mut by_key = BTreeMap::new();
        for endpoint in desired {
            by_key.insert(endpoint.key(), endpoint);
        }
        by_key
    }

    /// Computes the change set transforming `current` into `desired`,
    /// restricted to the record types this instance is authoritative for.
    #[must_use]
    pub fn diff(&self, desired: Vec<Endpoint>, current: Vec<Endpoint>) -> ChangeSet {
        let desired_by_key = Self::coalesce(
            desired
                .into_iter()
                .filter(|e| self.authoritative_types.contains(&e.record_type))
                .collect(),
        );
        let current_by_key: BTreeMap<EndpointKey, Endpoint> = current
            .into_iter()
            .filter(|e| self.authoritative_types.contains(&e.record_type))
            .map(|e| (e.key(), e))
            .collect();

        let mut changes = ChangeSet::default();

        for (key, desired_endpoint) in &desired_by_key {
            match current_by_key.get(key) {
                None => changes.creates.push(desired_endpoint.clone()),
                Some(current_endpoint) => {
                    if !data_equal(desired_endpoint, current_endpoint) {
                        changes.update_olds.push(current_endpoint.clone());
                        changes.update_news.push(desired_endpoint.clone());
                    } else if !owners_of(current_endpoint).contains(&self.owner_id) {
                        // Same data, new co-owner: a no-op data update that
                        // still carries a fresh owner label so the registry
                        // write path can add this owner's TXT without
                        // touching the underlying data record.
                        let mut joined = current_endpoint.clone();
                        let mut owners = owners_of(current_endpoint);
                        owners.insert(self.owner_id.clone());
                        let joined_owner = owners.into_iter().collect::<Vec<_>>().join(",");
                        joined.labels.insert("owner".to_string(), joined_owner);
                        changes.update_olds.push(current_endpoint.clone());
                        changes.update_news.push(joined);
                    }
                }
            }
        }

        for (key, current_endpoint) in &current_by_key {
            if desired_by_key.contains_key(key) {
                continue;
            }
            let owners = owners_of(current_endpoint);
            if !owners.contains(&self.owner_id) {
                // We don't own this endpoint; its absence from the desired
                // set is not our concern.
                continue;
            }
            if owners.len() > 1 {
                // Co-owned: downgrade delete to "remove my TXT only".
                changes.update_olds.push(current_endpoint.clone());
                changes
                    .update_news
                    .push(with_owner_removed(current_endpoint.clone(), &self.owner_id));
            } else {
                changes.deletes.push(current_endpoint.clone());
            }
        }

        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn authoritative() -> BTreeSet<RecordType> {
        [RecordType::Cname, RecordType::A].into_iter().collect()
    }

    fn endpoint(name: &str, target: &str, owner: &str) -> Endpoint {
        let mut labels = Map::new();
        labels.insert("owner".to_string(), owner.to_string());
        Endpoint {
            dns_name: name.to_string(),
            record_type: RecordType::Cname,
            set_identifier: None,
            ttl: 300,
            targets: vec![target.to_string()],
            labels,
            provider_specific: Map::new(),
        }
    }

    #[test]
    fn create_unique_record() {
        let planner = Planner::new("ownerA", authoritative());
        let desired = vec![endpoint("foo.example.org", "lb.example.org", "")];
        let changes = planner.diff(desired, vec![]);
        assert_eq!(changes.creates.len(), 1);
        assert!(changes.deletes.is_empty());
    }

    #[test]
    fn co_owner_join_does_not_rewrite_data() {
        let planner = Planner::new("ownerB", authoritative());
        let current = vec![endpoint("foo.example.org", "lb.example.org", "ownerA")];
        let desired = vec![endpoint("foo.example.org", "lb.example.org", "ownerB")];
        let changes = planner.diff(desired, current);
        assert!(changes.creates.is_empty());
        assert_eq!(changes.update_news.len(), 1);
        let owners: BTreeSet<String> = changes.update_news[0]
            .labels
            .get("owner")
            .unwrap()
            .split(',')
            .map(str::to_string)
            .collect();
        assert!(owners.contains("ownerA"));
        assert!(owners.contains("ownerB"));
        assert_eq!(changes.update_news[0].targets, vec!["lb.example.org".to_string()]);
    }

    #[test]
    fn co_owner_leave_downgrades_delete_to_update() {
        let planner = Planner::new("ownerA", authoritative());
        let mut current_endpoint = endpoint("foo.example.org", "lb.example.org", "");
        current_endpoint
            .labels
            .insert("owner".to_string(), "ownerA,ownerB".to_string());
        let changes = planner.diff(vec![], vec![current_endpoint]);
        assert!(changes.deletes.is_empty());
        assert_eq!(changes.update_news.len(), 1);
        assert_eq!(changes.update_news[0].labels.get("owner").unwrap(), "ownerB");
    }

    #[test]
    fn sole_owner_leave_is_a_real_delete() {
        let planner = Planner::new("ownerA", authoritative());
        let current = vec![endpoint("foo.example.org", "lb.example.org", "ownerA")];
        let changes = planner.diff(vec![], current);
        assert_eq!(changes.deletes.len(), 1);
        assert!(changes.update_news.is_empty());
    }

    #[test]
    fn non_authoritative_type_is_ignored() {
        let planner = Planner::new("ownerA", [RecordType::A].into_iter().collect());
        let desired = vec![endpoint("foo.example.org", "lb.example.org", "")];
        let changes = planner.diff(desired, vec![]);
        assert!(changes.creates.is_empty());
    }

    #[test]
    fn duplicate_desired_keys_are_coalesced() {
        let planner = Planner::new("ownerA", authoritative());
        let desired = vec![
            endpoint("foo.example.org", "old.example.org", ""),
            endpoint("foo.example.org", "new.example.org", ""),
        ];
        let changes = planner.diff(desired, vec![]);
        assert_eq!(changes.creates.len(), 1);
        assert_eq!(changes.creates[0].targets, vec!["new.example.org".to_string()]);
    }
}
