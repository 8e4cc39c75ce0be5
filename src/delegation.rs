// SPDX-License-Identifier: MIT

//! Aggregation of per-cluster desired records into one authoritative
//! record per root host, in the same primary/secondary zone-transfer
//! shape a BIND9 deployment uses, generalized into "DesiredRecord
//! aggregation across clusters with the RegistryMap as the source of
//! truth for who-else-claims-this-host".

use std::collections::{BTreeMap, BTreeSet};

use crate::endpoint::{DesiredRecord, Endpoint, EndpointKey, RecordType};
use crate::errors::DelegationError;
use crate::registry::RegistryMap;

/// Process-wide configuration: whether this instance writes to the
/// provider (`Primary`) or only validates and mirrors status (`Secondary`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DelegationRole {
    Primary,
    Secondary,
}

/// The single record a primary publishes for a root host, aggregating
/// every delegated contribution.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthoritativeRecord {
    pub root_host: String,
    pub endpoints: Vec<Endpoint>,
    pub group: Option<String>,
    pub contributing_clusters: Vec<String>,
}

/// Per-cluster input to aggregation: the cluster's name (a failure
/// domain) and the `DesiredRecord`s it contributed for one root host.
pub struct ClusterContribution {
    pub cluster: String,
    pub records: Vec<DesiredRecord>,
    /// `false` when the cluster was unreachable this cycle; its
    /// contribution degrades rather than blocking the others.
    pub reachable: bool,
}

pub struct DelegationEngine {
    role: DelegationRole,
}

impl DelegationEngine {
    #[must_use]
    pub fn new(role: DelegationRole) -> Self {
        Self { role }
    }

    #[must_use]
    pub fn role(&self) -> DelegationRole {
        self.role
    }

    /// Aggregates every cluster's contribution for one root host into a
    /// single [`AuthoritativeRecord`], de-duplicating by identity key and
    /// unioning per-group targets. Unreachable clusters degrade their own
    /// contribution only.
    pub fn aggregate(
        &self,
        root_host: &str,
        contributions: &[ClusterContribution],
    ) -> Result<AuthoritativeRecord, DelegationError> {
        let mut endpoints_by_key: BTreeMap<EndpointKey, Endpoint> = BTreeMap::new();
        let mut contributing_clusters = Vec::new();
        let mut group: Option<String> = None;

        for contribution in contributions {
            if !contribution.reachable {
                continue;
            }
            contributing_clusters.push(contribution.cluster.clone());
            for record in &contribution.records {
                if group.is_none() {
                    group.clone_from(&record.group);
                }
                for endpoint in &record.endpoints {
                    endpoints_by_key
                        .entry(endpoint.key())
                        .and_modify(|existing| merge_targets(existing, endpoint))
                        .or_insert_with(|| endpoint.clone());
                }
            }
        }

        let endpoints: Vec<Endpoint> = endpoints_by_key.into_values().collect();
        self.validate_consistency(root_host, &endpoints)?;

        Ok(AuthoritativeRecord {
            root_host: root_host.to_string(),
            endpoints,
            group,
            contributing_clusters,
        })
    }

    /// Validates every CNAME chain terminates inside the declared
    /// endpoint set or at an external non-managed target, with no cycles
    /// and no dangling group references.
    pub fn validate_consistency(
        &self,
        _root_host: &str,
        endpoints: &[Endpoint],
    ) -> Result<(), DelegationError> {
        let names: BTreeSet<&str> = endpoints.iter().map(|e| e.dns_name.as_str()).collect();

        for endpoint in endpoints.iter().filter(|e| e.record_type == RecordType::Cname) {
            let mut visited = BTreeSet::new();
            let mut current = endpoint.dns_name.as_str();
            loop {
                if !visited.insert(current) {
                    return Err(DelegationError::CnameCycle {
                        dns_name: endpoint.dns_name.clone(),
                    });
                }
                let Some(target) = endpoints
                    .iter()
                    .find(|e| e.dns_name == current && e.record_type == RecordType::Cname)
                    .and_then(|e| e.targets.first())
                else {
                    break;
                };
                if !names.contains(target.as_str()) {
                    // Terminates at an external target; acceptable.
                    break;
                }
                current = target.as_str();
            }
        }
        Ok(())
    }

    /// Checks that every group referenced by a cluster's contributions has
    /// at least one member in the aggregated `RegistryMap` view.
    pub fn check_dangling_groups(
        &self,
        cluster: &str,
        group: &str,
        registry_map: &RegistryMap,
    ) -> Result<(), DelegationError> {
        if registry_map.groups.get(group).is_none_or(BTreeMap::is_empty) {
            return Err(DelegationError::DanglingGroup {
                group: group.to_string(),
                cluster: cluster.to_string(),
            });
        }
        Ok(())
    }
}

fn merge_targets(existing: &mut Endpoint, incoming: &Endpoint) {
    for target in &incoming.targets {
        if !existing.targets.contains(target) {
            existing.targets.push(target.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{PublishTarget, RecordLifecycle};
    use std::collections::BTreeMap;

    fn record(root_host: &str, endpoints: Vec<Endpoint>, group: Option<&str>) -> DesiredRecord {
        DesiredRecord {
            name: "rec".into(),
            namespace: "ns".into(),
            root_host: root_host.into(),
            endpoints,
            publish_target: PublishTarget::Delegate,
            health_check_spec: None,
            owner_id: None,
            group: group.map(str::to_string),
            lifecycle: RecordLifecycle::Active,
        }
    }

    fn endpoint(name: &str, target: &str) -> Endpoint {
        Endpoint {
            dns_name: name.to_string(),
            record_type: RecordType::Cname,
            set_identifier: None,
            ttl: 300,
            targets: vec![target.to_string()],
            labels: BTreeMap::new(),
            provider_specific: BTreeMap::new(),
        }
    }

    #[test]
    fn aggregates_across_clusters_by_identity_key() {
        let engine = DelegationEngine::new(DelegationRole::Primary);
        let contributions = vec![
            ClusterContribution {
                cluster: "cluster-a".into(),
                records: vec![record(
                    "example.org",
                    vec![endpoint("foo.example.org", "a.lb.example.org")],
                    None,
                )],
                reachable: true,
            },
            ClusterContribution {
                cluster: "cluster-b".into(),
                records: vec![record(
                    "example.org",
                    vec![endpoint("foo.example.org", "b.lb.example.org")],
                    None,
                )],
                reachable: true,
            },
        ];
        let result = engine.aggregate("example.org", &contributions).unwrap();
        assert_eq!(result.endpoints.len(), 1);
        assert_eq!(result.endpoints[0].targets.len(), 2);
        assert_eq!(result.contributing_clusters.len(), 2);
    }

    #[test]
    fn unreachable_cluster_degrades_without_blocking_others() {
        let engine = DelegationEngine::new(DelegationRole::Primary);
        let contributions = vec![
            ClusterContribution {
                cluster: "cluster-a".into(),
                records: vec![record(
                    "example.org",
                    vec![endpoint("foo.example.org", "a.lb.example.org")],
                    None,
                )],
                reachable: true,
            },
            ClusterContribution {
                cluster: "cluster-b".into(),
                records: vec![],
                reachable: false,
            },
        ];
        let result = engine.aggregate("example.org", &contributions).unwrap();
        assert_eq!(result.contributing_clusters, vec!["cluster-a".to_string()]);
    }

    #[test]
    fn detects_cname_cycle() {
        let engine = DelegationEngine::new(DelegationRole::Primary);
        let endpoints = vec![endpoint("a.example.org", "b.example.org"), endpoint("b.example.org", "a.example.org")];
        let err = engine.validate_consistency("example.org", &endpoints).unwrap_err();
        assert!(matches!(err, DelegationError::CnameCycle { .. }));
    }

    #[test]
    fn cname_to_external_target_is_valid() {
        let engine = DelegationEngine::new(DelegationRole::Primary);
        let endpoints = vec![endpoint("a.example.org", "external.cdn.example.net")];
        assert!(engine.validate_consistency("example.org", &endpoints).is_ok());
    }
}
