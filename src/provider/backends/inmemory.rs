// SPDX-License-Identifier: MIT

//! An in-memory [`Provider`] used by tests and local development. Holds its
//! state behind a `Mutex` so it is safe to share across concurrently
//! reconciling records.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::endpoint::{Endpoint, Zone};
use crate::errors::ProviderError;
use crate::provider::{ApplyOutcome, ChangeSet, Provider, ProviderCapabilities};

pub struct InMemoryProvider {
    name: String,
    zones: Vec<Zone>,
    records: Mutex<Vec<Endpoint>>,
}

impl InMemoryProvider {
    #[must_use]
    pub fn new(name: impl Into<String>, zones: Vec<Zone>) -> Self {
        Self {
            name: name.into(),
            zones,
            records: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_records(mut self, records: Vec<Endpoint>) -> Self {
        self.records = Mutex::new(records);
        self
    }

    /// Snapshot of current provider state, for assertions in tests.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Endpoint> {
        self.records.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl Provider for InMemoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_weight: true,
            supports_geo: true,
            supports_health_check_ids: false,
        }
    }

    async fn zones(&self, _cancel: &CancellationToken) -> Result<Vec<Zone>, ProviderError> {
        Ok(self.zones.clone())
    }

    async fn records(&self, _cancel: &CancellationToken) -> Result<Vec<Endpoint>, ProviderError> {
        Ok(self.records.lock().expect("lock poisoned").clone())
    }

    fn adjust_endpoints(
        &self,
        endpoints: Vec<Endpoint>,
    ) -> Result<Vec<Endpoint>, ProviderError> {
        // The in-memory provider stores the portable vocabulary as-is; it
        // exists to exercise the planner and registry, not provider-native
        // rewrites.
        Ok(endpoints)
    }

    async fn apply_changes(
        &self,
        changes: &ChangeSet,
        _cancel: &CancellationToken,
    ) -> Result<ApplyOutcome, ProviderError> {
        let mut records = self.records.lock().expect("lock poisoned");
        let mut applied = 0usize;

        for endpoint in &changes.creates {
            records.retain(|r| r.key() != endpoint.key());
            records.push(endpoint.clone());
            applied += 1;
        }
        for endpoint in &changes.update_news {
            records.retain(|r| r.key() != endpoint.key());
            records.push(endpoint.clone());
            applied += 1;
        }
        for endpoint in &changes.deletes {
            records.retain(|r| r.key() != endpoint.key());
            applied += 1;
        }

        Ok(ApplyOutcome {
            applied,
            failed: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{EndpointKey, RecordType};
    use std::collections::BTreeMap;

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

    #[tokio::test]
    async fn apply_is_idempotent() {
        let provider = InMemoryProvider::new(
            "inmemory",
            vec![Zone {
                id: "z1".into(),
                dns_name: "example.org".into(),
                name_servers: vec![],
            }],
        );
        let cancel = CancellationToken::new();
        let changes = ChangeSet {
            creates: vec![endpoint("foo.example.org", "lb.example.org")],
            ..Default::default()
        };

        provider.apply_changes(&changes, &cancel).await.unwrap();
        provider.apply_changes(&changes, &cancel).await.unwrap();

        let records = provider.records(&cancel).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].key(),
            EndpointKey::new("foo.example.org", RecordType::Cname, None)
        );
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let ep = endpoint("foo.example.org", "lb.example.org");
        let provider = InMemoryProvider::new("inmemory", vec![]).with_records(vec![ep.clone()]);
        let cancel = CancellationToken::new();
        let changes = ChangeSet {
            deletes: vec![ep],
            ..Default::default()
        };
        provider.apply_changes(&changes, &cancel).await.unwrap();
        assert!(provider.records(&cancel).await.unwrap().is_empty());
    }
}
