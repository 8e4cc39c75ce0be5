// SPDX-License-Identifier: MIT

//! Google Cloud DNS back-end. No native geo/weighted primitive is exposed
//! by the managed-zone REST API in the shape this engine targets, so
//! `adjust_endpoints` is a passthrough beyond stripping labels the
//! provider would reject outright.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::endpoint::{select_zone, Endpoint, Zone};
use crate::errors::ProviderError;
use crate::provider::{ApplyOutcome, ChangeSet, Provider, ProviderCapabilities};

const PROVIDER_NAME: &str = "gcp-clouddns";

pub struct GcpCloudDnsProvider {
    client: Client,
    base_url: String,
    project_id: String,
}

impl GcpCloudDnsProvider {
    #[must_use]
    pub fn new(client: Client, base_url: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            project_id: project_id.into(),
        }
    }

    fn map_transport_error(&self, err: &reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout {
                provider: PROVIDER_NAME.to_string(),
                operation: "http".to_string(),
                timeout_ms: 0,
            }
        } else {
            ProviderError::Transport {
                provider: PROVIDER_NAME.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl Provider for GcpCloudDnsProvider {
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
        let response = self
            .client
            .get(format!(
                "{}/dns/v1/projects/{}/managedZones",
                self.base_url, self.project_id
            ))
            .send()
            .await
            .map_err(|e| self.map_transport_error(&e))?;

        if !response.status().is_success() {
            return Err(ProviderError::MalformedRequest {
                provider: PROVIDER_NAME.to_string(),
                operation: "zones".to_string(),
                reason: response.text().await.unwrap_or_default(),
            });
        }

        #[derive(serde::Deserialize)]
        struct ManagedZoneList {
            #[serde(rename = "managedZones", default)]
            managed_zones: Vec<ManagedZone>,
        }
        #[derive(serde::Deserialize)]
        struct ManagedZone {
            id: String,
            #[serde(rename = "dnsName")]
            dns_name: String,
            #[serde(rename = "nameServers", default)]
            name_servers: Vec<String>,
        }

        let parsed: ManagedZoneList = response.json().await.map_err(|e| self.map_transport_error(&e))?;
        Ok(parsed
            .managed_zones
            .into_iter()
            .map(|z| Zone {
                id: z.id,
                dns_name: z.dns_name.trim_end_matches('.').to_string(),
                name_servers: z.name_servers,
            })
            .collect())
    }

    async fn records(&self, cancel: &CancellationToken) -> Result<Vec<Endpoint>, ProviderError> {
        #[derive(Deserialize)]
        struct ResourceRecordSetList {
            #[serde(rename = "rrsets", default)]
            rrsets: Vec<ResourceRecordSetDto>,
        }
        #[derive(Deserialize)]
        struct ResourceRecordSetDto {
            name: String,
            #[serde(rename = "type")]
            record_type: String,
            #[serde(rename = "ttl", default)]
            ttl: u32,
            #[serde(rename = "rrdatas", default)]
            rrdatas: Vec<String>,
        }

        let zones = self.zones(cancel).await?;
        let mut records = Vec::new();

        for zone in &zones {
            let response = self
                .client
                .get(format!(
                    "{}/dns/v1/projects/{}/managedZones/{}/rrsets",
                    self.base_url, self.project_id, zone.id
                ))
                .send()
                .await
                .map_err(|e| self.map_transport_error(&e))?;

            if !response.status().is_success() {
                return Err(ProviderError::MalformedRequest {
                    provider: PROVIDER_NAME.to_string(),
                    operation: "records".to_string(),
                    reason: response.text().await.unwrap_or_default(),
                });
            }

            let parsed: ResourceRecordSetList =
                response.json().await.map_err(|e| self.map_transport_error(&e))?;
            for set in parsed.rrsets {
                let Ok(record_type) = set.record_type.parse() else {
                    continue;
                };
                records.push(Endpoint {
                    dns_name: set.name.trim_end_matches('.').to_string(),
                    record_type,
                    set_identifier: None,
                    ttl: set.ttl,
                    targets: set.rrdatas,
                    labels: std::collections::BTreeMap::new(),
                    provider_specific: std::collections::BTreeMap::new(),
                });
            }
        }

        Ok(records)
    }

    fn adjust_endpoints(
        &self,
        mut endpoints: Vec<Endpoint>,
    ) -> Result<Vec<Endpoint>, ProviderError> {
        for endpoint in &mut endpoints {
            endpoint.labels.remove("weight");
            endpoint.labels.remove("geo-code");
        }
        Ok(endpoints)
    }

    async fn apply_changes(
        &self,
        changes: &ChangeSet,
        cancel: &CancellationToken,
    ) -> Result<ApplyOutcome, ProviderError> {
        #[derive(Serialize)]
        struct RecordSetDto {
            name: String,
            #[serde(rename = "type")]
            record_type: String,
            ttl: u32,
            rrdatas: Vec<String>,
        }
        #[derive(Serialize)]
        struct ChangeRequest {
            additions: Vec<RecordSetDto>,
            deletions: Vec<RecordSetDto>,
        }

        fn record_set_dto(endpoint: &Endpoint) -> RecordSetDto {
            RecordSetDto {
                name: endpoint.dns_name.clone(),
                record_type: endpoint.record_type.to_string(),
                ttl: endpoint.ttl,
                rrdatas: endpoint.targets.clone(),
            }
        }

        let zones = self.zones(cancel).await?;
        let mut by_zone: std::collections::BTreeMap<String, ChangeRequest> = std::collections::BTreeMap::new();

        for endpoint in changes.creates.iter().chain(changes.update_news.iter()) {
            let zone = select_zone(&endpoint.dns_name, &zones).map_err(|e| ProviderError::MalformedRequest {
                provider: PROVIDER_NAME.to_string(),
                operation: "apply".to_string(),
                reason: e.to_string(),
            })?;
            by_zone
                .entry(zone.id.clone())
                .or_insert_with(|| ChangeRequest { additions: Vec::new(), deletions: Vec::new() })
                .additions
                .push(record_set_dto(endpoint));
        }
        for endpoint in &changes.deletes {
            let zone = select_zone(&endpoint.dns_name, &zones).map_err(|e| ProviderError::MalformedRequest {
                provider: PROVIDER_NAME.to_string(),
                operation: "apply".to_string(),
                reason: e.to_string(),
            })?;
            by_zone
                .entry(zone.id.clone())
                .or_insert_with(|| ChangeRequest { additions: Vec::new(), deletions: Vec::new() })
                .deletions
                .push(record_set_dto(endpoint));
        }

        let mut applied = 0usize;
        for (zone_id, change_request) in by_zone {
            let batch_len = change_request.additions.len() + change_request.deletions.len();
            let response = self
                .client
                .post(format!(
                    "{}/dns/v1/projects/{}/managedZones/{}/changes",
                    self.base_url, self.project_id, zone_id
                ))
                .json(&change_request)
                .send()
                .await
                .map_err(|e| self.map_transport_error(&e))?;

            if !response.status().is_success() {
                return Err(ProviderError::MalformedRequest {
                    provider: PROVIDER_NAME.to_string(),
                    operation: "apply".to_string(),
                    reason: response.text().await.unwrap_or_default(),
                });
            }
            applied += batch_len;
        }

        Ok(ApplyOutcome {
            applied,
            failed: Vec::new(),
        })
    }
}
