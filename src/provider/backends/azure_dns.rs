// SPDX-License-Identifier: MIT

//! Azure DNS back-end with Traffic Manager support for geo/weighted
//! routing policies, expressed as a single profile-per-host record
//! carrying per-target weights/geo tags rather than Route53's
//! one-record-per-variant shape.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::endpoint::{select_zone, Endpoint, Zone};
use crate::errors::ProviderError;
use crate::provider::{azure_traffic_manager_tags, ApplyOutcome, ChangeSet, Provider, ProviderCapabilities};

const PROVIDER_NAME: &str = "azure-dns";

pub struct AzureDnsProvider {
    client: Client,
    base_url: String,
}

impl AzureDnsProvider {
    #[must_use]
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
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
impl Provider for AzureDnsProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            supports_weight: true,
            supports_geo: true,
            supports_health_check_ids: true,
        }
    }

    async fn zones(&self, _cancel: &CancellationToken) -> Result<Vec<Zone>, ProviderError> {
        let response = self
            .client
            .get(format!("{}/zones", self.base_url))
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
        struct ZoneList {
            #[serde(default)]
            value: Vec<ZoneDto>,
        }
        #[derive(serde::Deserialize)]
        struct ZoneDto {
            name: String,
            #[serde(rename = "nameServers", default)]
            name_servers: Vec<String>,
        }

        let parsed: ZoneList = response.json().await.map_err(|e| self.map_transport_error(&e))?;
        Ok(parsed
            .value
            .into_iter()
            .map(|z| Zone {
                id: z.name.clone(),
                dns_name: z.name,
                name_servers: z.name_servers,
            })
            .collect())
    }

    async fn records(&self, cancel: &CancellationToken) -> Result<Vec<Endpoint>, ProviderError> {
        #[derive(Deserialize)]
        struct RecordSetList {
            #[serde(default)]
            value: Vec<RecordSetDto>,
        }
        #[derive(Deserialize)]
        struct RecordSetDto {
            name: String,
            #[serde(rename = "type")]
            record_type: String,
            properties: RecordSetPropertiesDto,
        }
        #[derive(Deserialize)]
        struct RecordSetPropertiesDto {
            #[serde(rename = "TTL", default)]
            ttl: u32,
            #[serde(default)]
            targets: Vec<String>,
        }

        let zones = self.zones(cancel).await?;
        let mut records = Vec::new();

        for zone in &zones {
            let response = self
                .client
                .get(format!("{}/zones/{}/recordsets", self.base_url, zone.dns_name))
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

            let parsed: RecordSetList = response.json().await.map_err(|e| self.map_transport_error(&e))?;
            for set in parsed.value {
                let Ok(record_type) = set.record_type.parse() else {
                    continue;
                };
                records.push(Endpoint {
                    dns_name: set.name,
                    record_type,
                    set_identifier: None,
                    ttl: set.properties.ttl,
                    targets: set.properties.targets,
                    labels: std::collections::BTreeMap::new(),
                    provider_specific: std::collections::BTreeMap::new(),
                });
            }
        }

        Ok(records)
    }

    fn adjust_endpoints(
        &self,
        endpoints: Vec<Endpoint>,
    ) -> Result<Vec<Endpoint>, ProviderError> {
        let mut by_set_identifier: std::collections::BTreeMap<
            (String, Option<String>),
            Vec<Endpoint>,
        > = std::collections::BTreeMap::new();

        for endpoint in endpoints {
            let group_key = (
                endpoint.dns_name.clone(),
                endpoint.set_identifier.clone(),
            );
            by_set_identifier.entry(group_key).or_default().push(endpoint);
        }

        let mut adjusted = Vec::new();
        for (_, mut group) in by_set_identifier {
            for endpoint in &mut group {
                let geo_code = endpoint.labels.remove("geo-code");
                let tags = azure_traffic_manager_tags(geo_code.as_deref());
                endpoint.provider_specific.extend(tags);
                if let Some(weight) = endpoint.labels.get("weight").cloned() {
                    endpoint
                        .provider_specific
                        .insert("azure/traffic-manager-weight".to_string(), weight);
                }
            }
            adjusted.extend(group);
        }
        Ok(adjusted)
    }

    async fn apply_changes(
        &self,
        changes: &ChangeSet,
        cancel: &CancellationToken,
    ) -> Result<ApplyOutcome, ProviderError> {
        #[derive(Serialize)]
        struct RecordSetPut {
            properties: RecordSetPutProperties,
        }
        #[derive(Serialize)]
        struct RecordSetPutProperties {
            #[serde(rename = "TTL")]
            ttl: u32,
            targets: Vec<String>,
        }

        let zones = self.zones(cancel).await?;
        let mut applied = 0usize;

        for endpoint in changes.creates.iter().chain(changes.update_news.iter()) {
            let zone = select_zone(&endpoint.dns_name, &zones).map_err(|e| ProviderError::MalformedRequest {
                provider: PROVIDER_NAME.to_string(),
                operation: "apply".to_string(),
                reason: e.to_string(),
            })?;
            let body = RecordSetPut {
                properties: RecordSetPutProperties {
                    ttl: endpoint.ttl,
                    targets: endpoint.targets.clone(),
                },
            };
            let response = self
                .client
                .put(format!(
                    "{}/zones/{}/{}/{}",
                    self.base_url, zone.dns_name, endpoint.record_type, endpoint.dns_name
                ))
                .json(&body)
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
            applied += 1;
        }

        for endpoint in &changes.deletes {
            let zone = select_zone(&endpoint.dns_name, &zones).map_err(|e| ProviderError::MalformedRequest {
                provider: PROVIDER_NAME.to_string(),
                operation: "apply".to_string(),
                reason: e.to_string(),
            })?;
            let response = self
                .client
                .delete(format!(
                    "{}/zones/{}/{}/{}",
                    self.base_url, zone.dns_name, endpoint.record_type, endpoint.dns_name
                ))
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
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn records_parses_recordsets_across_zones() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [{"name": "example.org", "nameServers": []}]
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/zones/example.org/recordsets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [{
                    "name": "foo.example.org",
                    "type": "CNAME",
                    "properties": {"TTL": 300, "targets": ["lb.example.org"]}
                }]
            })))
            .mount(&mock_server)
            .await;

        let provider = AzureDnsProvider::new(Client::new(), mock_server.uri());
        let cancel = CancellationToken::new();
        let records = provider.records(&cancel).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].targets, vec!["lb.example.org".to_string()]);
    }

    #[tokio::test]
    async fn apply_changes_puts_creates_and_deletes_deletes() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [{"name": "example.org", "nameServers": []}]
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/zones/example.org/CNAME/foo.example.org"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&mock_server)
            .await;

        let provider = AzureDnsProvider::new(Client::new(), mock_server.uri());
        let cancel = CancellationToken::new();
        let changes = ChangeSet {
            creates: vec![Endpoint {
                dns_name: "foo.example.org".into(),
                record_type: crate::endpoint::RecordType::Cname,
                set_identifier: None,
                ttl: 300,
                targets: vec!["lb.example.org".into()],
                labels: std::collections::BTreeMap::new(),
                provider_specific: std::collections::BTreeMap::new(),
            }],
            ..Default::default()
        };

        let outcome = provider.apply_changes(&changes, &cancel).await.unwrap();
        assert_eq!(outcome.applied, 1);
    }
}
