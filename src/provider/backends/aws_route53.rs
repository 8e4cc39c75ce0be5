// SPDX-License-Identifier: MIT

//! AWS Route53 back-end. Talks to the Route53 REST management API through
//! the crate's shared `reqwest::Client`, following the same
//! "one shared HTTP client, typed response structs, mapped errors" shape
//! every other backend in this module uses.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::endpoint::{select_zone, Endpoint, Zone};
use crate::errors::ProviderError;
use crate::provider::{aws_geo_key, ApplyOutcome, ChangeSet, Provider, ProviderCapabilities};

const PROVIDER_NAME: &str = "aws-route53";
const API_BASE: &str = "https://route53.amazonaws.com/2013-04-01";

pub struct AwsRoute53Provider {
    client: Client,
    base_url: String,
}

impl AwsRoute53Provider {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            base_url: API_BASE.to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
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

    fn map_status_error(&self, status: reqwest::StatusCode, operation: &str, body: &str) -> ProviderError {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 400 && body.contains("Throttling") {
            ProviderError::Throttled {
                provider: PROVIDER_NAME.to_string(),
                operation: operation.to_string(),
                reason: body.to_string(),
            }
        } else if status == reqwest::StatusCode::CONFLICT {
            ProviderError::Conflict {
                provider: PROVIDER_NAME.to_string(),
                operation: operation.to_string(),
                reason: body.to_string(),
            }
        } else if status == reqwest::StatusCode::FORBIDDEN || status == reqwest::StatusCode::UNAUTHORIZED {
            ProviderError::AuthorizationDenied {
                provider: PROVIDER_NAME.to_string(),
                operation: operation.to_string(),
                reason: body.to_string(),
            }
        } else {
            ProviderError::MalformedRequest {
                provider: PROVIDER_NAME.to_string(),
                operation: operation.to_string(),
                reason: body.to_string(),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct HostedZonesResponse {
    #[serde(rename = "HostedZones", default)]
    hosted_zones: Vec<HostedZone>,
}

#[derive(Debug, Deserialize)]
struct HostedZone {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResourceRecordSetsResponse {
    #[serde(rename = "ResourceRecordSets", default)]
    resource_record_sets: Vec<ResourceRecordSetDto>,
}

#[derive(Debug, Deserialize)]
struct ResourceRecordSetDto {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Type")]
    record_type: String,
    #[serde(rename = "TTL", default)]
    ttl: u32,
    #[serde(rename = "ResourceRecords", default)]
    resource_records: Vec<ResourceRecordDto>,
}

#[derive(Debug, Deserialize)]
struct ResourceRecordDto {
    #[serde(rename = "Value")]
    value: String,
}

#[derive(Debug, Serialize)]
struct ChangeBatchRequest {
    #[serde(rename = "Changes")]
    changes: Vec<ChangeDto>,
}

#[derive(Debug, Serialize)]
struct ChangeDto {
    #[serde(rename = "Action")]
    action: &'static str,
    #[serde(rename = "ResourceRecordSet")]
    resource_record_set: ResourceRecordSetWriteDto,
}

#[derive(Debug, Serialize)]
struct ResourceRecordSetWriteDto {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Type")]
    record_type: String,
    #[serde(rename = "TTL")]
    ttl: u32,
    #[serde(rename = "ResourceRecords")]
    resource_records: Vec<ResourceRecordWriteDto>,
}

#[derive(Debug, Serialize)]
struct ResourceRecordWriteDto {
    #[serde(rename = "Value")]
    value: String,
}

fn change_dto(action: &'static str, endpoint: &Endpoint) -> ChangeDto {
    ChangeDto {
        action,
        resource_record_set: ResourceRecordSetWriteDto {
            name: endpoint.dns_name.clone(),
            record_type: endpoint.record_type.to_string(),
            ttl: endpoint.ttl,
            resource_records: endpoint
                .targets
                .iter()
                .map(|value| ResourceRecordWriteDto { value: value.clone() })
                .collect(),
        },
    }
}

#[async_trait]
impl Provider for AwsRoute53Provider {
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
            .get(format!("{}/hostedzone", self.base_url))
            .send()
            .await
            .map_err(|e| self.map_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.map_status_error(status, "zones", &body));
        }

        let parsed: HostedZonesResponse = response
            .json()
            .await
            .map_err(|e| self.map_transport_error(&e))?;

        Ok(parsed
            .hosted_zones
            .into_iter()
            .map(|z| Zone {
                id: z.id,
                dns_name: z.name.trim_end_matches('.').to_string(),
                name_servers: vec![],
            })
            .collect())
    }

    async fn records(&self, cancel: &CancellationToken) -> Result<Vec<Endpoint>, ProviderError> {
        // Record listing is zone-scoped on Route53, so this walks every
        // hosted zone and aggregates its record sets into the portable
        // `Endpoint` shape.
        let zones = self.zones(cancel).await?;
        let mut records = Vec::new();

        for zone in &zones {
            let response = self
                .client
                .get(format!("{}/hostedzone/{}/rrset", self.base_url, zone.id))
                .send()
                .await
                .map_err(|e| self.map_transport_error(&e))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(self.map_status_error(status, "records", &body));
            }

            let parsed: ResourceRecordSetsResponse = response
                .json()
                .await
                .map_err(|e| self.map_transport_error(&e))?;

            for set in parsed.resource_record_sets {
                let Ok(record_type) = set.record_type.parse() else {
                    continue;
                };
                records.push(Endpoint {
                    dns_name: set.name.trim_end_matches('.').to_string(),
                    record_type,
                    set_identifier: None,
                    ttl: set.ttl,
                    targets: set.resource_records.into_iter().map(|r| r.value).collect(),
                    labels: BTreeMap::new(),
                    provider_specific: BTreeMap::new(),
                });
            }
        }

        Ok(records)
    }

    fn adjust_endpoints(
        &self,
        endpoints: Vec<Endpoint>,
    ) -> Result<Vec<Endpoint>, ProviderError> {
        let mut adjusted = Vec::with_capacity(endpoints.len());
        for mut endpoint in endpoints {
            if let Some(weight) = endpoint.labels.get("weight").cloned() {
                endpoint
                    .provider_specific
                    .insert("aws/weight".to_string(), weight);
            }
            if let Some(code) = endpoint.labels.remove("geo-code") {
                let (key, value) = aws_geo_key(&code)?;
                endpoint.provider_specific.insert(key.to_string(), value);
            }
            adjusted.push(endpoint);
        }
        Ok(adjusted)
    }

    async fn apply_changes(
        &self,
        changes: &ChangeSet,
        cancel: &CancellationToken,
    ) -> Result<ApplyOutcome, ProviderError> {
        // Route53's ChangeResourceRecordSets batches all actions atomically
        // per hosted zone, so changes are grouped by the zone each
        // endpoint's name resolves into, then posted one batch per zone.
        let zones = self.zones(cancel).await?;
        let mut by_zone: BTreeMap<String, Vec<ChangeDto>> = BTreeMap::new();

        for endpoint in &changes.creates {
            let zone = select_zone(&endpoint.dns_name, &zones).map_err(|e| ProviderError::MalformedRequest {
                provider: PROVIDER_NAME.to_string(),
                operation: "apply".to_string(),
                reason: e.to_string(),
            })?;
            by_zone.entry(zone.id.clone()).or_default().push(change_dto("CREATE", endpoint));
        }
        for endpoint in &changes.update_news {
            let zone = select_zone(&endpoint.dns_name, &zones).map_err(|e| ProviderError::MalformedRequest {
                provider: PROVIDER_NAME.to_string(),
                operation: "apply".to_string(),
                reason: e.to_string(),
            })?;
            by_zone.entry(zone.id.clone()).or_default().push(change_dto("UPSERT", endpoint));
        }
        for endpoint in &changes.deletes {
            let zone = select_zone(&endpoint.dns_name, &zones).map_err(|e| ProviderError::MalformedRequest {
                provider: PROVIDER_NAME.to_string(),
                operation: "apply".to_string(),
                reason: e.to_string(),
            })?;
            by_zone.entry(zone.id.clone()).or_default().push(change_dto("DELETE", endpoint));
        }

        let mut applied = 0usize;
        for (zone_id, zone_changes) in by_zone {
            let batch_len = zone_changes.len();
            let body = ChangeBatchRequest { changes: zone_changes };
            let response = self
                .client
                .post(format!("{}/hostedzone/{zone_id}/rrset", self.base_url))
                .json(&body)
                .send()
                .await
                .map_err(|e| self.map_transport_error(&e))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(self.map_status_error(status, "apply", &body));
            }
            applied += batch_len;
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
    async fn records_parses_resource_record_sets_across_zones() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hostedzone"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "HostedZones": [{"Id": "Z1", "Name": "example.org."}]
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/hostedzone/Z1/rrset"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ResourceRecordSets": [{
                    "Name": "foo.example.org.",
                    "Type": "CNAME",
                    "TTL": 300,
                    "ResourceRecords": [{"Value": "lb.example.org"}]
                }]
            })))
            .mount(&mock_server)
            .await;

        let provider = AwsRoute53Provider::with_base_url(Client::new(), mock_server.uri());
        let cancel = CancellationToken::new();
        let records = provider.records(&cancel).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].dns_name, "foo.example.org");
        assert_eq!(records[0].record_type, crate::endpoint::RecordType::Cname);
        assert_eq!(records[0].targets, vec!["lb.example.org".to_string()]);
    }

    #[tokio::test]
    async fn apply_changes_posts_one_batch_per_zone() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hostedzone"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "HostedZones": [{"Id": "Z1", "Name": "example.org."}]
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/hostedzone/Z1/rrset"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&mock_server)
            .await;

        let provider = AwsRoute53Provider::with_base_url(Client::new(), mock_server.uri());
        let cancel = CancellationToken::new();
        let changes = ChangeSet {
            creates: vec![Endpoint {
                dns_name: "foo.example.org".into(),
                record_type: crate::endpoint::RecordType::Cname,
                set_identifier: None,
                ttl: 300,
                targets: vec!["lb.example.org".into()],
                labels: BTreeMap::new(),
                provider_specific: BTreeMap::new(),
            }],
            ..Default::default()
        };

        let outcome = provider.apply_changes(&changes, &cancel).await.unwrap();
        assert_eq!(outcome.applied, 1);
        assert!(outcome.is_full_success());
    }

    #[tokio::test]
    async fn apply_changes_fails_closed_when_no_zone_matches() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hostedzone"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "HostedZones": []
            })))
            .mount(&mock_server)
            .await;

        let provider = AwsRoute53Provider::with_base_url(Client::new(), mock_server.uri());
        let cancel = CancellationToken::new();
        let changes = ChangeSet {
            creates: vec![Endpoint {
                dns_name: "foo.example.org".into(),
                record_type: crate::endpoint::RecordType::Cname,
                set_identifier: None,
                ttl: 300,
                targets: vec!["lb.example.org".into()],
                labels: BTreeMap::new(),
                provider_specific: BTreeMap::new(),
            }],
            ..Default::default()
        };

        let err = provider.apply_changes(&changes, &cancel).await.unwrap_err();
        assert!(matches!(err, ProviderError::MalformedRequest { .. }));
    }

    #[test]
    fn adjust_endpoints_maps_weight_and_geo() {
        let client = Client::new();
        let provider = AwsRoute53Provider::new(client);
        let mut endpoint = Endpoint {
            dns_name: "foo.example.org".into(),
            record_type: crate::endpoint::RecordType::Cname,
            set_identifier: Some("us-east".into()),
            ttl: 300,
            targets: vec!["lb.example.org".into()],
            labels: std::collections::BTreeMap::new(),
            provider_specific: std::collections::BTreeMap::new(),
        };
        endpoint.labels.insert("weight".into(), "10".into());
        endpoint.labels.insert("geo-code".into(), "GEO-EU".into());

        let adjusted = provider.adjust_endpoints(vec![endpoint]).unwrap();
        assert_eq!(adjusted[0].provider_specific.get("aws/weight").unwrap(), "10");
        assert_eq!(
            adjusted[0]
                .provider_specific
                .get("aws/geolocation-continent-code")
                .unwrap(),
            "EU"
        );
        assert!(!adjusted[0].labels.contains_key("geo-code"));
    }

    #[test]
    fn adjust_endpoints_rejects_invalid_geo_code() {
        let client = Client::new();
        let provider = AwsRoute53Provider::new(client);
        let mut endpoint = Endpoint {
            dns_name: "foo.example.org".into(),
            record_type: crate::endpoint::RecordType::Cname,
            set_identifier: None,
            ttl: 300,
            targets: vec!["lb.example.org".into()],
            labels: std::collections::BTreeMap::new(),
            provider_specific: std::collections::BTreeMap::new(),
        };
        endpoint.labels.insert("geo-code".into(), "EU".into());
        let err = provider.adjust_endpoints(vec![endpoint]).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidGeoCode { .. }));
    }
}
