// SPDX-License-Identifier: MIT

//! End-to-end reconcile scenarios exercising the full registry/planner/
//! provider pipeline. Most scenarios run against the in-memory provider, so
//! only the reconcile loop's own logic is under test; the two scenarios
//! that exercise the AWS Route53 backend's real HTTP calls mount a
//! `wiremock` server standing in for the Route53 management API.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dns_authority::delegation::{ClusterContribution, DelegationEngine, DelegationRole};
use dns_authority::endpoint::{DesiredRecord, Endpoint, PublishTarget, RecordLifecycle, RecordType, Zone};
use dns_authority::health::{HealthProbeSpec, ProbeClient, ProbeManager, ProbeProtocol};
use dns_authority::provider::backends::aws_route53::AwsRoute53Provider;
use dns_authority::provider::backends::inmemory::InMemoryProvider;
use dns_authority::reconcile::{reconcile_record, ReconcileDeps, ReconcileState};
use dns_authority::registry::{Registry, RegistryConfig};

fn example_zone() -> Zone {
    Zone {
        id: "z1".to_string(),
        dns_name: "example.org".to_string(),
        name_servers: vec!["ns1.example.org".to_string()],
    }
}

fn cname_endpoint(name: &str, target: &str) -> Endpoint {
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

fn desired_record(owner_id: &str, endpoints: Vec<Endpoint>) -> DesiredRecord {
    DesiredRecord {
        name: "foo".to_string(),
        namespace: "tenant-a".to_string(),
        root_host: "example.org".to_string(),
        endpoints,
        publish_target: PublishTarget::ProviderRef("inmemory".to_string()),
        health_check_spec: None,
        owner_id: Some(owner_id.to_string()),
        group: None,
        lifecycle: RecordLifecycle::Active,
    }
}

fn registry(owner_id: &str) -> Registry {
    Registry::new(RegistryConfig {
        prefix: Some("txt-".to_string()),
        suffix: None,
        owner_id: owner_id.to_string(),
        wildcard_replacement: Some("star".to_string()),
        encryption_key: None,
    })
    .unwrap()
}

fn authoritative_types() -> BTreeSet<RecordType> {
    [RecordType::A, RecordType::Aaaa, RecordType::Cname].into_iter().collect()
}

#[tokio::test]
async fn unique_cname_is_created_with_ownership_txt() {
    let provider = InMemoryProvider::new("inmemory", vec![example_zone()]);
    let reg = registry("ownerA");
    let zones = vec![example_zone()];
    let types = authoritative_types();
    let probes = ProbeManager::new(ProbeClient::new(), CancellationToken::new());
    let cancel = CancellationToken::new();

    let record = desired_record("ownerA", vec![cname_endpoint("foo.example.org", "lb.example.org")]);
    let deps = ReconcileDeps {
        zones: &zones,
        provider: &provider,
        registry: &reg,
        authoritative_types: &types,
        probe_manager: &probes,
        valid_for: Duration::from_secs(600),
        max_requeue_time: Duration::from_secs(900),
    };
    let mut state = ReconcileState::new(Duration::from_secs(5), Duration::from_secs(300));

    let outcome = reconcile_record(&record, None, 1, &mut state, &deps, &cancel).await;
    assert!(outcome.status.ready, "reconcile should succeed: {:?}", outcome.status.reason);

    let snapshot = provider.snapshot();
    assert!(snapshot.iter().any(|e| e.record_type == RecordType::Cname && e.dns_name == "foo.example.org"));
    assert!(snapshot.iter().any(|e| e.record_type == RecordType::Txt));
}

#[tokio::test]
async fn co_owner_join_merges_targets_and_ownership() {
    let provider = InMemoryProvider::new("inmemory", vec![example_zone()]);
    let zones = vec![example_zone()];
    let types = authoritative_types();
    let probes = ProbeManager::new(ProbeClient::new(), CancellationToken::new());
    let cancel = CancellationToken::new();

    // ownerA publishes first.
    let reg_a = registry("ownerA");
    let record_a = desired_record("ownerA", vec![cname_endpoint("foo.example.org", "a.lb.example.org")]);
    let deps_a = ReconcileDeps {
        zones: &zones,
        provider: &provider,
        registry: &reg_a,
        authoritative_types: &types,
        probe_manager: &probes,
        valid_for: Duration::from_secs(600),
        max_requeue_time: Duration::from_secs(900),
    };
    let mut state_a = ReconcileState::new(Duration::from_secs(5), Duration::from_secs(300));
    let outcome_a = reconcile_record(&record_a, None, 1, &mut state_a, &deps_a, &cancel).await;
    assert!(outcome_a.status.ready);

    // ownerB joins with the same data record.
    let reg_b = registry("ownerB");
    let record_b = desired_record("ownerB", vec![cname_endpoint("foo.example.org", "a.lb.example.org")]);
    let deps_b = ReconcileDeps {
        zones: &zones,
        provider: &provider,
        registry: &reg_b,
        authoritative_types: &types,
        probe_manager: &probes,
        valid_for: Duration::from_secs(600),
        max_requeue_time: Duration::from_secs(900),
    };
    let mut state_b = ReconcileState::new(Duration::from_secs(5), Duration::from_secs(300));
    let outcome_b = reconcile_record(&record_b, None, 1, &mut state_b, &deps_b, &cancel).await;
    assert!(outcome_b.status.ready, "co-owner join should succeed: {:?}", outcome_b.status.reason);

    let snapshot = provider.snapshot();
    let data = snapshot
        .iter()
        .find(|e| e.record_type == RecordType::Cname && e.dns_name == "foo.example.org")
        .expect("data record survives");
    assert_eq!(data.targets, vec!["a.lb.example.org".to_string()]);

    let txt_count = snapshot.iter().filter(|e| e.record_type == RecordType::Txt).count();
    assert_eq!(txt_count, 2, "each owner gets its own ownership TXT");

    let read_back = reg_a.read_path(snapshot);
    let owners = read_back
        .iter()
        .find(|e| e.dns_name == "foo.example.org")
        .and_then(|e| e.labels.get("owner"))
        .cloned()
        .unwrap_or_default();
    assert!(owners.contains("ownerA") && owners.contains("ownerB"));
}

#[tokio::test]
async fn co_owner_leave_keeps_data_record_for_remaining_owner() {
    let provider = InMemoryProvider::new("inmemory", vec![example_zone()]);
    let zones = vec![example_zone()];
    let types = authoritative_types();
    let probes = ProbeManager::new(ProbeClient::new(), CancellationToken::new());
    let cancel = CancellationToken::new();

    for owner in ["ownerA", "ownerB"] {
        let reg = registry(owner);
        let record = desired_record(owner, vec![cname_endpoint("foo.example.org", "lb.example.org")]);
        let deps = ReconcileDeps {
            zones: &zones,
            provider: &provider,
            registry: &reg,
            authoritative_types: &types,
            probe_manager: &probes,
            valid_for: Duration::from_secs(600),
            max_requeue_time: Duration::from_secs(900),
        };
        let mut state = ReconcileState::new(Duration::from_secs(5), Duration::from_secs(300));
        let outcome = reconcile_record(&record, None, 1, &mut state, &deps, &cancel).await;
        assert!(outcome.status.ready);
    }

    // ownerA leaves.
    let reg_a = registry("ownerA");
    let record_a = desired_record("ownerA", vec![cname_endpoint("foo.example.org", "lb.example.org")]);
    let deps_a = ReconcileDeps {
        zones: &zones,
        provider: &provider,
        registry: &reg_a,
        authoritative_types: &types,
        probe_manager: &probes,
        valid_for: Duration::from_secs(600),
        max_requeue_time: Duration::from_secs(900),
    };
    let mut state_a = ReconcileState::new(Duration::from_secs(5), Duration::from_secs(300));
    dns_authority::reconcile::finalize_record(&record_a, &mut state_a, &deps_a, &cancel)
        .await
        .unwrap();

    let snapshot = provider.snapshot();
    assert!(
        snapshot
            .iter()
            .any(|e| e.record_type == RecordType::Cname && e.dns_name == "foo.example.org"),
        "data record must survive while ownerB still claims it"
    );
    let read_back = reg_a.read_path(snapshot);
    let owner_label = read_back
        .iter()
        .find(|e| e.dns_name == "foo.example.org")
        .and_then(|e| e.labels.get("owner"))
        .cloned()
        .unwrap_or_default();
    assert_eq!(owner_label, "ownerB");
}

#[tokio::test]
async fn wildcard_host_gets_replacement_label_in_ownership_txt_name() {
    let provider = InMemoryProvider::new("inmemory", vec![example_zone()]);
    let zones = vec![example_zone()];
    let types = authoritative_types();
    let probes = ProbeManager::new(ProbeClient::new(), CancellationToken::new());
    let cancel = CancellationToken::new();

    let reg = registry("ownerA");
    let record = desired_record("ownerA", vec![cname_endpoint("*.example.org", "lb.example.org")]);
    let deps = ReconcileDeps {
        zones: &zones,
        provider: &provider,
        registry: &reg,
        authoritative_types: &types,
        probe_manager: &probes,
        valid_for: Duration::from_secs(600),
        max_requeue_time: Duration::from_secs(900),
    };
    let mut state = ReconcileState::new(Duration::from_secs(5), Duration::from_secs(300));
    let outcome = reconcile_record(&record, None, 1, &mut state, &deps, &cancel).await;
    assert!(outcome.status.ready, "wildcard record should reconcile: {:?}", outcome.status.reason);

    let snapshot = provider.snapshot();
    let txt = snapshot
        .iter()
        .find(|e| e.record_type == RecordType::Txt)
        .expect("ownership TXT created");
    assert!(txt.dns_name.contains("star.example.org"));
    assert!(!txt.dns_name.contains('*'));
}

#[tokio::test]
async fn aws_route53_rejects_invalid_geo_code_end_to_end() {
    let provider = AwsRoute53Provider::new(reqwest::Client::new());
    let reg = registry("ownerA");
    let zones = vec![example_zone()];
    let types = authoritative_types();
    let probes = ProbeManager::new(ProbeClient::new(), CancellationToken::new());
    let cancel = CancellationToken::new();

    let mut endpoint = cname_endpoint("foo.example.org", "lb.example.org");
    endpoint.labels.insert("geo-code".to_string(), "EU".to_string());
    let record = desired_record("ownerA", vec![endpoint]);

    let deps = ReconcileDeps {
        zones: &zones,
        provider: &provider,
        registry: &reg,
        authoritative_types: &types,
        probe_manager: &probes,
        valid_for: Duration::from_secs(600),
        max_requeue_time: Duration::from_secs(900),
    };
    let mut state = ReconcileState::new(Duration::from_secs(5), Duration::from_secs(300));
    let outcome = reconcile_record(&record, None, 1, &mut state, &deps, &cancel).await;

    assert!(!outcome.status.ready);
    assert_eq!(outcome.status.reason.as_deref(), Some("ProviderPermanent"));
}

#[tokio::test]
async fn aws_route53_accepts_continent_prefixed_geo_code() {
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
            "ResourceRecordSets": []
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hostedzone/Z1/rrset"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&mock_server)
        .await;

    let provider = AwsRoute53Provider::with_base_url(reqwest::Client::new(), mock_server.uri());
    let reg = registry("ownerA");
    let zones = vec![example_zone()];
    let types = authoritative_types();
    let probes = ProbeManager::new(ProbeClient::new(), CancellationToken::new());
    let cancel = CancellationToken::new();

    let mut endpoint = cname_endpoint("foo.example.org", "lb.example.org");
    endpoint.labels.insert("geo-code".to_string(), "GEO-EU".to_string());
    let record = desired_record("ownerA", vec![endpoint]);

    let deps = ReconcileDeps {
        zones: &zones,
        provider: &provider,
        registry: &reg,
        authoritative_types: &types,
        probe_manager: &probes,
        valid_for: Duration::from_secs(600),
        max_requeue_time: Duration::from_secs(900),
    };
    let mut state = ReconcileState::new(Duration::from_secs(5), Duration::from_secs(300));
    let outcome = reconcile_record(&record, None, 1, &mut state, &deps, &cancel).await;
    assert!(outcome.status.ready, "valid geo code should reconcile: {:?}", outcome.status.reason);
}

#[tokio::test]
async fn unknown_probe_status_defaults_target_to_healthy() {
    let provider = InMemoryProvider::new("inmemory", vec![example_zone()]);
    let zones = vec![example_zone()];
    let types = authoritative_types();
    let cancel = CancellationToken::new();
    let probes = ProbeManager::new(ProbeClient::new(), cancel.child_token());

    let reg = registry("ownerA");
    let mut record = desired_record("ownerA", vec![cname_endpoint("foo.example.org", "lb.example.org")]);
    record.health_check_spec = Some(HealthProbeSpec {
        name: "foo".to_string(),
        namespace: "tenant-a".to_string(),
        hostname: "lb.example.org".to_string(),
        address: "lb.example.org".to_string(),
        path: "/healthz".to_string(),
        port: 443,
        protocol: ProbeProtocol::Https,
        // Long enough that the worker never fires during this test.
        interval: Duration::from_secs(3600),
        failure_threshold: 3,
        allow_insecure_tls: true,
    });

    let deps = ReconcileDeps {
        zones: &zones,
        provider: &provider,
        registry: &reg,
        authoritative_types: &types,
        probe_manager: &probes,
        valid_for: Duration::from_secs(600),
        max_requeue_time: Duration::from_secs(900),
    };
    let mut state = ReconcileState::new(Duration::from_secs(5), Duration::from_secs(300));
    let outcome = reconcile_record(&record, None, 1, &mut state, &deps, &cancel).await;
    assert!(outcome.status.ready, "no observation yet should not exclude the target: {:?}", outcome.status.reason);

    let snapshot = provider.snapshot();
    let data = snapshot
        .iter()
        .find(|e| e.record_type == RecordType::Cname && e.dns_name == "foo.example.org")
        .expect("data record published");
    assert_eq!(data.targets, vec!["lb.example.org".to_string()]);

    probes.shutdown().await;
}

#[tokio::test]
async fn delegation_group_switch_converges_to_new_group_on_next_cycle() {
    let engine = DelegationEngine::new(DelegationRole::Primary);

    let mut record_group_a = desired_record("ownerA", vec![cname_endpoint("foo.example.org", "a.lb.example.org")]);
    record_group_a.group = Some("blue".to_string());

    let first = engine
        .aggregate(
            "example.org",
            &[ClusterContribution {
                cluster: "cluster-a".to_string(),
                records: vec![record_group_a],
                reachable: true,
            }],
        )
        .unwrap();
    assert_eq!(first.group.as_deref(), Some("blue"));

    let mut record_group_b = desired_record("ownerA", vec![cname_endpoint("foo.example.org", "a.lb.example.org")]);
    record_group_b.group = Some("green".to_string());

    let second = engine
        .aggregate(
            "example.org",
            &[ClusterContribution {
                cluster: "cluster-a".to_string(),
                records: vec![record_group_b],
                reachable: true,
            }],
        )
        .unwrap();
    assert_eq!(second.group.as_deref(), Some("green"), "group switch must be reflected on the next aggregation cycle");
}
