// SPDX-License-Identifier: MIT

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use dns_authority::cluster::ClusterPool;
use dns_authority::config::{Config, CredentialSource, EnvCredentialSource};
use dns_authority::constants::TOKIO_WORKER_THREADS;
use dns_authority::coordination::{LeaderElection, SingleProcessLeader};
use dns_authority::delegation::{ClusterContribution, DelegationEngine, DelegationRole};
use dns_authority::endpoint::{DesiredRecord, PublishTarget, RecordLifecycle, RecordType};
use dns_authority::health::{ProbeClient, ProbeManager};
use dns_authority::provider::backends::{aws_route53, azure_dns, coredns, gcp_clouddns};
use dns_authority::provider::Provider;
use dns_authority::reconcile::{reconcile_record, ReconcileDeps, ReconcileState};
use dns_authority::registry::{Registry, RegistryConfig};
use dns_authority::telemetry;

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("dns-authority")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let config = Config::parse();
    telemetry::init_logging(config.log_mode, config.log_level);

    let _metrics_handle = telemetry::serve_metrics(config.metrics_bind_address.clone());

    let credentials = EnvCredentialSource;
    let providers = build_providers(&config, &credentials);
    if providers.is_empty() {
        warn!("no providers configured; engine will idle with metrics only");
    }

    let registry = Registry::new(RegistryConfig {
        prefix: Some("txt-".to_string()),
        suffix: None,
        owner_id: std::env::var("OWNER_ID").unwrap_or_else(|_| "dns-authority".to_string()),
        wildcard_replacement: Some("star".to_string()),
        encryption_key: None,
    })?;

    let cancel = CancellationToken::new();
    let probe_manager = ProbeManager::new(ProbeClient::new(), cancel.child_token());

    let delegation_role: DelegationRole = config.delegation_role.into();
    let delegation_engine = DelegationEngine::new(delegation_role);
    info!(role = ?delegation_engine.role(), "delegation engine initialized");

    let cluster_pool = ClusterPool::default();
    if cluster_pool.is_empty() {
        info!("no remote clusters registered; desired records arrive only through library callers");
    }

    let leader: Arc<dyn LeaderElection> = Arc::new(SingleProcessLeader);
    if config.leader_elect {
        warn!("leader-elect requested but no distributed coordinator is wired in; running as a single always-leader instance");
    }
    leader.acquire().await.map_err(anyhow::Error::from)?;

    run_reconcile_loop(&config, &providers, &registry, &probe_manager, &cluster_pool, &delegation_engine, cancel).await
}

/// Constructs one provider per `--provider` entry, pointed at an overridable
/// base URL (falling back to the real public API endpoint) and carrying
/// whatever credentials the environment supplies.
fn build_providers(config: &Config, credentials: &dyn CredentialSource) -> BTreeMap<String, Arc<dyn Provider>> {
    let mut providers: BTreeMap<String, Arc<dyn Provider>> = BTreeMap::new();
    let client = reqwest::Client::new();

    for kind in &config.provider {
        let creds = credentials.credentials_for(kind);
        let provider: Arc<dyn Provider> = match kind.as_str() {
            "aws-route53" => {
                let base_url = std::env::var("AWS_ROUTE53_BASE_URL")
                    .unwrap_or_else(|_| "https://route53.amazonaws.com/2013-04-01".to_string());
                Arc::new(aws_route53::AwsRoute53Provider::with_base_url(client.clone(), base_url))
            }
            "azure-dns" => {
                let base_url = std::env::var("AZURE_DNS_BASE_URL")
                    .unwrap_or_else(|_| "https://management.azure.com".to_string());
                Arc::new(azure_dns::AzureDnsProvider::new(client.clone(), base_url))
            }
            "gcp-clouddns" => {
                let base_url = std::env::var("GCP_CLOUDDNS_BASE_URL")
                    .unwrap_or_else(|_| "https://dns.googleapis.com/dns/v1".to_string());
                let project_id = creds
                    .as_ref()
                    .and_then(|c| c.values.get("PROJECT_ID").cloned())
                    .unwrap_or_else(|| "unset-project".to_string());
                Arc::new(gcp_clouddns::GcpCloudDnsProvider::new(client.clone(), base_url, project_id))
            }
            "coredns" => {
                let reload_url = std::env::var("COREDNS_RELOAD_URL")
                    .unwrap_or_else(|_| "http://coredns.internal:8081/reload".to_string());
                Arc::new(coredns::CoreDnsProvider::new(client.clone(), reload_url, Vec::new()))
            }
            other => {
                warn!(provider = other, "unknown provider kind, skipping");
                continue;
            }
        };
        if creds.is_none() {
            warn!(provider = kind.as_str(), "no credentials found in environment for this provider");
        }
        providers.insert(kind.clone(), provider);
    }
    providers
}

/// Drives the reconcile loop, racing it against SIGINT/SIGTERM so either
/// signal triggers the same graceful shutdown path as a clean exit.
async fn run_reconcile_loop(
    config: &Config,
    providers: &BTreeMap<String, Arc<dyn Provider>>,
    registry: &Registry,
    probe_manager: &Arc<ProbeManager>,
    cluster_pool: &ClusterPool,
    delegation_engine: &DelegationEngine,
    cancel: CancellationToken,
) -> Result<()> {
    let authoritative_types: BTreeSet<RecordType> =
        [RecordType::A, RecordType::Aaaa, RecordType::Cname].into_iter().collect();

    let shutdown_result: Result<()> = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            info!("received SIGINT, initiating graceful shutdown");
            result.map_err(anyhow::Error::from)
        }
        result = wait_for_sigterm() => {
            info!("received SIGTERM, initiating graceful shutdown");
            result
        }
        result = reconcile_forever(config, providers, registry, &authoritative_types, probe_manager, cluster_pool, delegation_engine, &cancel) => {
            result
        }
    };

    cancel.cancel();
    probe_manager.shutdown().await;
    shutdown_result?;
    info!("shutdown complete");
    Ok(())
}

async fn wait_for_sigterm() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        sigterm.recv().await;
        Ok(())
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// One cycle: pull every reachable cluster's desired records, aggregate
/// them per root host through the delegation engine, and reconcile the
/// result against the first configured provider. Clusters are assumed
/// identity-mapped and pre-authenticated upstream of this binary; with no
/// clusters registered, this loop idles while the metrics and probe
/// surfaces stay up.
#[allow(clippy::too_many_arguments)]
async fn reconcile_forever(
    config: &Config,
    providers: &BTreeMap<String, Arc<dyn Provider>>,
    registry: &Registry,
    authoritative_types: &BTreeSet<RecordType>,
    probe_manager: &Arc<ProbeManager>,
    cluster_pool: &ClusterPool,
    delegation_engine: &DelegationEngine,
    cancel: &CancellationToken,
) -> Result<()> {
    let Some((provider_name, provider)) = providers.iter().next() else {
        cancel.cancelled().await;
        return Ok(());
    };

    let mut states: HashMap<String, ReconcileState> = HashMap::new();
    let mut generation: u64 = 0;

    loop {
        tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            () = tokio::time::sleep(config.min_requeue_time()) => {}
        }
        generation += 1;

        let zones = match provider.zones(cancel).await {
            Ok(zones) => zones,
            Err(err) => {
                warn!(provider = provider_name.as_str(), error = %err, "failed to list zones this cycle");
                continue;
            }
        };

        let mut contributions_by_host: BTreeMap<String, Vec<ClusterContribution>> = BTreeMap::new();
        for (cluster_name, client) in cluster_pool.iter() {
            match client.list_desired_records(None).await {
                Ok(records) => {
                    for record in records {
                        contributions_by_host
                            .entry(record.root_host.clone())
                            .or_default()
                            .push(ClusterContribution {
                                cluster: cluster_name.clone(),
                                records: vec![record],
                                reachable: true,
                            });
                    }
                }
                Err(err) => {
                    warn!(cluster = cluster_name.as_str(), error = %err, "cluster unreachable this cycle");
                }
            }
        }

        for (root_host, contributions) in contributions_by_host {
            let authoritative = match delegation_engine.aggregate(&root_host, &contributions) {
                Ok(authoritative) => authoritative,
                Err(err) => {
                    warn!(root_host = root_host.as_str(), error = %err, "delegation aggregation failed");
                    continue;
                }
            };

            let desired_record = DesiredRecord {
                name: root_host.clone(),
                namespace: "dns-authority".to_string(),
                root_host: root_host.clone(),
                endpoints: authoritative.endpoints,
                publish_target: PublishTarget::ProviderRef(provider_name.clone()),
                health_check_spec: None,
                owner_id: None,
                group: authoritative.group,
                lifecycle: RecordLifecycle::Active,
            };

            let state = states
                .entry(root_host.clone())
                .or_insert_with(|| ReconcileState::new(config.min_requeue_time(), config.max_requeue_time()));

            let deps = ReconcileDeps {
                zones: &zones,
                provider: provider.as_ref(),
                registry,
                authoritative_types,
                probe_manager: probe_manager.as_ref(),
                valid_for: config.valid_for(),
                max_requeue_time: config.max_requeue_time(),
            };

            let outcome = reconcile_record(&desired_record, None, generation, state, &deps, cancel).await;
            info!(root_host = root_host.as_str(), ready = outcome.status.ready, "reconcile cycle complete");
        }
    }
}
