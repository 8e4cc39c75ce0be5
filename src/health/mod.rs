// SPDX-License-Identifier: MIT

//! The health-probe worker pool: one cooperatively-scheduled
//! `tokio::spawn` task per probe key, each cancellable independently off
//! a shared parent token.

mod prober;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub use prober::{probe_once, ProbeClient};

/// Static configuration for one probe, owned by a `DesiredRecord`'s
/// `healthCheckSpec`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthProbeSpec {
    pub name: String,
    pub namespace: String,
    pub hostname: String,
    pub address: String,
    pub path: String,
    pub port: u16,
    pub protocol: ProbeProtocol,
    pub interval: Duration,
    pub failure_threshold: u32,
    pub allow_insecure_tls: bool,
}

impl HealthProbeSpec {
    /// Deduplication key: `"<name>/<namespace>"`.
    #[must_use]
    pub fn probe_key(&self) -> String {
        format!("{}/{}", self.name, self.namespace)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeProtocol {
    Http,
    Https,
}

impl ProbeProtocol {
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

/// Mutable probe outcome, updated after every observation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub last_checked_at: Option<chrono::DateTime<chrono::Utc>>,
    pub reason: Option<String>,
}

/// One observation published by a probe task up to the manager.
struct Observation {
    key: String,
    status: HealthStatus,
}

struct Worker {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Deduplicates probe workers by probe key; a new generation of the same
/// probe cancels the prior worker before starting its replacement. Status
/// writes are serialized through a single-receiver channel consumed by
/// the manager's own task.
pub struct ProbeManager {
    client: ProbeClient,
    workers: Mutex<HashMap<String, Worker>>,
    statuses: Arc<Mutex<HashMap<String, HealthStatus>>>,
    observation_tx: mpsc::Sender<Observation>,
    parent_cancel: CancellationToken,
}

impl ProbeManager {
    #[must_use]
    pub fn new(client: ProbeClient, parent_cancel: CancellationToken) -> Arc<Self> {
        let (observation_tx, mut observation_rx) = mpsc::channel::<Observation>(256);
        let statuses = Arc::new(Mutex::new(HashMap::new()));
        let statuses_for_task = statuses.clone();

        tokio::spawn(async move {
            while let Some(observation) = observation_rx.recv().await {
                statuses_for_task
                    .lock()
                    .await
                    .insert(observation.key, observation.status);
            }
        });

        Arc::new(Self {
            client,
            workers: Mutex::new(HashMap::new()),
            statuses,
            observation_tx,
            parent_cancel,
        })
    }

    /// Reconciles the active worker set to exactly the given specs,
    /// matching the addresses present in the current effective endpoint
    /// set: starts workers for new probe keys, cancels workers for keys no
    /// longer present.
    pub async fn reconcile(&self, specs: Vec<HealthProbeSpec>) {
        let desired_keys: std::collections::HashSet<String> =
            specs.iter().map(HealthProbeSpec::probe_key).collect();

        let mut workers = self.workers.lock().await;
        let stale_keys: Vec<String> = workers
            .keys()
            .filter(|k| !desired_keys.contains(*k))
            .cloned()
            .collect();
        for key in stale_keys {
            if let Some(worker) = workers.remove(&key) {
                worker.cancel.cancel();
            }
        }

        for spec in specs {
            let key = spec.probe_key();
            if workers.contains_key(&key) {
                continue;
            }
            let cancel = self.parent_cancel.child_token();
            let handle = self.spawn_worker(spec, cancel.clone());
            workers.insert(key, Worker { handle, cancel });
        }
    }

    fn spawn_worker(&self, spec: HealthProbeSpec, cancel: CancellationToken) -> JoinHandle<()> {
        let client = self.client.clone();
        let tx = self.observation_tx.clone();
        let key = spec.probe_key();

        tokio::spawn(async move {
            let mut status = HealthStatus::default();
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        break;
                    }
                    () = tokio::time::sleep(spec.interval) => {
                        let result = prober::probe_once(&client, &spec).await;
                        status.last_checked_at = Some(chrono::Utc::now());
                        match result {
                            Ok(()) => {
                                status.healthy = true;
                                status.consecutive_failures = 0;
                                status.reason = None;
                            }
                            Err(err) => {
                                status.healthy = false;
                                status.consecutive_failures += 1;
                                status.reason = Some(err.to_string());
                            }
                        }
                        if tx
                            .send(Observation { key: key.clone(), status: status.clone() })
                            .await
                            .is_err()
                        {
                            warn!(probe = %key, "observation channel closed, stopping probe worker");
                            break;
                        }
                    }
                }
            }
        })
    }

    #[must_use]
    pub async fn status(&self, probe_key: &str) -> Option<HealthStatus> {
        self.statuses.lock().await.get(probe_key).cloned()
    }

    /// Cancels every active worker, draining their channels before
    /// returning so no probe task outlives the manager.
    pub async fn shutdown(&self) {
        let mut workers = self.workers.lock().await;
        for (_, worker) in workers.drain() {
            worker.cancel.cancel();
            let _ = worker.handle.await;
        }
    }
}
