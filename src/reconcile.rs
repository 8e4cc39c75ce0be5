// SPDX-License-Identifier: MIT

//! The per-record reconcile loop: an apply/cleanup split gated by a
//! finalizer-style lifecycle flag, re-expressed without a Kubernetes
//! client. Backoff is a truncated exponential backoff bounded by
//! `[minRequeueTime, maxRequeueTime]` rather than by a Kubernetes-API-call
//! elapsed-time cutoff.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::RngExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::endpoint::{DesiredRecord, RecordLifecycle, RecordType, Zone, select_zone};
use crate::errors::CoreError;
use crate::health::ProbeManager;
use crate::planner::Planner;
use crate::provider::Provider;
use crate::registry::Registry;

/// Truncated exponential backoff bounded by `[minRequeueTime,
/// maxRequeueTime]`, governing requeue cadence for a perpetual reconcile
/// loop rather than retries of a single API call.
pub struct RequeueBackoff {
    current_interval: Duration,
    min_interval: Duration,
    max_interval: Duration,
    multiplier: f64,
    randomization_factor: f64,
}

impl RequeueBackoff {
    #[must_use]
    pub fn new(min_interval: Duration, max_interval: Duration) -> Self {
        Self {
            current_interval: min_interval,
            min_interval,
            max_interval,
            multiplier: crate::constants::REQUEUE_BACKOFF_MULTIPLIER,
            randomization_factor: crate::constants::REQUEUE_JITTER_FACTOR,
        }
    }

    /// Returns the next jittered interval and advances the internal
    /// interval toward `max_interval`.
    pub fn next_backoff(&mut self) -> Duration {
        let jittered = self.apply_jitter(self.current_interval);
        let next_secs = self.current_interval.as_secs_f64() * self.multiplier;
        self.current_interval = Duration::from_secs_f64(next_secs).min(self.max_interval);
        jittered.max(self.min_interval)
    }

    /// Resets to the minimum interval after a successful apply.
    pub fn reset(&mut self) {
        self.current_interval = self.min_interval;
    }

    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }
        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;
        let mut rng = rand::rng();
        let jittered = rng.random_range((secs - delta).max(0.0)..=(secs + delta));
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Observed outcome of the last reconcile cycle: the `{Ready, Healthy}`
/// condition set plus the write/generation/group counters surfaced by
/// the final phase of the loop.
#[derive(Clone, Debug, Default)]
pub struct ReconcileStatus {
    pub ready: bool,
    pub healthy: bool,
    pub write_counter: u64,
    pub observed_generation: u64,
    pub observed_group: Option<String>,
    pub reason: Option<String>,
}

/// Cross-cycle state for one record's reconcile loop: the stable owner
/// ID once assigned, the last successful apply timestamp (for the
/// `validFor` short-circuit), and the backoff cursor.
pub struct ReconcileState {
    pub owner_id: Option<String>,
    pub lifecycle: RecordLifecycle,
    pub last_applied_at: Option<DateTime<Utc>>,
    pub status: ReconcileStatus,
    pub backoff: RequeueBackoff,
}

impl ReconcileState {
    #[must_use]
    pub fn new(min_requeue: Duration, max_requeue: Duration) -> Self {
        Self {
            owner_id: None,
            lifecycle: RecordLifecycle::Active,
            last_applied_at: None,
            status: ReconcileStatus::default(),
            backoff: RequeueBackoff::new(min_requeue, max_requeue),
        }
    }
}

pub struct ReconcileOutcome {
    pub status: ReconcileStatus,
    pub requeue_after: Duration,
}

/// Everything one reconcile cycle needs besides the record and its
/// cross-cycle state.
pub struct ReconcileDeps<'a> {
    pub zones: &'a [Zone],
    pub provider: &'a dyn Provider,
    pub registry: &'a Registry,
    pub authoritative_types: &'a BTreeSet<RecordType>,
    pub probe_manager: &'a ProbeManager,
    pub valid_for: Duration,
    pub max_requeue_time: Duration,
}

/// Runs one cycle of the eight-phase reconcile loop for `record`, given
/// its prior observed generation/spec (for the `validFor` short-circuit
/// and immutable-field checks).
pub async fn reconcile_record(
    record: &DesiredRecord,
    previous: Option<&DesiredRecord>,
    generation: u64,
    state: &mut ReconcileState,
    deps: &ReconcileDeps<'_>,
    cancel: &CancellationToken,
) -> ReconcileOutcome {
    // Phase 8 short-circuit: still valid and generation unchanged.
    if let Some(last_applied_at) = state.last_applied_at {
        let unchanged_generation = generation == state.status.observed_generation;
        let elapsed = Utc::now().signed_duration_since(last_applied_at);
        if unchanged_generation
            && elapsed
                .to_std()
                .is_ok_and(|elapsed| elapsed < deps.valid_for)
        {
            return ReconcileOutcome {
                status: state.status.clone(),
                requeue_after: deps.valid_for,
            };
        }
    }

    match run_phases(record, previous, generation, state, deps, cancel).await {
        Ok(status) => {
            state.last_applied_at = Some(Utc::now());
            state.backoff.reset();
            state.status = status.clone();
            ReconcileOutcome {
                status,
                requeue_after: deps.valid_for,
            }
        }
        Err(err) => {
            let requeue_after = if err.is_transient() {
                state.backoff.next_backoff()
            } else {
                deps.max_requeue_time
            };
            warn!(error = %err, reason = err.status_reason(), "reconcile failed");
            state.status.ready = false;
            state.status.reason = Some(err.status_reason().to_string());
            ReconcileOutcome {
                status: state.status.clone(),
                requeue_after,
            }
        }
    }
}

async fn run_phases(
    record: &DesiredRecord,
    previous: Option<&DesiredRecord>,
    generation: u64,
    state: &mut ReconcileState,
    deps: &ReconcileDeps<'_>,
    cancel: &CancellationToken,
) -> Result<ReconcileStatus, CoreError> {
    // Phase 1: validate.
    record.validate()?;
    if let Some(previous) = previous {
        record.validate_transition(previous)?;
    }

    // Phase 2: assign owner ID if missing, persisted in state thereafter.
    if state.owner_id.is_none() {
        state.owner_id = Some(
            record
                .owner_id
                .clone()
                .unwrap_or_else(|| format!("{}-{}", record.namespace, record.name)),
        );
    }
    let owner_id = state.owner_id.clone().expect("owner id assigned above");

    // Phase 3: bind zone.
    let zone = select_zone(&record.root_host, deps.zones)?;

    // Phase 4: construct provider — the caller supplies an already
    // constructed `Provider` (credential resolution is an external
    // collaborator per the configuration contract).
    let provider = deps.provider;

    // Phase 5: compute effective endpoint set, filtering unhealthy targets.
    let mut effective_endpoints = record.endpoints.clone();
    for endpoint in &mut effective_endpoints {
        let mut healthy_targets = Vec::with_capacity(endpoint.targets.len());
        for target in &endpoint.targets {
            let probe_key = format!("{}/{}", record.name, record.namespace);
            let unhealthy = deps
                .probe_manager
                .status(&probe_key)
                .await
                .is_some_and(|status| !status.healthy);
            if !unhealthy {
                healthy_targets.push(target.clone());
            }
        }
        if !healthy_targets.is_empty() {
            endpoint.targets = healthy_targets;
        }
    }
    effective_endpoints.retain(|e| !e.targets.is_empty() || e.record_type == RecordType::Txt);

    // Phase 6: plan and apply through the registry-wrapped provider.
    let adjusted_desired = provider.adjust_endpoints(effective_endpoints)?;
    let provider_records = provider.records(cancel).await?;
    let current = deps.registry.read_path(provider_records.clone());

    let planner = Planner::new(owner_id.clone(), deps.authoritative_types.clone());
    let data_changes = planner.diff(adjusted_desired, current);

    let existing_txt_names: BTreeSet<String> = provider_records
        .iter()
        .filter(|e| e.record_type == RecordType::Txt)
        .map(|e| e.dns_name.clone())
        .collect();

    let change_set = deps
        .registry
        .synthesize_write_changes(data_changes, &existing_txt_names)?;

    let write_count = if change_set.is_empty() {
        0
    } else {
        let outcome = provider.apply_changes(&change_set, cancel).await?;
        if !outcome.is_full_success() {
            warn!(
                zone = %zone.dns_name,
                failed = outcome.failed.len(),
                "provider partially applied change set; will converge next cycle"
            );
        }
        outcome.applied as u64
    };

    // Phase 7: reconcile active health probes against the effective set.
    if let Some(spec) = record.health_check_spec.clone() {
        deps.probe_manager.reconcile(vec![spec]).await;
    }

    info!(record = %record.name, zone = %zone.dns_name, writes = write_count, "reconcile applied");

    Ok(ReconcileStatus {
        ready: true,
        healthy: true,
        write_counter: state.status.write_counter + write_count,
        observed_generation: generation,
        observed_group: record.group.clone(),
        reason: None,
    })
}

/// Runs cleanup exactly once for a record transitioning out of
/// existence: the plain-Rust stand-in for a Kubernetes finalizer. Revokes
/// this instance's ownership TXTs; the underlying data record is left
/// intact if other owners remain (Planner's co-owner downgrade already
/// encodes that rule when `deletes` is computed against an empty desired
/// set).
pub async fn finalize_record(
    record: &DesiredRecord,
    state: &mut ReconcileState,
    deps: &ReconcileDeps<'_>,
    cancel: &CancellationToken,
) -> Result<(), CoreError> {
    if state.lifecycle == RecordLifecycle::PendingDeletion {
        return Ok(());
    }
    state.lifecycle = RecordLifecycle::PendingDeletion;

    let owner_id = state.owner_id.clone().unwrap_or_else(|| {
        record
            .owner_id
            .clone()
            .unwrap_or_else(|| format!("{}-{}", record.namespace, record.name))
    });

    let provider_records = deps.provider.records(cancel).await?;
    let current = deps.registry.read_path(provider_records.clone());
    let planner = Planner::new(owner_id, deps.authoritative_types.clone());
    let data_changes = planner.diff(Vec::new(), current);

    let existing_txt_names: std::collections::BTreeSet<String> = provider_records
        .into_iter()
        .filter(|e| e.record_type == RecordType::Txt)
        .map(|e| e.dns_name)
        .collect();

    let change_set = deps.registry.synthesize_write_changes(data_changes, &existing_txt_names)?;
    if !change_set.is_empty() {
        deps.provider.apply_changes(&change_set, cancel).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_stays_within_bounds_and_grows() {
        let mut backoff = RequeueBackoff::new(Duration::from_secs(5), Duration::from_secs(60));
        let first = backoff.next_backoff();
        let second = backoff.next_backoff();
        assert!(first.as_secs_f64() >= 4.0);
        assert!(second >= first || second.as_secs() <= 66);
    }

    #[test]
    fn backoff_resets_to_minimum() {
        let mut backoff = RequeueBackoff::new(Duration::from_secs(5), Duration::from_secs(60));
        backoff.next_backoff();
        backoff.next_backoff();
        backoff.reset();
        let reset_value = backoff.next_backoff();
        assert!(reset_value.as_secs_f64() <= 6.0);
    }
}
