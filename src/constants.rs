// SPDX-License-Identifier: MIT

//! Global constants for the DNS authority core.
//!
//! These are the fallback values used when a flag or environment
//! variable is not supplied.

// ============================================================================
// Reconcile cadence
// ============================================================================

/// Default window after a successful apply during which reconciliation short-circuits.
pub const DEFAULT_VALID_FOR_SECS: u64 = 14 * 60;

/// Default minimum requeue interval (lower bound of the backoff range).
pub const DEFAULT_MIN_REQUEUE_SECS: u64 = 5;

/// Default maximum requeue interval (upper bound of the backoff range).
pub const DEFAULT_MAX_REQUEUE_SECS: u64 = 15 * 60;

/// Backoff multiplier applied between requeue attempts.
pub const REQUEUE_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Jitter factor applied to requeue intervals (±10%), to avoid a thundering herd
/// of reconciles against the same zone.
pub const REQUEUE_JITTER_FACTOR: f64 = 0.1;

// ============================================================================
// Health probing
// ============================================================================

/// Per-request timeout for a single health probe HTTP call.
pub const PROBE_REQUEST_TIMEOUT_SECS: u64 = 3;

/// Synthetic status code recorded when a probe connection is reset.
pub const PROBE_CONNECTION_RESET_STATUS: u16 = 104;

/// HTTP status codes that count as a successful probe.
pub const PROBE_SUCCESS_STATUSES: [u16; 2] = [200, 201];

// ============================================================================
// Registry / ownership TXT encoding
// ============================================================================

/// Current ownership TXT encoding version.
pub const TXT_OWNERSHIP_VERSION: &str = "1";

/// Heritage marker prefixing every ownership TXT target.
pub const TXT_HERITAGE: &str = "heritage=external-dns";

/// Maximum TXT target length (bytes), after surrounding quote stripping.
pub const TXT_TARGET_MAX_BYTES: usize = 255;

/// Length of the base36 owner-id hash embedded in TXT record names.
pub const OWNER_HASH_LEN: usize = 8;

/// AES-256-GCM key length in bytes.
pub const ENCRYPTION_KEY_BYTES: usize = 32;

/// AES-GCM nonce length in bytes.
pub const ENCRYPTION_NONCE_BYTES: usize = 12;

/// Labels whose values are merged (not overwritten) across co-owners.
pub const MERGE_KEYS: [&str; 3] = ["owner", "soft_delete", "stop_soft_delete"];

/// Delimiter used to join multi-valued merged label entries.
pub const MERGE_DELIMITER: char = ',';

// ============================================================================
// Metrics
// ============================================================================

/// Namespace prefix for all exported Prometheus metrics.
pub const METRICS_NAMESPACE: &str = "dns_authority";

/// Default bind address for the metrics HTTP server.
pub const DEFAULT_METRICS_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default bind address for the health-probe HTTP server.
pub const DEFAULT_HEALTH_PROBE_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Metrics endpoint path.
pub const METRICS_PATH: &str = "/metrics";

// ============================================================================
// Runtime
// ============================================================================

/// Number of Tokio worker threads for the main runtime.
pub const TOKIO_WORKER_THREADS: usize = 4;

/// Default cadence at which the `RegistryMap` cache for a zone may be refreshed.
pub const DEFAULT_REGISTRY_CACHE_INTERVAL_SECS: u64 = 60;
