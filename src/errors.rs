// SPDX-License-Identifier: MIT

//! The unified error taxonomy for the DNS authority core.
//!
//! Mirrors the transient/permanent classification and per-error status
//! reason codes that drive the reconcile loop's requeue policy. Sub-errors
//! compose into [`CoreError`] the same way a DNS operator composes
//! zone/record/instance/tsig errors into one top-level type.

use thiserror::Error;

/// Malformed or invariant-violating desired state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("endpoint '{dns_name}' has empty targets (only TXT endpoints may omit targets)")]
    EmptyTargets { dns_name: String },

    #[error("TXT target for '{dns_name}' is {len} bytes after quote stripping, exceeds {max}")]
    TxtTargetTooLong {
        dns_name: String,
        len: usize,
        max: usize,
    },

    #[error("endpoint '{dns_name}' does not end in root host '{root_host}'")]
    EndpointOutsideRootHost { dns_name: String, root_host: String },

    #[error("record specifies both a providerRef and delegate=true, which are mutually exclusive")]
    ProviderRefAndDelegate,

    #[error("attempted to change immutable field 'delegate' from {from} to {to}")]
    ImmutableFieldChanged { from: bool, to: bool },

    #[error("record name '{name}' is empty")]
    EmptyName { name: String },
}

/// Zone resolution failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ZoneSelectionError {
    #[error("no zone matches root host '{root_host}'")]
    NoZone { root_host: String },

    #[error("root host '{root_host}' matches {count} zones with equal specificity")]
    Ambiguous { root_host: String, count: usize },
}

/// Provider (cloud DNS back-end) errors.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("provider '{provider}' timed out after {timeout_ms}ms during {operation}")]
    Timeout {
        provider: String,
        operation: String,
        timeout_ms: u64,
    },

    #[error("provider '{provider}' throttled request during {operation}: {reason}")]
    Throttled {
        provider: String,
        operation: String,
        reason: String,
    },

    #[error("provider '{provider}' rejected request during {operation} (conflict): {reason}")]
    Conflict {
        provider: String,
        operation: String,
        reason: String,
    },

    #[error("provider '{provider}' denied authorization for {operation}: {reason}")]
    AuthorizationDenied {
        provider: String,
        operation: String,
        reason: String,
    },

    #[error("provider '{provider}' rejected malformed request during {operation}: {reason}")]
    MalformedRequest {
        provider: String,
        operation: String,
        reason: String,
    },

    #[error("invalid geo code '{code}': must be 'GEO-<continent>', an ISO-3166 alpha-2 country, or '*'")]
    InvalidGeoCode { code: String },

    #[error("provider '{provider}' partially applied change set: {failed} of {total} changes failed")]
    PartialFailure {
        provider: String,
        failed: usize,
        total: usize,
    },

    #[error("provider transport error contacting '{provider}': {reason}")]
    Transport { provider: String, reason: String },
}

impl ProviderError {
    /// Transient provider errors (timeouts, throttling, conflicts) are retried with backoff.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::Throttled { .. }
                | Self::Conflict { .. }
                | Self::PartialFailure { .. }
                | Self::Transport { .. }
        )
    }
}

/// TXT ownership registry errors.
#[derive(Error, Debug, Clone)]
pub enum RegistryError {
    #[error("TXT record '{name}' is unparsable as ownership metadata: {reason}")]
    Unparsable { name: String, reason: String },

    #[error("TXT record '{name}' has contradictory ownership metadata: {reason}")]
    Contradictory { name: String, reason: String },

    #[error("registry configuration invalid: prefix and suffix are mutually exclusive")]
    PrefixAndSuffixConflict,

    #[error("registry configuration invalid: owner id must be non-empty")]
    EmptyOwnerId,

    #[error("registry encryption key must be exactly {expected} bytes, got {actual}")]
    InvalidEncryptionKeyLength { expected: usize, actual: usize },

    #[error("failed to encrypt TXT target: {reason}")]
    EncryptionFailed { reason: String },

    #[error("failed to decrypt TXT target: {reason}")]
    DecryptionFailed { reason: String },
}

/// Health probe transport errors. Never fatal to the owning reconcile loop;
/// a probe failure degrades the probe's own status only.
#[derive(Error, Debug, Clone)]
pub enum ProbeError {
    #[error("probe '{key}' could not resolve hostname '{hostname}': {reason}")]
    ResolutionFailed {
        key: String,
        hostname: String,
        reason: String,
    },

    #[error("probe '{key}' request to {address} failed: {reason}")]
    RequestFailed {
        key: String,
        address: String,
        reason: String,
    },

    #[error("probe '{key}' request to {address} returned unhealthy status {status}")]
    UnhealthyStatus {
        key: String,
        address: String,
        status: u16,
    },
}

/// Delegation/aggregation errors across clusters for one root host.
#[derive(Error, Debug, Clone)]
pub enum DelegationError {
    #[error("CNAME chain for '{dns_name}' does not terminate inside the declared endpoint set or at an external target")]
    DanglingCname { dns_name: String },

    #[error("CNAME cycle detected starting at '{dns_name}'")]
    CnameCycle { dns_name: String },

    #[error("group '{group}' referenced by cluster '{cluster}' has no members")]
    DanglingGroup { group: String, cluster: String },

    #[error("cluster '{cluster}' is unreachable, degrading its contribution: {reason}")]
    ClusterUnreachable { cluster: String, reason: String },
}

/// Leadership coordination failure. Fatal: the process should exit and let
/// an external supervisor restart it.
#[derive(Error, Debug, Clone)]
#[error("leadership lost or coordination failed: {reason}")]
pub struct CoordinationError {
    pub reason: String,
}

/// The top-level error taxonomy driving reconcile-loop classification.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    ZoneSelection(#[from] ZoneSelectionError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Delegation(#[from] DelegationError),

    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// Whether the reconcile loop should retry this error with exponential
    /// backoff (bounded `[minRequeueTime, maxRequeueTime]`) rather than
    /// surfacing a terminal NotReady state that waits for external change.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::ZoneSelection(_) => false,
            Self::Provider(e) => e.is_transient(),
            Self::Registry(_) => false,
            Self::Probe(_) => true,
            Self::Delegation(DelegationError::ClusterUnreachable { .. }) => true,
            Self::Delegation(_) => false,
            Self::Coordination(_) => false,
            Self::Other(_) => true,
        }
    }

    /// Short machine-readable reason code, analogous to a Kubernetes
    /// condition reason, for status reporting.
    #[must_use]
    pub fn status_reason(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::ZoneSelection(ZoneSelectionError::NoZone { .. }) => "NoZone",
            Self::ZoneSelection(ZoneSelectionError::Ambiguous { .. }) => "AmbiguousZone",
            Self::Provider(e) if e.is_transient() => "ProviderTransient",
            Self::Provider(_) => "ProviderPermanent",
            Self::Registry(_) => "RegistryCorruption",
            Self::Probe(_) => "ProbeTransport",
            Self::Delegation(_) => "DelegationError",
            Self::Coordination(_) => "CoordinationError",
            Self::Other(_) => "Unknown",
        }
    }
}
