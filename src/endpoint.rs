// SPDX-License-Identifier: MIT

//! The canonical DNS data model: [`Endpoint`], [`DesiredRecord`], [`Zone`],
//! and the zone-selection logic that binds a record's root host to a
//! concrete [`Zone`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::TXT_TARGET_MAX_BYTES;
use crate::errors::{ValidationError, ZoneSelectionError};

/// The DNS record kinds this engine manages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Txt,
    Ns,
    Mx,
}

impl RecordType {
    /// Lowercase wire form used in TXT ownership record names.
    #[must_use]
    pub fn as_lowercase(&self) -> &'static str {
        match self {
            Self::A => "a",
            Self::Aaaa => "aaaa",
            Self::Cname => "cname",
            Self::Txt => "txt",
            Self::Ns => "ns",
            Self::Mx => "mx",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::Aaaa => write!(f, "AAAA"),
            Self::Cname => write!(f, "CNAME"),
            Self::Txt => write!(f, "TXT"),
            Self::Ns => write!(f, "NS"),
            Self::Mx => write!(f, "MX"),
        }
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(Self::A),
            "AAAA" => Ok(Self::Aaaa),
            "CNAME" => Ok(Self::Cname),
            "TXT" => Ok(Self::Txt),
            "NS" => Ok(Self::Ns),
            "MX" => Ok(Self::Mx),
            other => Err(format!("unknown record type '{other}'")),
        }
    }
}

/// Identity key for an [`Endpoint`]: `(dnsName, recordType, setIdentifier)`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EndpointKey {
    pub dns_name: String,
    pub record_type: RecordType,
    pub set_identifier: Option<String>,
}

impl EndpointKey {
    #[must_use]
    pub fn new(
        dns_name: impl Into<String>,
        record_type: RecordType,
        set_identifier: Option<String>,
    ) -> Self {
        Self {
            dns_name: dns_name.into().to_ascii_lowercase(),
            record_type,
            set_identifier,
        }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.set_identifier {
            Some(sid) => write!(f, "{}/{}/{}", self.dns_name, self.record_type, sid),
            None => write!(f, "{}/{}", self.dns_name, self.record_type),
        }
    }
}

/// A single DNS answer tuple.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub dns_name: String,
    pub record_type: RecordType,
    pub set_identifier: Option<String>,
    pub ttl: u32,
    pub targets: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub provider_specific: BTreeMap<String, String>,
}

impl Endpoint {
    #[must_use]
    pub fn key(&self) -> EndpointKey {
        EndpointKey::new(&self.dns_name, self.record_type, self.set_identifier.clone())
    }

    /// Validates the per-endpoint invariants from the data model: non-empty
    /// targets (except TXT) and a 255-byte ceiling on TXT target length
    /// after surrounding quote stripping.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.targets.is_empty() && self.record_type != RecordType::Txt {
            return Err(ValidationError::EmptyTargets {
                dns_name: self.dns_name.clone(),
            });
        }
        if self.record_type == RecordType::Txt {
            for target in &self.targets {
                let stripped = target.trim_matches('"');
                if stripped.len() > TXT_TARGET_MAX_BYTES {
                    return Err(ValidationError::TxtTargetTooLong {
                        dns_name: self.dns_name.clone(),
                        len: stripped.len(),
                        max: TXT_TARGET_MAX_BYTES,
                    });
                }
            }
        }
        Ok(())
    }
}

/// How a `DesiredRecord` is published: either directly through a named
/// provider, or delegated to the process-wide primary/secondary engine.
/// Modeled as an enum rather than two nullable fields so the mutual
/// exclusion invariant in the data model is enforced by construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PublishTarget {
    ProviderRef(String),
    Delegate,
}

/// Whether a record is still active or has been marked for removal; the
/// plain-Rust stand-in for an external finalizer mechanism. `finalize`
/// (see [`crate::reconcile`]) must run exactly once while a record is
/// `PendingDeletion` before it is dropped by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordLifecycle {
    Active,
    PendingDeletion,
}

/// A declarative request for a set of endpoints under one root host.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DesiredRecord {
    pub name: String,
    pub namespace: String,
    pub root_host: String,
    pub endpoints: Vec<Endpoint>,
    pub publish_target: PublishTarget,
    pub health_check_spec: Option<crate::health::HealthProbeSpec>,
    pub owner_id: Option<String>,
    pub group: Option<String>,
    pub lifecycle: RecordLifecycle,
}

impl DesiredRecord {
    /// Validates structural invariants: every endpoint, plus the mutual
    /// exclusion of a provider reference and delegation, plus every
    /// endpoint's `dnsName` ending in `rootHost`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName {
                name: self.name.clone(),
            });
        }
        for endpoint in &self.endpoints {
            endpoint.validate()?;
            if !endpoint
                .dns_name
                .to_ascii_lowercase()
                .ends_with(&self.root_host.to_ascii_lowercase())
            {
                return Err(ValidationError::EndpointOutsideRootHost {
                    dns_name: endpoint.dns_name.clone(),
                    root_host: self.root_host.clone(),
                });
            }
        }
        Ok(())
    }

    /// Checks the immutable-field invariant against a previously observed
    /// version of the same record, failing fast on immutable-field changes
    /// before any provider write is attempted.
    pub fn validate_transition(&self, previous: &Self) -> Result<(), ValidationError> {
        let was_delegate = matches!(previous.publish_target, PublishTarget::Delegate);
        let is_delegate = matches!(self.publish_target, PublishTarget::Delegate);
        if was_delegate != is_delegate {
            return Err(ValidationError::ImmutableFieldChanged {
                from: was_delegate,
                to: is_delegate,
            });
        }
        Ok(())
    }
}

/// A DNS-authority-hosted domain, as reported by a provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub dns_name: String,
    pub name_servers: Vec<String>,
}

/// Selects the zone whose `dnsName` is the longest matching suffix of
/// `root_host`. Two zones tied at equal specificity is an [`ZoneSelectionError::Ambiguous`]
/// condition under which no writes may occur.
pub fn select_zone<'a>(
    root_host: &str,
    zones: &'a [Zone],
) -> Result<&'a Zone, ZoneSelectionError> {
    let root_host = root_host.to_ascii_lowercase().trim_end_matches('.').to_string();
    let mut best: Option<(&Zone, usize)> = None;
    let mut tie_count = 0usize;

    for zone in zones {
        let candidate = zone.dns_name.to_ascii_lowercase();
        let candidate = candidate.trim_end_matches('.');
        if root_host == candidate || root_host.ends_with(&format!(".{candidate}")) {
            let specificity = candidate.len();
            match best {
                None => {
                    best = Some((zone, specificity));
                    tie_count = 1;
                }
                Some((_, best_specificity)) if specificity > best_specificity => {
                    best = Some((zone, specificity));
                    tie_count = 1;
                }
                Some((_, best_specificity)) if specificity == best_specificity => {
                    tie_count += 1;
                }
                _ => {}
            }
        }
    }

    match best {
        None => Err(ZoneSelectionError::NoZone {
            root_host: root_host.clone(),
        }),
        Some(_) if tie_count > 1 => Err(ZoneSelectionError::Ambiguous {
            root_host: root_host.clone(),
            count: tie_count,
        }),
        Some((zone, _)) => Ok(zone),
    }
}
