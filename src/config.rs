// SPDX-License-Identifier: MIT

//! The CLI flag / environment variable dual surface. Every flag has an
//! upper-snake env mirror generated by `clap`'s `env` feature; invalid
//! values are a hard parse error, so bad configuration causes immediate
//! exit with nonzero status without any bespoke validation layer.

use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::constants::{
    DEFAULT_HEALTH_PROBE_BIND_ADDRESS, DEFAULT_MAX_REQUEUE_SECS, DEFAULT_METRICS_BIND_ADDRESS,
    DEFAULT_MIN_REQUEUE_SECS, DEFAULT_VALID_FOR_SECS,
};
use crate::delegation::DelegationRole;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DelegationRoleArg {
    Primary,
    Secondary,
}

impl From<DelegationRoleArg> for DelegationRole {
    fn from(value: DelegationRoleArg) -> Self {
        match value {
            DelegationRoleArg::Primary => Self::Primary,
            DelegationRoleArg::Secondary => Self::Secondary,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogMode {
    Development,
    Production,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    #[must_use]
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Top-level configuration surface. Every field corresponds to one flag
/// named in the external interfaces table.
#[derive(Parser, Debug, Clone)]
#[command(name = "dns-authority", about = "Multi-cluster DNS authority reconciliation engine")]
pub struct Config {
    #[arg(long, env = "ENABLE_PROBES", default_value_t = true)]
    pub enable_probes: bool,

    #[arg(long, env = "INSECURE_HEALTH_CHECKS", default_value_t = true)]
    pub insecure_health_checks: bool,

    #[arg(long, env = "METRICS_BIND_ADDRESS", default_value = DEFAULT_METRICS_BIND_ADDRESS)]
    pub metrics_bind_address: String,

    #[arg(long, env = "HEALTH_PROBE_BIND_ADDRESS", default_value = DEFAULT_HEALTH_PROBE_BIND_ADDRESS)]
    pub health_probe_bind_address: String,

    #[arg(long, env = "LEADER_ELECT", default_value_t = false)]
    pub leader_elect: bool,

    #[arg(long, env = "MAX_REQUEUE_TIME", value_parser = parse_duration_secs, default_value_t = DEFAULT_MAX_REQUEUE_SECS)]
    pub max_requeue_time: u64,

    #[arg(long, env = "VALID_FOR", value_parser = parse_duration_secs, default_value_t = DEFAULT_VALID_FOR_SECS)]
    pub valid_for: u64,

    #[arg(long, env = "MIN_REQUEUE_TIME", value_parser = parse_duration_secs, default_value_t = DEFAULT_MIN_REQUEUE_SECS)]
    pub min_requeue_time: u64,

    #[arg(long, env = "PROVIDER", value_delimiter = ',', default_values_t = default_providers())]
    pub provider: Vec<String>,

    #[arg(long, env = "CLUSTER_SECRET_NAMESPACE", default_value = "default")]
    pub cluster_secret_namespace: String,

    #[arg(long, env = "CLUSTER_SECRET_LABEL", default_value = "dns-authority/cluster-credentials")]
    pub cluster_secret_label: String,

    #[arg(long, env = "WATCH_NAMESPACES", value_delimiter = ',')]
    pub watch_namespaces: Vec<String>,

    #[arg(long, env = "DELEGATION_ROLE", value_enum, default_value = "primary")]
    pub delegation_role: DelegationRoleArg,

    #[arg(long, env = "GROUP")]
    pub group: Option<String>,

    #[arg(long, env = "LOG_MODE", value_enum, default_value = "production")]
    pub log_mode: LogMode,

    #[arg(long, env = "LOG_LEVEL", value_enum, default_value = "info")]
    pub log_level: LogLevel,
}

fn default_providers() -> Vec<String> {
    vec![
        "aws-route53".to_string(),
        "gcp-clouddns".to_string(),
        "azure-dns".to_string(),
        "coredns".to_string(),
    ]
}

fn parse_duration_secs(raw: &str) -> Result<u64, String> {
    humantime_duration_to_secs(raw).ok_or_else(|| format!("invalid duration '{raw}'"))
}

/// Minimal duration parser accepting `<n>s`/`<n>m`/`<n>h` or a bare
/// integer (seconds), matching the flag descriptions in the external
/// interfaces table (e.g. `15m`, `14m`, `5s`).
fn humantime_duration_to_secs(raw: &str) -> Option<u64> {
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(secs);
    }
    let (value, unit) = raw.split_at(raw.len().checked_sub(1)?);
    let value: u64 = value.parse().ok()?;
    match unit {
        "s" => Some(value),
        "m" => Some(value * 60),
        "h" => Some(value * 3600),
        _ => None,
    }
}

impl Config {
    #[must_use]
    pub fn valid_for(&self) -> Duration {
        Duration::from_secs(self.valid_for)
    }

    #[must_use]
    pub fn min_requeue_time(&self) -> Duration {
        Duration::from_secs(self.min_requeue_time)
    }

    #[must_use]
    pub fn max_requeue_time(&self) -> Duration {
        Duration::from_secs(self.max_requeue_time)
    }
}

/// Already-decoded credential material for one provider kind, consumed
/// but not managed by this crate; secret decoding is a collaborator's job.
#[derive(Clone, Debug, Default)]
pub struct ProviderCredentials {
    pub values: std::collections::BTreeMap<String, String>,
}

/// Supplies already-decoded credential material per provider kind,
/// standing in for the excluded secret-decoding collaborator.
pub trait CredentialSource: Send + Sync {
    fn credentials_for(&self, provider_kind: &str) -> Option<ProviderCredentials>;
}

/// Reads credentials from process environment variables using each
/// provider kind's well-known key set.
pub struct EnvCredentialSource;

impl CredentialSource for EnvCredentialSource {
    fn credentials_for(&self, provider_kind: &str) -> Option<ProviderCredentials> {
        let keys: &[&str] = match provider_kind {
            "aws-route53" => &["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY", "AWS_REGION"],
            "gcp-clouddns" => &["GOOGLE", "PROJECT_ID"],
            "azure-dns" => &["azure.json"],
            "coredns" => &["NAMESERVERS", "ZONES"],
            _ => return None,
        };
        let mut values = std::collections::BTreeMap::new();
        for key in keys {
            if let Ok(value) = std::env::var(key) {
                values.insert((*key).to_string(), value);
            }
        }
        if values.is_empty() {
            None
        } else {
            Some(ProviderCredentials { values })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_flag_set() {
        let config = Config::parse_from(["dns-authority"]);
        assert!(config.enable_probes);
        assert_eq!(config.max_requeue_time, DEFAULT_MAX_REQUEUE_SECS);
        assert_eq!(config.delegation_role, DelegationRoleArg::Primary);
    }

    #[test]
    fn parses_duration_flags_with_unit_suffixes() {
        let config = Config::parse_from(["dns-authority", "--valid-for", "14m", "--min-requeue-time", "5s"]);
        assert_eq!(config.valid_for, 14 * 60);
        assert_eq!(config.min_requeue_time, 5);
    }

    #[test]
    fn rejects_invalid_duration() {
        let result = Config::try_parse_from(["dns-authority", "--valid-for", "not-a-duration"]);
        assert!(result.is_err());
    }

    #[test]
    fn provider_list_is_csv_parsed() {
        let config = Config::parse_from(["dns-authority", "--provider", "aws-route53,coredns"]);
        assert_eq!(config.provider, vec!["aws-route53".to_string(), "coredns".to_string()]);
    }
}
