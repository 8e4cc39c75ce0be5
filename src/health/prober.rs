// SPDX-License-Identifier: MIT

//! The per-probe HTTP(S) check algorithm: resolve the probe address to
//! IPs, then issue one request per IP with DNS pinned to that IP so the
//! `Host` header still reflects the intended hostname.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;

use crate::constants::{PROBE_CONNECTION_RESET_STATUS, PROBE_REQUEST_TIMEOUT_SECS, PROBE_SUCCESS_STATUSES};
use crate::errors::ProbeError;

use super::HealthProbeSpec;

/// Shared DNS resolver + HTTP client pair used by every probe worker.
#[derive(Clone)]
pub struct ProbeClient {
    resolver: TokioAsyncResolver,
}

impl ProbeClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()),
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn new_for_test() -> Self {
        Self::new()
    }

    async fn resolve(&self, hostname: &str) -> Result<Vec<IpAddr>, hickory_resolver::error::ResolveError> {
        if let Ok(ip) = hostname.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }
        let lookup = self.resolver.lookup_ip(hostname).await?;
        Ok(lookup.iter().collect())
    }
}

impl Default for ProbeClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Performs one probe observation: resolves `spec.address` to its answer
/// set, then issues an HTTP GET against every IP, failing the whole probe
/// for this interval on any single IP failure.
pub async fn probe_once(client: &ProbeClient, spec: &HealthProbeSpec) -> Result<(), ProbeError> {
    let key = spec.probe_key();
    let ips = client
        .resolve(&spec.address)
        .await
        .map_err(|e| ProbeError::ResolutionFailed {
            key: key.clone(),
            hostname: spec.address.clone(),
            reason: e.to_string(),
        })?;

    for ip in ips {
        probe_ip(&key, spec, ip).await?;
    }
    Ok(())
}

async fn probe_ip(key: &str, spec: &HealthProbeSpec, ip: IpAddr) -> Result<(), ProbeError> {
    let url = format!("{}://{}:{}{}", spec.protocol.scheme(), spec.hostname, spec.port, spec.path);
    let address = format!("{ip}:{}", spec.port);
    let socket_addr: SocketAddr = address.parse().map_err(|_| ProbeError::RequestFailed {
        key: key.to_string(),
        address: address.clone(),
        reason: "invalid resolved socket address".to_string(),
    })?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(PROBE_REQUEST_TIMEOUT_SECS))
        .danger_accept_invalid_certs(spec.allow_insecure_tls)
        .resolve(&spec.hostname, socket_addr)
        .build()
        .map_err(|e| ProbeError::RequestFailed {
            key: key.to_string(),
            address: address.clone(),
            reason: e.to_string(),
        })?;

    let response = client.get(&url).send().await;

    let status = match response {
        Ok(resp) => resp.status().as_u16(),
        Err(err) if err.is_connect() => PROBE_CONNECTION_RESET_STATUS,
        Err(err) => {
            return Err(ProbeError::RequestFailed {
                key: key.to_string(),
                address,
                reason: err.to_string(),
            })
        }
    };

    if PROBE_SUCCESS_STATUSES.contains(&status) {
        Ok(())
    } else {
        Err(ProbeError::UnhealthyStatus {
            key: key.to_string(),
            address,
            status,
        })
    }
}
