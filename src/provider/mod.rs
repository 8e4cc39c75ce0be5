// SPDX-License-Identifier: MIT

//! The pluggable back-end abstraction: one [`Provider`] trait unifying cloud
//! DNS zone APIs, CoreDNS, and the in-memory test double behind a single
//! reconcile loop, the same way the `DnsRecordType` trait once unified many
//! concrete record kinds behind one controller.

pub mod backends;

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::endpoint::{Endpoint, Zone};
use crate::errors::ProviderError;

/// A single mutation inside a provider change set.
#[derive(Clone, Debug, PartialEq)]
pub enum Change {
    Create(Endpoint),
    Update { old: Endpoint, new: Endpoint },
    Delete(Endpoint),
}

/// A batch of mutations a [`Provider`] must apply as one unit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeSet {
    pub creates: Vec<Endpoint>,
    pub update_olds: Vec<Endpoint>,
    pub update_news: Vec<Endpoint>,
    pub deletes: Vec<Endpoint>,
}

impl ChangeSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty()
            && self.update_olds.is_empty()
            && self.update_news.is_empty()
            && self.deletes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.creates.len() + self.update_news.len() + self.deletes.len()
    }
}

/// Result of [`Provider::apply_changes`]: either every change landed, or a
/// subset failed and is reported so the reconcile loop's validity window
/// can converge it on the next cycle.
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub applied: usize,
    pub failed: Vec<(Endpoint, String)>,
}

impl ApplyOutcome {
    #[must_use]
    pub fn is_full_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Which portable vocabulary a provider understands. Consumed by
/// `adjust_endpoints` to decide which provider-specific keys to attach.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProviderCapabilities {
    pub supports_weight: bool,
    pub supports_geo: bool,
    pub supports_health_check_ids: bool,
}

/// A pluggable DNS back-end: cloud zone API, CoreDNS, or an in-memory
/// double for tests. All operations take a cancellation token, following
/// the crate-wide convention that every suspension point is cancellable.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier for error messages and metrics labels.
    fn name(&self) -> &str;

    fn capabilities(&self) -> ProviderCapabilities;

    async fn zones(&self, cancel: &CancellationToken) -> Result<Vec<Zone>, ProviderError>;

    async fn records(&self, cancel: &CancellationToken) -> Result<Vec<Endpoint>, ProviderError>;

    /// Rewrites a portable endpoint vocabulary (weight, geo code) into this
    /// provider's native shape. The only place that performs that rewrite;
    /// everything downstream operates on the canonical portable form.
    fn adjust_endpoints(
        &self,
        endpoints: Vec<Endpoint>,
    ) -> Result<Vec<Endpoint>, ProviderError>;

    async fn apply_changes(
        &self,
        changes: &ChangeSet,
        cancel: &CancellationToken,
    ) -> Result<ApplyOutcome, ProviderError>;
}

/// ISO-3166-1 alpha-2 country codes, sorted for binary search. Excludes
/// reserved/non-assigned two-letter codes such as `EU`/`UK`, which AWS
/// itself disambiguates from country codes via the `GEO-` continent
/// prefix rather than accepting them bare.
const ISO_3166_1_ALPHA_2: [&str; 249] = [
    "AD", "AE", "AF", "AG", "AI", "AL", "AM", "AO", "AQ", "AR", "AS", "AT",
    "AU", "AW", "AX", "AZ", "BA", "BB", "BD", "BE", "BF", "BG", "BH", "BI",
    "BJ", "BL", "BM", "BN", "BO", "BQ", "BR", "BS", "BT", "BV", "BW", "BY",
    "BZ", "CA", "CC", "CD", "CF", "CG", "CH", "CI", "CK", "CL", "CM", "CN",
    "CO", "CR", "CU", "CV", "CW", "CX", "CY", "CZ", "DE", "DJ", "DK", "DM",
    "DO", "DZ", "EC", "EE", "EG", "EH", "ER", "ES", "ET", "FI", "FJ", "FK",
    "FM", "FO", "FR", "GA", "GB", "GD", "GE", "GF", "GG", "GH", "GI", "GL",
    "GM", "GN", "GP", "GQ", "GR", "GS", "GT", "GU", "GW", "GY", "HK", "HM",
    "HN", "HR", "HT", "HU", "ID", "IE", "IL", "IM", "IN", "IO", "IQ", "IR",
    "IS", "IT", "JE", "JM", "JO", "JP", "KE", "KG", "KH", "KI", "KM", "KN",
    "KP", "KR", "KW", "KY", "KZ", "LA", "LB", "LC", "LI", "LK", "LR", "LS",
    "LT", "LU", "LV", "LY", "MA", "MC", "MD", "ME", "MF", "MG", "MH", "MK",
    "ML", "MM", "MN", "MO", "MP", "MQ", "MR", "MS", "MT", "MU", "MV", "MW",
    "MX", "MY", "MZ", "NA", "NC", "NE", "NF", "NG", "NI", "NL", "NO", "NP",
    "NR", "NU", "NZ", "OM", "PA", "PE", "PF", "PG", "PH", "PK", "PL", "PM",
    "PN", "PR", "PS", "PT", "PW", "PY", "QA", "RE", "RO", "RS", "RU", "RW",
    "SA", "SB", "SC", "SD", "SE", "SG", "SH", "SI", "SJ", "SK", "SL", "SM",
    "SN", "SO", "SR", "SS", "ST", "SV", "SX", "SY", "SZ", "TC", "TD", "TF",
    "TG", "TH", "TJ", "TK", "TL", "TM", "TN", "TO", "TR", "TT", "TV", "TW",
    "TZ", "UA", "UG", "UM", "US", "UY", "UZ", "VA", "VC", "VE", "VG", "VI",
    "VN", "VU", "WF", "WS", "YE", "YT", "ZA", "ZM", "ZW",
];

/// Normalizes a portable geo code into AWS Route53's vocabulary: ISO-3166
/// alpha-2 country code, `GEO-<continent>` prefix, or the `*` wildcard.
/// Anything else, including a bare reserved/non-country code like `EU`,
/// is `InvalidGeoCode`.
pub fn aws_geo_key(code: &str) -> Result<(&'static str, String), ProviderError> {
    let upper = code.to_ascii_uppercase();
    if upper == "*" {
        return Ok(("aws/geolocation-country-code", "*".to_string()));
    }
    if let Some(continent) = upper.strip_prefix("GEO-") {
        return Ok((
            "aws/geolocation-continent-code",
            continent.to_string(),
        ));
    }
    if ISO_3166_1_ALPHA_2.binary_search(&upper.as_str()).is_ok() {
        return Ok(("aws/geolocation-country-code", upper));
    }
    Err(ProviderError::InvalidGeoCode { code: code.to_string() })
}

/// Collapses a sibling CNAME set sharing a weighted/geo `setIdentifier`
/// into Azure Traffic Manager's single-profile-per-host shape: one
/// endpoint per target, each carrying its own weight/geo tag as
/// provider-specific properties.
#[must_use]
pub fn azure_traffic_manager_tags(geo_code: Option<&str>) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    if let Some(code) = geo_code {
        let tag = if code.eq_ignore_ascii_case("*") {
            "WORLD".to_string()
        } else {
            code.to_ascii_uppercase()
        };
        tags.insert("azure/traffic-manager-geo".to_string(), tag);
    }
    tags
}
