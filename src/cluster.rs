// SPDX-License-Identifier: MIT

//! The remote-cluster client pool and the `DesiredRecordSource` contract
//! standing in for the external orchestration control plane that
//! delivers desired-state objects in a full deployment. The pool is
//! append-only and shared immutably so concurrently reconciling records
//! can read it without locking.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::endpoint::DesiredRecord;
use crate::errors::CoreError;

/// A pre-authenticated handle to one remote cluster. Identity and
/// authentication of remote clusters is assumed handled upstream of this
/// crate; this trait only describes what the core needs from a cluster.
#[async_trait]
pub trait DesiredRecordSource: Send + Sync {
    /// Stable cluster name, used as the failure-domain key in delegation
    /// aggregation and in telemetry labels.
    fn cluster_name(&self) -> &str;

    /// Lists every `DesiredRecord` this cluster currently declares,
    /// optionally restricted to the given root host.
    async fn list_desired_records(&self, root_host: Option<&str>) -> Result<Vec<DesiredRecord>, CoreError>;
}

/// An append-only registry of remote-cluster clients. Clients are
/// inserted once at startup (or when a new cluster's credentials are
/// discovered) and never removed individually; the whole pool is
/// replaced if the credential source is reconfigured.
#[derive(Default, Clone)]
pub struct ClusterPool {
    clients: Arc<BTreeMap<String, Arc<dyn DesiredRecordSource>>>,
}

impl ClusterPool {
    #[must_use]
    pub fn new(clients: BTreeMap<String, Arc<dyn DesiredRecordSource>>) -> Self {
        Self {
            clients: Arc::new(clients),
        }
    }

    #[must_use]
    pub fn get(&self, cluster_name: &str) -> Option<Arc<dyn DesiredRecordSource>> {
        self.clients.get(cluster_name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn DesiredRecordSource>)> {
        self.clients.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
