// SPDX-License-Identifier: MIT

//! Leader-election contract bounding "at most one primary instance writes
//! to any given zone", standing in for a distributed lease manager in a
//! full deployment. A single-process implementation satisfies the
//! contract trivially for standalone or test use.

use async_trait::async_trait;

use crate::errors::CoordinationError;

/// Whether this process currently holds the write lease for its
/// configured zone set.
#[async_trait]
pub trait LeaderElection: Send + Sync {
    /// Blocks until leadership is acquired or the election fails fatally.
    async fn acquire(&self) -> Result<(), CoordinationError>;

    /// True while the lease is held. The reconcile loop and delegation
    /// engine must check this before any provider write.
    fn is_leader(&self) -> bool;

    /// Resolves when leadership is lost, so the caller can exit and let
    /// an external supervisor restart it.
    async fn lost(&self) -> CoordinationError;
}

/// Always-leader implementation for standalone deployments and tests
/// where `--leader-elect` is disabled.
pub struct SingleProcessLeader;

#[async_trait]
impl LeaderElection for SingleProcessLeader {
    async fn acquire(&self) -> Result<(), CoordinationError> {
        Ok(())
    }

    fn is_leader(&self) -> bool {
        true
    }

    async fn lost(&self) -> CoordinationError {
        std::future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn single_process_leader_is_always_leader() {
        let leader = SingleProcessLeader;
        leader.acquire().await.unwrap();
        assert!(leader.is_leader());
    }
}
