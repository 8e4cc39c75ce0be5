// SPDX-License-Identifier: MIT

//! Concrete [`super::Provider`] implementations.

pub mod aws_route53;
pub mod azure_dns;
pub mod coredns;
pub mod gcp_clouddns;
pub mod inmemory;
