// SPDX-License-Identifier: MIT

#![allow(clippy::module_name_repetitions)]

//! # dns-authority
//!
//! `dns-authority` is the reconciliation engine behind a multi-cluster DNS
//! authority: it continuously translates a declarative set of desired
//! per-cluster DNS records into a consistent, multi-owner authoritative
//! state inside one or more managed DNS zones.
//!
//! ## Modules
//!
//! - [`endpoint`] — the canonical `Endpoint`/`DesiredRecord`/`Zone` data model
//! - [`provider`] — the pluggable back-end abstraction (Route53, Cloud DNS, Azure DNS, CoreDNS, in-memory)
//! - [`registry`] — the TXT-backed ownership registry
//! - [`planner`] — create/update/delete change-set computation
//! - [`health`] — the health-probe worker pool
//! - [`delegation`] — aggregation of per-cluster desired records into one authoritative record
//! - [`reconcile`] — the per-record reconcile loop
//! - [`cluster`] — remote-cluster client pool and the desired-record source contract
//! - [`coordination`] — leader election contract
//! - [`config`] — CLI/env configuration surface
//! - [`telemetry`] — logging initialization and Prometheus metrics
//! - [`errors`] — the unified error taxonomy

pub mod cluster;
pub mod config;
pub mod constants;
pub mod coordination;
pub mod delegation;
pub mod endpoint;
pub mod errors;
pub mod health;
pub mod planner;
pub mod provider;
pub mod reconcile;
pub mod registry;
pub mod telemetry;
