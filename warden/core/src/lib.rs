// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! # warden-core
//!
//! Core of the WARDEN grid authorization service: a policy enforcement
//! point in front of an external XACML policy decision point.
//!
//! A request travels through three phases: policy information points
//! enrich it with attributes (X.509/VOMS identity extraction among them),
//! the PDP decides, and obligation handlers post-process the decision,
//! most notably by resolving the grid subject to a local POSIX account
//! with pool-account leases on a shared gridmapdir.
//!
//! ## Layer structure
//!
//! ```text
//! presentation/   <- service endpoint, admin channel (axum)
//!     |
//! application/    <- pipeline, PIPs, obligation handlers, account mapper
//!     |
//! domain/         <- XACML model, FQANs, DNs, POSIX accounts
//!     |
//! infrastructure/ <- gridmap stores, gridmapdir, /etc/passwd, X.509, PDP
//! ```

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod metrics;
pub mod presentation;
