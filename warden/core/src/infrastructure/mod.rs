// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! Adapters over the outside world: the gridmap files, the gridmapdir, the
//! local account database, trust material, certificates, and the PDP.

pub mod dfpm;
pub mod gridmapdir;
pub mod pdp;
pub mod posix;
pub mod truststore;
pub mod x509;
