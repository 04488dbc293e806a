// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! Policy information points.
//!
//! A PIP enriches an incoming request with attributes before the PDP sees
//! it. PIPs run sequentially in configured order; each observes the
//! mutations of its predecessors. A PIP that fails poisons the request
//! (the decision becomes Indeterminate) but never the process.
//!
//! Implementations are linked statically and instantiated through the
//! registry: configuration sections name a registry tag in `parserClass`
//! and the registry calls the matching constructor with the section.

pub mod static_attrs;
pub mod time;
pub mod whitelist;
pub mod x509;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::config::{ConfigError, SectionConfig, SecurityConfig};
use crate::domain::Request;
use crate::infrastructure::truststore::{CaStore, VomsTrustStore};

#[derive(Debug, Error)]
pub enum PipError {
    #[error("PIP {pip} failed: {reason}")]
    Failed { pip: String, reason: String },

    #[error("PIP {pip}: trust store unavailable: {reason}")]
    TrustStoreUnavailable { pip: String, reason: String },
}

impl PipError {
    pub fn failed(pip: &str, reason: impl std::fmt::Display) -> Self {
        Self::Failed {
            pip: pip.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A request enrichment stage.
#[async_trait]
pub trait Pip: Send + Sync {
    /// Instance id, from the configuration section name.
    fn id(&self) -> &str;

    /// Apply this PIP to the request. Returns `true` when the request was
    /// touched, `false` when the PIP did not apply (which is not an error).
    async fn populate(&self, request: &mut Request) -> Result<bool, PipError>;
}

/// Construction context shared by every PIP factory. Carries the security
/// settings a PIP may need beyond its own section and collects the trust
/// stores factories open, so the runtime can schedule their refreshers.
pub struct PipContext<'a> {
    pub security: &'a SecurityConfig,
    ca_stores: Mutex<Vec<Arc<CaStore>>>,
    voms_stores: Mutex<Vec<Arc<VomsTrustStore>>>,
}

impl<'a> PipContext<'a> {
    pub fn new(security: &'a SecurityConfig) -> Self {
        Self {
            security,
            ca_stores: Mutex::new(Vec::new()),
            voms_stores: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn register_ca_store(&self, store: Arc<CaStore>) {
        self.ca_stores.lock().push(store);
    }

    pub(crate) fn register_voms_store(&self, store: Arc<VomsTrustStore>) {
        self.voms_stores.lock().push(store);
    }

    /// The trust stores opened while building the PIP chain.
    pub fn into_trust_stores(self) -> (Vec<Arc<CaStore>>, Vec<Arc<VomsTrustStore>>) {
        (
            self.ca_stores.into_inner(),
            self.voms_stores.into_inner(),
        )
    }
}

type PipFactory = fn(&SectionConfig, &PipContext<'_>) -> Result<Arc<dyn Pip>, ConfigError>;

/// Registry tag → constructor, populated at compile time.
const REGISTRY: &[(&str, PipFactory)] = &[
    (x509::TAG, x509::X509Pip::from_section),
    (static_attrs::TAG, static_attrs::StaticPip::from_section),
    (whitelist::TAG, whitelist::WhitelistPip::from_section),
    (time::TAG, time::TimePip::from_section),
];

/// Instantiate the PIP named by the section's `parserClass`.
pub fn create_pip(
    section: &SectionConfig,
    context: &PipContext<'_>,
) -> Result<Arc<dyn Pip>, ConfigError> {
    let factory = REGISTRY
        .iter()
        .find(|(tag, _)| *tag == section.parser_class)
        .map(|(_, factory)| factory)
        .ok_or_else(|| ConfigError::UnknownParser {
            section: section.name.clone(),
            parser: section.parser_class.clone(),
        })?;
    factory(section, context)
}
