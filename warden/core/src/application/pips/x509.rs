// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! X.509 / VOMS identity extraction.
//!
//! Reads the PEM chain off each request subject, optionally insists on an
//! RFC 3820 proxy, optionally runs PKIX validation, and publishes the
//! end-entity identity (and VOMS VO/FQAN assertions when present) as
//! subject attributes.
//!
//! A subject that does not carry a usable chain is skipped, not failed:
//! the PDP then decides over the unenriched subject. Validation failures
//! on a chain that *is* present fail the PIP.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::{ConfigError, SectionConfig};
use crate::domain::attribute::data_types;
use crate::domain::profile::subject as subject_ids;
use crate::domain::{Attribute, Request};
use crate::infrastructure::truststore::{CaStore, VomsTrustStore};
use crate::infrastructure::x509::validator::PkixValidator;
use crate::infrastructure::x509::voms::{extract_ac, AcValidator};
use crate::infrastructure::x509::{CertChain, ChainError};

use super::{Pip, PipContext, PipError};

pub const TAG: &str = "x509-pip";

pub struct X509Pip {
    id: String,
    require_proxy: bool,
    pkix: Option<PkixValidator>,
    voms: Option<AcValidator>,
}

impl X509Pip {
    /// Section keys: `requireProxy` (default false), `performPKIXValidation`
    /// (default true, needs `SECURITY.trustInfoDir`), `vomsInfoDir`
    /// (enables AC support). Trust stores load eagerly; a broken store is a
    /// startup failure.
    pub fn from_section(
        section: &SectionConfig,
        context: &PipContext<'_>,
    ) -> Result<Arc<dyn Pip>, ConfigError> {
        let require_proxy = section.get_bool("requireProxy", false);

        let pkix = if section.get_bool("performPKIXValidation", true) {
            let trust_dir = context.security.trust_info_dir.as_ref().ok_or_else(|| {
                ConfigError::MissingKey {
                    section: "SECURITY".to_string(),
                    key: "trustInfoDir".to_string(),
                }
            })?;
            let store =
                Arc::new(
                    CaStore::open(trust_dir).map_err(|e| ConfigError::InvalidValue {
                        section: "SECURITY".to_string(),
                        key: "trustInfoDir".to_string(),
                        reason: e.to_string(),
                    })?,
                );
            context.register_ca_store(Arc::clone(&store));
            Some(PkixValidator::new(store, context.security.require_crls))
        } else {
            None
        };

        let voms = match section.get_str("vomsInfoDir") {
            Some(dir) => {
                let store = Arc::new(VomsTrustStore::open(&dir).map_err(|e| {
                    ConfigError::InvalidValue {
                        section: section.name.clone(),
                        key: "vomsInfoDir".to_string(),
                        reason: e.to_string(),
                    }
                })?);
                context.register_voms_store(Arc::clone(&store));
                Some(AcValidator::new(store))
            }
            None => None,
        };

        Ok(Arc::new(X509Pip {
            id: section.name.clone(),
            require_proxy,
            pkix,
            voms,
        }))
    }
}

#[async_trait]
impl Pip for X509Pip {
    fn id(&self) -> &str {
        &self.id
    }

    async fn populate(&self, request: &mut Request) -> Result<bool, PipError> {
        let mut applied = false;

        for subject in &mut request.subjects {
            let Some(pem_blob) = subject
                .attribute(subject_ids::CERT_CHAIN)
                .and_then(|attr| attr.value())
                .map(str::to_string)
            else {
                continue;
            };

            let chain = match CertChain::from_pem(&pem_blob) {
                Ok(chain) => chain,
                Err(e @ ChainError::NotVersion3 { .. }) => {
                    warn!(pip = %self.id, error = %e, "Skipping subject with pre-v3 certificate");
                    continue;
                }
                Err(e) => return Err(PipError::failed(&self.id, e)),
            };

            if self.require_proxy {
                let has_proxy = chain
                    .contains_proxy()
                    .map_err(|e| PipError::failed(&self.id, e))?;
                if !has_proxy {
                    warn!(pip = %self.id, "Chain carries no proxy certificate, skipping subject");
                    continue;
                }
            }

            if let Some(validator) = &self.pkix {
                validator
                    .validate(&chain)
                    .map_err(|e| PipError::failed(&self.id, e))?;
            }

            let info = chain
                .end_entity_info()
                .map_err(|e| PipError::failed(&self.id, e))?;
            debug!(pip = %self.id, subject = %info.subject, "Extracted end-entity identity");

            subject.add_attribute(
                Attribute::new(subject_ids::X509_ID, data_types::X500_NAME)
                    .with_value(info.subject.to_string()),
            );
            subject.add_attribute(
                Attribute::new(subject_ids::X509_ISSUER, data_types::X500_NAME)
                    .with_value(info.issuer.to_string()),
            );
            subject.add_attribute(
                Attribute::new(subject_ids::SERIAL_NUMBER, data_types::STRING)
                    .with_value(info.serial.clone()),
            );

            if let Some(ac_validator) = &self.voms {
                let ac = extract_ac(&chain).map_err(|e| PipError::failed(&self.id, e))?;
                if let Some(ac) = ac {
                    let asserted = ac_validator
                        .validate(&ac, &info)
                        .map_err(|e| PipError::failed(&self.id, e))?;

                    subject.add_attribute(
                        Attribute::new(subject_ids::VO, data_types::STRING)
                            .with_value(asserted.vo.clone()),
                    );
                    subject.add_attribute(
                        Attribute::new(subject_ids::PRIMARY_FQAN, data_types::STRING)
                            .with_value(asserted.primary_fqan.to_string()),
                    );
                    let mut fqans =
                        Attribute::new(subject_ids::FQAN, data_types::STRING);
                    for fqan in &asserted.fqans {
                        fqans.add_value(fqan.to_string());
                    }
                    subject.add_attribute(fqans);
                }
            }

            applied = true;
        }

        Ok(applied)
    }
}
