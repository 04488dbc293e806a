// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! PKIX path validation against the CA trust store.
//!
//! Builds the issuing path from the end-entity certificate up to a trust
//! anchor, checking validity windows, CA basic constraints, signatures, and
//! revocation. Proxy certificates hang below the end-entity and are
//! verified against their signers but take no part in the CA path.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;
use x509_parser::prelude::*;

use crate::domain::dn::Dn;
use crate::infrastructure::truststore::{CaStore, TrustAnchors};
use crate::infrastructure::x509::{is_ca, is_proxy, x509_name_to_dn, CertChain, ChainError};

/// Upper bound on path length; grid CA hierarchies are shallow.
const MAX_PATH_DEPTH: usize = 16;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("certificate {subject:?} is outside its validity period")]
    Expired { subject: String },

    #[error("no trust path: issuer {issuer:?} is neither in the chain nor a trust anchor")]
    UntrustedIssuer { issuer: String },

    #[error("signature of certificate {subject:?} does not verify against its issuer")]
    BadSignature { subject: String },

    #[error("in-chain issuer {subject:?} is not a CA certificate")]
    NotACa { subject: String },

    #[error("certificate {subject:?} (serial {serial}) is revoked")]
    Revoked { subject: String, serial: String },

    #[error("no CRL available for issuer {issuer:?} and CRLs are required")]
    MissingCrl { issuer: String },

    #[error("CRL of issuer {issuer:?} is stale")]
    StaleCrl { issuer: String },

    #[error("proxy certificate {subject:?} has no signer in the chain")]
    DanglingProxy { subject: String },

    #[error("certification path exceeds {MAX_PATH_DEPTH} certificates")]
    PathTooLong,
}

/// Validates end-entity chains against a shared CA store snapshot.
pub struct PkixValidator {
    store: Arc<CaStore>,
    require_crls: bool,
}

impl PkixValidator {
    pub fn new(store: Arc<CaStore>, require_crls: bool) -> Self {
        Self {
            store,
            require_crls,
        }
    }

    pub fn validate(&self, chain: &CertChain) -> Result<(), ValidationError> {
        let anchors = self.store.snapshot();
        self.verify_proxies(chain)?;
        self.verify_path(chain, &anchors)
    }

    /// Each proxy must be inside its validity window and signed by the
    /// chain certificate whose subject is the proxy's issuer.
    fn verify_proxies(&self, chain: &CertChain) -> Result<(), ValidationError> {
        for index in 0..chain.len() {
            let proxy = chain.parse(index)?;
            if !is_proxy(&proxy) {
                continue;
            }
            let subject = x509_name_to_dn(proxy.subject()).to_string();
            if !proxy.validity().is_valid() {
                return Err(ValidationError::Expired { subject });
            }
            let issuer_dn = x509_name_to_dn(proxy.issuer());
            let signer_index = find_by_subject(chain, &issuer_dn, index)?
                .ok_or_else(|| ValidationError::DanglingProxy {
                    subject: subject.clone(),
                })?;
            let signer = chain.parse(signer_index)?;
            proxy
                .verify_signature(Some(&signer.tbs_certificate.subject_pki))
                .map_err(|_| ValidationError::BadSignature { subject })?;
        }
        Ok(())
    }

    fn verify_path(
        &self,
        chain: &CertChain,
        anchors: &TrustAnchors,
    ) -> Result<(), ValidationError> {
        let mut current_index = chain.end_entity_index()?;
        let mut visited = HashSet::from([current_index]);

        for _depth in 0..MAX_PATH_DEPTH {
            let current = chain.parse(current_index)?;
            let subject = x509_name_to_dn(current.subject()).to_string();
            if !current.validity().is_valid() {
                return Err(ValidationError::Expired { subject });
            }

            let issuer_dn = x509_name_to_dn(current.issuer());

            if let Some(anchor_der) = anchors.anchor_for(&issuer_dn) {
                let (_, anchor) =
                    X509Certificate::from_der(anchor_der).map_err(|e| ChainError::Der {
                        index: usize::MAX,
                        reason: e.to_string(),
                    })?;
                if !anchor.validity().is_valid() {
                    return Err(ValidationError::Expired {
                        subject: issuer_dn.to_string(),
                    });
                }
                current
                    .verify_signature(Some(&anchor.tbs_certificate.subject_pki))
                    .map_err(|_| ValidationError::BadSignature { subject })?;
                self.check_revocation(&current, &issuer_dn, &anchor, anchors)?;
                debug!(anchor = %issuer_dn, "Certification path anchored");
                return Ok(());
            }

            let issuer_index = find_by_subject(chain, &issuer_dn, current_index)?
                .filter(|index| !visited.contains(index))
                .ok_or_else(|| ValidationError::UntrustedIssuer {
                    issuer: issuer_dn.to_string(),
                })?;
            let issuer = chain.parse(issuer_index)?;
            if !is_ca(&issuer) {
                return Err(ValidationError::NotACa {
                    subject: issuer_dn.to_string(),
                });
            }
            current
                .verify_signature(Some(&issuer.tbs_certificate.subject_pki))
                .map_err(|_| ValidationError::BadSignature { subject })?;
            self.check_revocation(&current, &issuer_dn, &issuer, anchors)?;

            visited.insert(issuer_index);
            current_index = issuer_index;
        }

        Err(ValidationError::PathTooLong)
    }

    /// Revocation check for one link, against the CRLs published by the
    /// certificate's issuer.
    fn check_revocation(
        &self,
        cert: &X509Certificate<'_>,
        issuer_dn: &Dn,
        issuer: &X509Certificate<'_>,
        anchors: &TrustAnchors,
    ) -> Result<(), ValidationError> {
        let crl_ders = anchors.crls_for(issuer_dn);
        if crl_ders.is_empty() {
            if self.require_crls {
                return Err(ValidationError::MissingCrl {
                    issuer: issuer_dn.to_string(),
                });
            }
            return Ok(());
        }

        let now = chrono::Utc::now().timestamp();
        for der in crl_ders {
            let (_, crl) = CertificateRevocationList::from_der(der).map_err(|e| {
                ChainError::Der {
                    index: usize::MAX,
                    reason: e.to_string(),
                }
            })?;
            if crl
                .verify_signature(&issuer.tbs_certificate.subject_pki)
                .is_err()
            {
                return Err(ValidationError::BadSignature {
                    subject: format!("CRL of {issuer_dn}"),
                });
            }
            if let Some(next_update) = crl.next_update() {
                if next_update.timestamp() < now && self.require_crls {
                    return Err(ValidationError::StaleCrl {
                        issuer: issuer_dn.to_string(),
                    });
                }
            }
            let serial = &cert.tbs_certificate.serial;
            if crl
                .iter_revoked_certificates()
                .any(|revoked| &revoked.user_certificate == serial)
            {
                return Err(ValidationError::Revoked {
                    subject: x509_name_to_dn(cert.subject()).to_string(),
                    serial: serial.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Index of a chain certificate whose subject equals `subject`, excluding
/// `skip` (a certificate never issues itself in a grid chain; self-signed
/// roots live in the trust store).
fn find_by_subject(
    chain: &CertChain,
    subject: &Dn,
    skip: usize,
) -> Result<Option<usize>, ChainError> {
    for index in 0..chain.len() {
        if index == skip {
            continue;
        }
        let cert = chain.parse(index)?;
        if &x509_name_to_dn(cert.subject()) == subject {
            return Ok(Some(index));
        }
    }
    Ok(None)
}
