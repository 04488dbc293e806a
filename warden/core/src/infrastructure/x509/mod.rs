// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! Certificate chain handling for the identity PIP.
//!
//! A chain arrives as a PEM blob in the request subject. The blob may hold
//! the end-entity certificate, intermediate CAs, and RFC 3820 proxy
//! certificates in any order; the end-entity is selected as the non-CA,
//! non-proxy leaf. All parsing is done on demand over the owned DER bytes
//! because the parser borrows from its input.

pub mod validator;
pub mod voms;

use thiserror::Error;
use tracing::warn;
use x509_parser::prelude::*;

use crate::domain::dn::Dn;

/// RFC 3820 proxyCertInfo extension.
pub const PROXY_CERT_INFO_OID: &str = "1.3.6.1.5.5.7.1.14";

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("invalid PEM in certificate chain: {0}")]
    Pem(String),

    #[error("chain contains no CERTIFICATE block")]
    Empty,

    #[error("certificate {index} in chain is not parseable: {reason}")]
    Der { index: usize, reason: String },

    #[error("certificate {subject:?} is not an X.509 v3 certificate")]
    NotVersion3 { subject: String },

    #[error("no end-entity certificate in chain (every certificate is a CA or a proxy)")]
    NoEndEntity,
}

/// Identity attributes extracted from the end-entity certificate.
#[derive(Debug, Clone)]
pub struct EndEntityInfo {
    pub subject: Dn,
    pub issuer: Dn,
    /// Serial number as a decimal string.
    pub serial: String,
}

/// An owned, parse-on-demand certificate chain.
#[derive(Debug, Clone)]
pub struct CertChain {
    ders: Vec<Vec<u8>>,
}

impl CertChain {
    /// Parse a PEM blob into a chain. Every certificate must be X.509 v3.
    pub fn from_pem(pem_blob: &str) -> Result<CertChain, ChainError> {
        let blocks =
            ::pem::parse_many(pem_blob.as_bytes()).map_err(|e| ChainError::Pem(e.to_string()))?;
        let ders: Vec<Vec<u8>> = blocks
            .into_iter()
            .filter(|block| block.tag() == "CERTIFICATE")
            .map(|block| block.contents().to_vec())
            .collect();
        if ders.is_empty() {
            return Err(ChainError::Empty);
        }

        let chain = CertChain { ders };
        for index in 0..chain.len() {
            let cert = chain.parse(index)?;
            if cert.version() != X509Version::V3 {
                return Err(ChainError::NotVersion3 {
                    subject: x509_name_to_dn(cert.subject()).to_string(),
                });
            }
        }
        Ok(chain)
    }

    pub fn len(&self) -> usize {
        self.ders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ders.is_empty()
    }

    pub fn der(&self, index: usize) -> &[u8] {
        &self.ders[index]
    }

    pub(crate) fn parse(&self, index: usize) -> Result<X509Certificate<'_>, ChainError> {
        let (_, cert) =
            X509Certificate::from_der(&self.ders[index]).map_err(|e| ChainError::Der {
                index,
                reason: e.to_string(),
            })?;
        Ok(cert)
    }

    /// True when at least one certificate carries the RFC 3820
    /// proxyCertInfo extension.
    pub fn contains_proxy(&self) -> Result<bool, ChainError> {
        for index in 0..self.len() {
            if is_proxy(&self.parse(index)?) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Index of the non-CA, non-proxy leaf.
    pub fn end_entity_index(&self) -> Result<usize, ChainError> {
        for index in 0..self.len() {
            let cert = self.parse(index)?;
            if !is_ca(&cert) && !is_proxy(&cert) {
                return Ok(index);
            }
        }
        Err(ChainError::NoEndEntity)
    }

    /// Subject, issuer, and serial of the end-entity certificate.
    pub fn end_entity_info(&self) -> Result<EndEntityInfo, ChainError> {
        let index = self.end_entity_index()?;
        let cert = self.parse(index)?;
        Ok(EndEntityInfo {
            subject: x509_name_to_dn(cert.subject()),
            issuer: x509_name_to_dn(cert.issuer()),
            serial: cert.tbs_certificate.serial.to_string(),
        })
    }
}

pub(crate) fn is_ca(cert: &X509Certificate<'_>) -> bool {
    cert.basic_constraints()
        .ok()
        .flatten()
        .map(|bc| bc.value.ca)
        .unwrap_or(false)
}

pub(crate) fn is_proxy(cert: &X509Certificate<'_>) -> bool {
    cert.extensions()
        .iter()
        .any(|ext| ext.oid.to_id_string() == PROXY_CERT_INFO_OID)
}

/// Convert a parsed X.509 name into the domain DN value. Attribute types
/// outside the well-known set keep their dotted OID.
pub(crate) fn x509_name_to_dn(name: &X509Name<'_>) -> Dn {
    let rdns: Vec<(String, String)> = name
        .iter_attributes()
        .map(|atv| {
            let attr_type = short_name(&atv.attr_type().to_id_string());
            let value = match atv.as_str() {
                Ok(s) => s.to_string(),
                Err(_) => {
                    warn!(attr_type = %attr_type, "Non-string attribute value in DN, using lossy form");
                    String::from_utf8_lossy(atv.attr_value().data).into_owned()
                }
            };
            (attr_type, value)
        })
        .collect();
    // Certificates store names least specific first; RFC 2253 order is the
    // reverse.
    Dn::from_rdns(rdns.into_iter().rev().collect())
}

fn short_name(oid: &str) -> String {
    match oid {
        "2.5.4.3" => "CN",
        "2.5.4.4" => "SN",
        "2.5.4.5" => "serialNumber",
        "2.5.4.6" => "C",
        "2.5.4.7" => "L",
        "2.5.4.8" => "ST",
        "2.5.4.10" => "O",
        "2.5.4.11" => "OU",
        "2.5.4.42" => "GN",
        "0.9.2342.19200300.100.1.1" => "UID",
        "0.9.2342.19200300.100.1.25" => "DC",
        "1.2.840.113549.1.9.1" => "emailAddress",
        other => other,
    }
    .to_string()
}
