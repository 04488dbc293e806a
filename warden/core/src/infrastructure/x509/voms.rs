// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! VOMS attribute certificates.
//!
//! A VOMS server issues an RFC 5755 attribute certificate bound to the
//! holder's end-entity certificate and embeds it in the proxy via the
//! non-critical `acseq` extension. The AC asserts the holder's VO
//! membership as FQANs.
//!
//! The ASN.1 definitions below mirror the PKIX attribute-certificate
//! grammar, specialized to the fields VOMS actually emits so the DN and
//! FQAN payloads decode into readable string types. Trust is established
//! through the LSC directory: the AC issuer's certificate DN chain must be
//! listed for the VO (the signature on the enclosing chain is covered by
//! PKIX validation).

use std::sync::Arc;

use chrono::Utc;
use rasn::types::{
    BitString, GeneralizedTime, Ia5String, Integer, ObjectIdentifier, PrintableString,
    SequenceOf, SetOf, TeletexString, Utf8String,
};
use rasn::{AsnType, Decode};
use rasn_pkix::attribute_certificate::{IetfAttrSyntax, IetfAttrSyntaxValue};
use rasn_pkix::{AlgorithmIdentifier, Extensions};
use thiserror::Error;
use tracing::warn;

use crate::domain::dn::Dn;
use crate::domain::fqan::{Fqan, FqanError};
use crate::infrastructure::truststore::VomsTrustStore;
use crate::infrastructure::x509::{CertChain, ChainError, EndEntityInfo};

/// The `acseq` extension carrying a SEQUENCE OF AttributeCertificate.
pub const ACSEQ_OID: &str = "1.3.6.1.4.1.8005.100.100.5";

/// The VOMS FQAN attribute type.
const FQAN_ATTRIBUTE_ARC: [u32; 10] = [1, 3, 6, 1, 4, 1, 8005, 100, 100, 4];

#[derive(Debug, Error)]
pub enum VomsError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("attribute certificate does not decode: {0}")]
    Decode(String),

    #[error("chain carries {count} attribute certificates, at most one is allowed")]
    MultipleAcs { count: usize },

    #[error("attribute certificate carries no FQAN attribute")]
    NoFqans,

    #[error(transparent)]
    Fqan(#[from] FqanError),

    #[error("attribute certificate is outside its validity period")]
    OutsideValidity,

    #[error("attribute certificate has no issuer directory name")]
    NoIssuerName,

    #[error("attribute certificate issuer {issuer:?} is not trusted for VO {vo:?}")]
    UntrustedIssuer { vo: String, issuer: String },

    #[error("attribute certificate holder does not match the end-entity certificate")]
    HolderMismatch,
}

// ---------------------------------------------------------------------------
// ASN.1 model (RFC 5755 profile as emitted by VOMS)
// ---------------------------------------------------------------------------

type AcSequence = SequenceOf<AttributeCertificate>;

#[derive(AsnType, Decode, Clone, Debug)]
pub struct AttributeCertificate {
    pub info: AcInfo,
    pub signature_algorithm: AlgorithmIdentifier,
    pub signature_value: BitString,
}

#[derive(AsnType, Decode, Clone, Debug)]
pub struct AcInfo {
    pub version: Integer,
    pub holder: AcHolder,
    pub issuer: AcIssuer,
    pub signature: AlgorithmIdentifier,
    pub serial_number: Integer,
    pub validity: AcValidity,
    pub attributes: SequenceOf<AcAttribute>,
    pub issuer_unique_id: Option<BitString>,
    pub extensions: Option<Extensions>,
}

#[derive(AsnType, Decode, Clone, Debug)]
pub struct AcHolder {
    #[rasn(tag(0))]
    pub base_certificate_id: Option<AcIssuerSerial>,
    #[rasn(tag(1))]
    pub entity_name: Option<SequenceOf<AcGeneralName>>,
}

#[derive(AsnType, Decode, Clone, Debug)]
#[rasn(choice)]
pub enum AcIssuer {
    V1(SequenceOf<AcGeneralName>),
    #[rasn(tag(0))]
    V2(AcV2Form),
}

#[derive(AsnType, Decode, Clone, Debug)]
pub struct AcV2Form {
    pub issuer_name: Option<SequenceOf<AcGeneralName>>,
    #[rasn(tag(0))]
    pub base_certificate_id: Option<AcIssuerSerial>,
}

#[derive(AsnType, Decode, Clone, Debug)]
pub struct AcIssuerSerial {
    pub issuer: SequenceOf<AcGeneralName>,
    pub serial: Integer,
    pub issuer_uid: Option<BitString>,
}

#[derive(AsnType, Decode, Clone, Debug)]
pub struct AcValidity {
    pub not_before: GeneralizedTime,
    pub not_after: GeneralizedTime,
}

#[derive(AsnType, Decode, Clone, Debug)]
pub struct AcAttribute {
    pub r#type: ObjectIdentifier,
    pub values: SetOf<IetfAttrSyntax>,
}

/// The GeneralName alternatives VOMS emits: a directory name for the
/// issuer, a URI for the policy authority.
#[derive(AsnType, Decode, Clone, Debug, PartialEq, Eq, Hash)]
#[rasn(choice)]
pub enum AcGeneralName {
    #[rasn(tag(1))]
    Rfc822(Ia5String),
    #[rasn(tag(2))]
    Dns(Ia5String),
    #[rasn(tag(4))]
    Directory(AcName),
    #[rasn(tag(6))]
    Uri(Ia5String),
}

#[derive(AsnType, Decode, Clone, Debug, PartialEq, Eq, Hash)]
#[rasn(choice)]
pub enum AcName {
    RdnSequence(SequenceOf<SetOf<AcAttributeTypeAndValue>>),
}

#[derive(AsnType, Decode, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AcAttributeTypeAndValue {
    pub r#type: ObjectIdentifier,
    pub value: AcDirectoryString,
}

#[derive(AsnType, Decode, Clone, Debug, PartialEq, Eq, Hash)]
#[rasn(choice)]
pub enum AcDirectoryString {
    Printable(PrintableString),
    Teletex(TeletexString),
    Utf8(Utf8String),
    Ia5(Ia5String),
}

impl std::fmt::Display for AcDirectoryString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcDirectoryString::Printable(s) => write!(f, "{s}"),
            AcDirectoryString::Teletex(s) => write!(f, "{s}"),
            AcDirectoryString::Utf8(s) => write!(f, "{s}"),
            AcDirectoryString::Ia5(s) => write!(f, "{s}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Extraction and validation
// ---------------------------------------------------------------------------

/// Attributes asserted by a validated VOMS AC.
#[derive(Debug, Clone)]
pub struct VomsAttributes {
    pub vo: String,
    pub primary_fqan: Fqan,
    /// All FQANs, primary first, in certificate order.
    pub fqans: Vec<Fqan>,
}

/// Locate the AC embedded in the chain. Exactly zero or one is acceptable.
pub fn extract_ac(chain: &CertChain) -> Result<Option<AttributeCertificate>, VomsError> {
    let mut acs = Vec::new();
    for index in 0..chain.len() {
        let cert = chain.parse(index)?;
        for ext in cert.extensions() {
            if ext.oid.to_id_string() != ACSEQ_OID {
                continue;
            }
            let sequence: AcSequence = rasn::der::decode(ext.value)
                .map_err(|e| VomsError::Decode(e.to_string()))?;
            acs.extend(sequence);
        }
    }
    match acs.len() {
        0 => Ok(None),
        1 => Ok(Some(acs.remove(0))),
        count => Err(VomsError::MultipleAcs { count }),
    }
}

/// Validates ACs against the VOMS trust store and the holder's end-entity
/// certificate.
pub struct AcValidator {
    store: Arc<VomsTrustStore>,
}

impl AcValidator {
    pub fn new(store: Arc<VomsTrustStore>) -> Self {
        Self { store }
    }

    pub fn validate(
        &self,
        ac: &AttributeCertificate,
        end_entity: &EndEntityInfo,
    ) -> Result<VomsAttributes, VomsError> {
        let now = Utc::now().fixed_offset();
        if now < ac.info.validity.not_before || now > ac.info.validity.not_after {
            return Err(VomsError::OutsideValidity);
        }

        self.check_holder(ac, end_entity)?;

        let (fqans, policy_authority) = extract_fqans(ac)?;
        let primary_fqan = fqans.first().cloned().ok_or(VomsError::NoFqans)?;
        let vo = policy_authority
            .as_deref()
            .and_then(vo_from_policy_authority)
            .unwrap_or_else(|| primary_fqan.vo().to_string());

        let issuer = ac_issuer_dn(ac).ok_or(VomsError::NoIssuerName)?;
        if !self.store.snapshot().is_trusted(&vo, &issuer) {
            return Err(VomsError::UntrustedIssuer {
                vo,
                issuer: issuer.to_string(),
            });
        }

        Ok(VomsAttributes {
            vo,
            primary_fqan,
            fqans,
        })
    }

    /// The AC's holder must name the end-entity certificate by issuer DN
    /// and serial number. A holder without a baseCertificateID cannot be
    /// bound and is rejected.
    fn check_holder(
        &self,
        ac: &AttributeCertificate,
        end_entity: &EndEntityInfo,
    ) -> Result<(), VomsError> {
        let base = ac
            .info
            .holder
            .base_certificate_id
            .as_ref()
            .ok_or(VomsError::HolderMismatch)?;
        let holder_issuer =
            first_directory_name(&base.issuer).ok_or(VomsError::HolderMismatch)?;
        if holder_issuer != end_entity.issuer || base.serial.to_string() != end_entity.serial {
            return Err(VomsError::HolderMismatch);
        }
        Ok(())
    }
}

fn extract_fqans(
    ac: &AttributeCertificate,
) -> Result<(Vec<Fqan>, Option<String>), VomsError> {
    let fqan_arc: &[u32] = &FQAN_ATTRIBUTE_ARC;
    let mut fqans = Vec::new();
    let mut policy_authority = None;

    for attribute in &ac.info.attributes {
        if attribute.r#type.as_ref() != fqan_arc {
            continue;
        }
        for syntax in attribute.values.to_vec() {
            if policy_authority.is_none() {
                policy_authority = first_uri(syntax.policy_authority.as_deref());
            }
            for value in &syntax.values {
                let raw = match value {
                    IetfAttrSyntaxValue::Octets(octets) => {
                        String::from_utf8_lossy(octets).into_owned()
                    }
                    IetfAttrSyntaxValue::String(s) => s.clone(),
                    IetfAttrSyntaxValue::Oid(oid) => {
                        warn!(?oid, "Ignoring OID-valued FQAN attribute entry");
                        continue;
                    }
                };
                fqans.push(Fqan::parse(&raw)?);
            }
        }
    }

    if fqans.is_empty() {
        return Err(VomsError::NoFqans);
    }
    Ok((fqans, policy_authority))
}

/// VOMS policy authorities read `<vo>://<host>:<port>`.
fn vo_from_policy_authority(uri: &str) -> Option<String> {
    let (vo, _) = uri.split_once("://")?;
    (!vo.is_empty()).then(|| vo.to_string())
}

fn ac_issuer_dn(ac: &AttributeCertificate) -> Option<Dn> {
    let names = match &ac.info.issuer {
        AcIssuer::V1(names) => names,
        AcIssuer::V2(form) => form.issuer_name.as_ref()?,
    };
    first_directory_name(names)
}

fn first_directory_name(names: &[AcGeneralName]) -> Option<Dn> {
    names.iter().find_map(|name| match name {
        AcGeneralName::Directory(AcName::RdnSequence(rdns)) => {
            let mut components: Vec<(String, String)> = Vec::new();
            for rdn in rdns {
                for atv in rdn.to_vec() {
                    components.push((
                        dotted_to_short_name(&atv.r#type),
                        atv.value.to_string(),
                    ));
                }
            }
            if components.is_empty() {
                return None;
            }
            // ASN.1 names are least specific first; Dn wants RFC 2253 order.
            components.reverse();
            Some(Dn::from_rdns(components))
        }
        _ => None,
    })
}

/// The policy authority rides in stock PKIX GeneralNames; only the URI
/// alternative carries the VOMS server address.
fn first_uri(names: Option<&[rasn_pkix::GeneralName]>) -> Option<String> {
    names?.iter().find_map(|name| match name {
        rasn_pkix::GeneralName::Uri(uri) => Some(uri.to_string()),
        _ => None,
    })
}

fn dotted_to_short_name(oid: &ObjectIdentifier) -> String {
    let dotted = oid
        .as_ref()
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(".");
    super::short_name(&dotted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vo_from_policy_authority() {
        assert_eq!(
            vo_from_policy_authority("atlas://voms.example.org:15001"),
            Some("atlas".to_string())
        );
        assert_eq!(vo_from_policy_authority("no-scheme"), None);
        assert_eq!(vo_from_policy_authority("://host"), None);
    }

    #[test]
    fn test_garbage_acseq_does_not_decode() {
        let result: Result<AcSequence, _> = rasn::der::decode(&[0x01, 0x02, 0x03]);
        assert!(result.is_err());
    }
}
