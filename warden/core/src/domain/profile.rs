// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! Attribute and obligation identifiers of the grid authorization profile.
//!
//! The identifiers live under the `http://authz-interop.org/xacml`
//! namespace, with the account-mapping trigger obligation under
//! `http://glite.org/xacml`.

/// Subject attribute ids consumed and produced by the identity PIPs.
pub mod subject {
    /// PEM-encoded certificate chain, the X.509 PIP input.
    pub const CERT_CHAIN: &str = "http://authz-interop.org/xacml/subject/cert-chain";
    /// End-entity subject DN in RFC 2253 form.
    pub const X509_ID: &str = "http://authz-interop.org/xacml/subject/subject-x509-id";
    /// End-entity issuer DN in RFC 2253 form.
    pub const X509_ISSUER: &str = "http://authz-interop.org/xacml/subject/subject-x509-issuer";
    /// End-entity serial number as a decimal string.
    pub const SERIAL_NUMBER: &str =
        "http://authz-interop.org/xacml/subject/certificate-serial-number";
    /// Virtual organisation asserted by the VOMS attribute certificate.
    pub const VO: &str = "http://authz-interop.org/xacml/subject/vo";
    /// First FQAN of the VOMS attribute certificate.
    pub const PRIMARY_FQAN: &str = "http://authz-interop.org/xacml/subject/voms-primary-fqan";
    /// All FQANs, primary included.
    pub const FQAN: &str = "http://authz-interop.org/xacml/subject/voms-fqan";
}

/// Obligation ids exchanged with the enforcement point.
pub mod obligation {
    /// Trigger obligation: the PDP asks the PEP to map the subject onto a
    /// local execution environment.
    pub const LOCAL_ENVIRONMENT_MAP: &str =
        "http://glite.org/xacml/obligation/local-environment-map";
    /// Resolved login name.
    pub const USERNAME: &str = "http://authz-interop.org/xacml/obligation/username";
    /// Resolved UID and primary GID.
    pub const UIDGID: &str = "http://authz-interop.org/xacml/obligation/uidgid";
    /// Resolved secondary GIDs, one assignment per group.
    pub const SECONDARY_GIDS: &str = "http://authz-interop.org/xacml/obligation/secondary-gids";
}

/// Attribute-assignment ids used inside the mapping obligations.
pub mod assignment {
    pub const USERNAME: &str = "http://authz-interop.org/xacml/attribute/username";
    pub const POSIX_UID: &str = "http://authz-interop.org/xacml/attribute/posix-uid";
    pub const POSIX_GID: &str = "http://authz-interop.org/xacml/attribute/posix-gid";
}

/// XACML 1.0 environment attribute ids injected by the time PIP.
pub mod environment {
    pub const CURRENT_TIME: &str = "urn:oasis:names:tc:xacml:1.0:environment:current-time";
    pub const CURRENT_DATE: &str = "urn:oasis:names:tc:xacml:1.0:environment:current-date";
    pub const CURRENT_DATE_TIME: &str =
        "urn:oasis:names:tc:xacml:1.0:environment:current-dateTime";
}
