// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! X.500 distinguished names.
//!
//! Gridmap files traditionally carry DNs in the OpenSSL slash form
//! (`/C=CH/O=CERN/CN=Alice`) while certificate parsing yields RFC 2253
//! (`CN=Alice,O=CERN,C=CH`). Both forms parse into the same value, and
//! equality follows X.500 matching: attribute types and values compare
//! case-insensitively.
//!
//! Escaped separators inside attribute values are not interpreted; grid
//! subject names do not use them in practice.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed DN {input:?}: {reason}")]
pub struct DnError {
    input: String,
    reason: String,
}

impl DnError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// A distinguished name, stored as RDNs in RFC 2253 order
/// (most specific first).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dn {
    rdns: Vec<(String, String)>,
}

impl Dn {
    /// Build from already-split RDNs in RFC 2253 order. Used by the
    /// certificate layer, which extracts typed components itself.
    pub fn from_rdns(rdns: Vec<(String, String)>) -> Dn {
        Dn { rdns }
    }

    /// Parse either form, keyed on the leading `/` of the OpenSSL form.
    pub fn parse(input: &str) -> Result<Dn, DnError> {
        if input.starts_with('/') {
            Self::parse_openssl(input)
        } else {
            Self::parse_rfc2253(input)
        }
    }

    /// Parse `CN=Alice,O=CERN,C=CH`.
    pub fn parse_rfc2253(input: &str) -> Result<Dn, DnError> {
        let mut rdns = Vec::new();
        for component in input.split(',') {
            rdns.push(split_rdn(input, component.trim())?);
        }
        if rdns.is_empty() {
            return Err(DnError::new(input, "no components"));
        }
        Ok(Dn { rdns })
    }

    /// Parse `/C=CH/O=CERN/CN=Alice`; component order is reversed to
    /// RFC 2253 order.
    ///
    /// A component without `=` continues the previous value: service names
    /// such as `/CN=host/node.example.org` keep the slash in the CN.
    pub fn parse_openssl(input: &str) -> Result<Dn, DnError> {
        let stripped = input
            .strip_prefix('/')
            .ok_or_else(|| DnError::new(input, "must begin with '/'"))?;
        let mut rdns: Vec<(String, String)> = Vec::new();
        for component in stripped.split('/') {
            match component.split_once('=') {
                Some((attr_type, value)) if !attr_type.is_empty() => {
                    rdns.push((attr_type.to_string(), value.to_string()));
                }
                _ => match rdns.last_mut() {
                    Some(last) => {
                        last.1.push('/');
                        last.1.push_str(component);
                    }
                    None => {
                        return Err(DnError::new(
                            input,
                            format!("component {component:?} has no '='"),
                        ));
                    }
                },
            }
        }
        if rdns.is_empty() {
            return Err(DnError::new(input, "no components"));
        }
        rdns.reverse();
        Ok(Dn { rdns })
    }

    /// OpenSSL slash form, least specific first. This is the form encoded
    /// into gridmapdir subject keys.
    pub fn to_openssl_form(&self) -> String {
        let mut out = String::new();
        for (attr_type, value) in self.rdns.iter().rev() {
            out.push('/');
            out.push_str(attr_type);
            out.push('=');
            out.push_str(value);
        }
        out
    }
}

/// RFC 2253 rendering.
impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (attr_type, value)) in self.rdns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{attr_type}={value}")?;
        }
        Ok(())
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.rdns.len() == other.rdns.len()
            && self.rdns.iter().zip(&other.rdns).all(|(a, b)| {
                a.0.eq_ignore_ascii_case(&b.0) && a.1.eq_ignore_ascii_case(&b.1)
            })
    }
}

impl Eq for Dn {}

impl std::str::FromStr for Dn {
    type Err = DnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dn::parse(s)
    }
}

/// True when a gridmap pattern is a DN rather than an FQAN: a leading `/`
/// followed by one of the common leading attribute types.
pub fn is_dn_pattern(pattern: &str) -> bool {
    ["/C=", "/CN=", "/O=", "/OU="]
        .iter()
        .any(|prefix| pattern.starts_with(prefix))
}

fn split_rdn(input: &str, component: &str) -> Result<(String, String), DnError> {
    let (attr_type, value) = component
        .split_once('=')
        .ok_or_else(|| DnError::new(input, format!("component {component:?} has no '='")))?;
    if attr_type.is_empty() {
        return Err(DnError::new(input, "empty attribute type"));
    }
    Ok((attr_type.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_forms_parse_to_the_same_dn() {
        let slash = Dn::parse("/C=CH/O=CERN/CN=Alice").unwrap();
        let rfc = Dn::parse("CN=Alice,O=CERN,C=CH").unwrap();
        assert_eq!(slash, rfc);
        assert_eq!(rfc.to_openssl_form(), "/C=CH/O=CERN/CN=Alice");
        assert_eq!(slash.to_string(), "CN=Alice,O=CERN,C=CH");
    }

    #[test]
    fn test_equality_is_case_insensitive() {
        let a = Dn::parse("CN=alice,o=cern,C=CH").unwrap();
        let b = Dn::parse("cn=Alice,O=CERN,c=ch").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_values_differ() {
        let a = Dn::parse("CN=Alice,O=CERN,C=CH").unwrap();
        let b = Dn::parse("CN=Bob,O=CERN,C=CH").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_dn_pattern_detection() {
        assert!(is_dn_pattern("/C=CH/O=CERN/CN=Alice"));
        assert!(is_dn_pattern("/CN=Service/host.example.org"));
        assert!(!is_dn_pattern("/atlas/prod"));
        assert!(!is_dn_pattern("/cms"));
    }

    #[test]
    fn test_service_dn_keeps_slash_in_value() {
        let dn = Dn::parse("/DC=org/DC=example/CN=host/node.example.org").unwrap();
        assert_eq!(dn.to_string(), "CN=host/node.example.org,DC=example,DC=org");
        assert_eq!(
            dn.to_openssl_form(),
            "/DC=org/DC=example/CN=host/node.example.org"
        );
    }

    #[test]
    fn test_malformed_dn_is_rejected() {
        assert!(Dn::parse("/NOEQUALS").is_err());
        assert!(Dn::parse("").is_err());
    }
}
