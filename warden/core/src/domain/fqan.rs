// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! Fully Qualified Attribute Names.
//!
//! An FQAN names a position inside a virtual organisation:
//! `/<group>[/<group>…][/Role=<role>][/Capability=<cap>]`. Absent role and
//! capability components are canonicalized to the literal token `NULL`, so
//! `/atlas/prod` and `/atlas/prod/Role=NULL/Capability=NULL` denote the same
//! FQAN. Group names compare case-sensitively, role and capability tokens
//! case-insensitively.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical token for an absent role or capability.
pub const NULL_TOKEN: &str = "NULL";

const ROLE_KEY: &str = "Role";
const CAPABILITY_KEY: &str = "Capability";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FqanError {
    #[error("malformed FQAN {input:?}: {reason}")]
    Malformed { input: String, reason: String },

    #[error("malformed FQAN pattern {pattern:?}: {reason}")]
    MalformedPattern { pattern: String, reason: String },
}

impl FqanError {
    fn malformed(input: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// A parsed FQAN in canonical form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fqan {
    group: String,
    role: String,
    capability: String,
}

impl Fqan {
    /// Parse an FQAN from its string form.
    ///
    /// The input must begin with `/`. Components containing `=` are
    /// key/value pairs whose key is compared case-insensitively against
    /// `Role` and `Capability`; every other component extends the group
    /// name. A trailing `/` is tolerated and stripped.
    pub fn parse(input: &str) -> Result<Fqan, FqanError> {
        if !input.starts_with('/') {
            return Err(FqanError::malformed(input, "must begin with '/'"));
        }

        let trimmed = input.strip_suffix('/').unwrap_or(input);
        if trimmed.is_empty() {
            return Err(FqanError::malformed(input, "no group name"));
        }
        let mut group = String::new();
        let mut role: Option<String> = None;
        let mut capability: Option<String> = None;

        for component in trimmed[1..].split('/') {
            if component.matches('=').count() > 1 {
                return Err(FqanError::malformed(
                    input,
                    format!("component {component:?} contains more than one '='"),
                ));
            }
            match component.split_once('=') {
                Some((key, value)) if key.eq_ignore_ascii_case(ROLE_KEY) => {
                    if role.is_some() {
                        return Err(FqanError::malformed(input, "Role appears twice"));
                    }
                    role = Some(canonical_token(value));
                }
                Some((key, value)) if key.eq_ignore_ascii_case(CAPABILITY_KEY) => {
                    if capability.is_some() {
                        return Err(FqanError::malformed(input, "Capability appears twice"));
                    }
                    capability = Some(canonical_token(value));
                }
                Some((key, _)) => {
                    return Err(FqanError::malformed(
                        input,
                        format!("unknown component key {key:?}"),
                    ));
                }
                None => {
                    if component.is_empty() {
                        return Err(FqanError::malformed(input, "empty group name"));
                    }
                    group.push('/');
                    group.push_str(component);
                }
            }
        }

        if group.is_empty() {
            return Err(FqanError::malformed(input, "no group name"));
        }

        Ok(Fqan {
            group,
            role: role.unwrap_or_else(|| NULL_TOKEN.to_string()),
            capability: capability.unwrap_or_else(|| NULL_TOKEN.to_string()),
        })
    }

    /// The full group path, e.g. `/atlas/prod`.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The first group component, conventionally the VO name.
    pub fn vo(&self) -> &str {
        self.group[1..].split('/').next().unwrap_or("")
    }

    /// Canonical role token (`NULL` when absent).
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Canonical capability token (`NULL` when absent).
    pub fn capability(&self) -> &str {
        &self.capability
    }

    pub fn has_role(&self) -> bool {
        self.role != NULL_TOKEN
    }

    /// Match a candidate FQAN against this FQAN interpreted as a pattern.
    ///
    /// Group: a trailing `*` is a wildcard for proper subgroups. The
    /// remainder of the pattern group must end in `/` and contain no other
    /// `*`; the candidate matches when its group extends that base by at
    /// least one component. A pattern `/atlas/*` therefore matches
    /// `/atlas/prod` but not `/atlas` itself. Without a wildcard the group
    /// match is literal.
    ///
    /// Role: the exact token `*` matches any role; any other role pattern
    /// containing `*` is malformed. Otherwise roles compare by canonical
    /// token, so a `NULL` pattern matches only candidates without a role.
    ///
    /// Capability: canonical-token equality, no wildcarding.
    pub fn matches(&self, candidate: &Fqan) -> Result<bool, FqanError> {
        if !self.group_matches(candidate)? {
            return Ok(false);
        }
        if !self.role_matches(candidate)? {
            return Ok(false);
        }
        Ok(self.capability.eq_ignore_ascii_case(&candidate.capability))
    }

    fn group_matches(&self, candidate: &Fqan) -> Result<bool, FqanError> {
        match self.group.strip_suffix('*') {
            Some(base) => {
                if !base.ends_with('/') || base.contains('*') {
                    return Err(FqanError::MalformedPattern {
                        pattern: self.to_string(),
                        reason: "group wildcard must be a trailing '/*'".to_string(),
                    });
                }
                Ok(candidate.group.starts_with(base))
            }
            None => Ok(self.group == candidate.group),
        }
    }

    fn role_matches(&self, candidate: &Fqan) -> Result<bool, FqanError> {
        if self.role == "*" {
            return Ok(true);
        }
        if self.role.contains('*') {
            return Err(FqanError::MalformedPattern {
                pattern: self.to_string(),
                reason: "role wildcard must be exactly '*'".to_string(),
            });
        }
        Ok(self.role.eq_ignore_ascii_case(&candidate.role))
    }
}

/// Canonical formatting always spells out role and capability, so
/// `format(parse(s)) == s` for any `s` already in canonical form.
impl fmt::Display for Fqan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}={}/{}={}",
            self.group, ROLE_KEY, self.role, CAPABILITY_KEY, self.capability
        )
    }
}

impl PartialEq for Fqan {
    fn eq(&self, other: &Self) -> bool {
        self.group == other.group
            && self.role.eq_ignore_ascii_case(&other.role)
            && self.capability.eq_ignore_ascii_case(&other.capability)
    }
}

impl Eq for Fqan {}

impl std::str::FromStr for Fqan {
    type Err = FqanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Fqan::parse(s)
    }
}

fn canonical_token(value: &str) -> String {
    if value.is_empty() || value.eq_ignore_ascii_case(NULL_TOKEN) {
        NULL_TOKEN.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fqan(s: &str) -> Fqan {
        Fqan::parse(s).expect(s)
    }

    #[test]
    fn test_parse_groups_only() {
        let f = fqan("/atlas/prod");
        assert_eq!(f.group(), "/atlas/prod");
        assert_eq!(f.role(), NULL_TOKEN);
        assert_eq!(f.capability(), NULL_TOKEN);
        assert_eq!(f.vo(), "atlas");
    }

    #[test]
    fn test_parse_role_and_capability() {
        let f = fqan("/cms/Role=production/Capability=lcgadmin");
        assert_eq!(f.group(), "/cms");
        assert_eq!(f.role(), "production");
        assert_eq!(f.capability(), "lcgadmin");
    }

    #[test]
    fn test_parse_keys_are_case_insensitive() {
        let f = fqan("/cms/role=production/CAPABILITY=NULL");
        assert_eq!(f.role(), "production");
        assert_eq!(f.capability(), NULL_TOKEN);
    }

    #[test]
    fn test_parse_normalizes_null_tokens() {
        assert_eq!(fqan("/atlas/Role=null").role(), NULL_TOKEN);
        assert_eq!(fqan("/atlas/Role=").role(), NULL_TOKEN);
        assert_eq!(fqan("/atlas"), fqan("/atlas/Role=NULL/Capability=NULL"));
    }

    #[test]
    fn test_parse_strips_trailing_slash() {
        assert_eq!(fqan("/atlas/"), fqan("/atlas"));
    }

    #[test]
    fn test_parse_rejects_missing_leading_slash() {
        assert!(matches!(
            Fqan::parse("atlas/prod"),
            Err(FqanError::Malformed { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_empty_group() {
        assert!(Fqan::parse("/atlas//prod").is_err());
        assert!(Fqan::parse("/").is_err());
        assert!(Fqan::parse("/Role=production").is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_key() {
        assert!(Fqan::parse("/atlas/Group=prod").is_err());
    }

    #[test]
    fn test_parse_rejects_duplicate_role() {
        assert!(Fqan::parse("/atlas/Role=a/Role=b").is_err());
        assert!(Fqan::parse("/atlas/Capability=a/Capability=b").is_err());
    }

    #[test]
    fn test_parse_rejects_double_equals() {
        assert!(Fqan::parse("/atlas/Role=a=b").is_err());
    }

    #[test]
    fn test_format_round_trips_canonical_form() {
        for s in [
            "/atlas/Role=NULL/Capability=NULL",
            "/atlas/prod/Role=production/Capability=NULL",
            "/cms/higgs/mc/Role=NULL/Capability=lcgadmin",
        ] {
            assert_eq!(fqan(s).to_string(), s);
        }
    }

    #[test]
    fn test_equality_role_case_insensitive() {
        assert_eq!(fqan("/atlas/Role=Production"), fqan("/atlas/Role=production"));
        assert_ne!(fqan("/Atlas"), fqan("/atlas"));
    }

    #[test]
    fn test_non_wildcard_pattern_matches_itself() {
        for s in ["/atlas", "/atlas/prod/Role=production", "/cms/Capability=x"] {
            let f = fqan(s);
            assert_eq!(f.matches(&f), Ok(true), "{s}");
        }
    }

    #[test]
    fn test_group_wildcard_requires_proper_subgroup() {
        let pattern = fqan("/atlas/*");
        assert_eq!(pattern.matches(&fqan("/atlas/prod")), Ok(true));
        assert_eq!(pattern.matches(&fqan("/atlas")), Ok(false));
        assert_eq!(pattern.matches(&fqan("/atlasbar/x")), Ok(false));
    }

    #[test]
    fn test_group_wildcard_with_role_wildcard() {
        let pattern = fqan("/atlas/*/Role=*");
        assert_eq!(
            pattern.matches(&fqan("/atlas/prod/Role=production")),
            Ok(true)
        );
        assert_eq!(pattern.matches(&fqan("/atlas/prod")), Ok(true));
    }

    #[test]
    fn test_malformed_group_wildcards() {
        // No '/' before the '*', or a second '*' in the base.
        for s in ["/atlas*", "/at*las/*"] {
            let pattern = fqan(s);
            assert!(matches!(
                pattern.matches(&fqan("/atlas/prod")),
                Err(FqanError::MalformedPattern { .. })
            ));
        }
    }

    #[test]
    fn test_role_wildcard_must_be_exact() {
        let pattern = fqan("/atlas/Role=prod*");
        assert!(matches!(
            pattern.matches(&fqan("/atlas/Role=production")),
            Err(FqanError::MalformedPattern { .. })
        ));
    }

    #[test]
    fn test_null_role_pattern_matches_only_absent_role() {
        let pattern = fqan("/atlas");
        assert_eq!(pattern.matches(&fqan("/atlas")), Ok(true));
        assert_eq!(pattern.matches(&fqan("/atlas/Role=production")), Ok(false));
    }

    #[test]
    fn test_capability_has_no_wildcard() {
        let pattern = fqan("/atlas/Capability=*");
        // '*' in a capability is a literal token, not a wildcard.
        assert_eq!(pattern.matches(&fqan("/atlas/Capability=x")), Ok(false));
        assert_eq!(pattern.matches(&fqan("/atlas/Capability=*")), Ok(true));
    }
}
