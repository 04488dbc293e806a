// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! XACML attribute model.
//!
//! Attributes are immutable after construction except for [`Attribute::add_value`],
//! which is only invoked by PIPs during the request enrichment phase.

use serde::{Deserialize, Serialize};

/// A single XACML attribute: `(id, data type, optional issuer)` plus an
/// ordered list of string values.
///
/// Equality is structural on all four fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: String,
    #[serde(rename = "dataType")]
    pub data_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default)]
    pub values: Vec<String>,
}

impl Attribute {
    pub fn new(id: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data_type: data_type.into(),
            issuer: None,
            values: Vec::new(),
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.add_value(value.into());
        self
    }

    /// Append a value, preserving order. Values behave as an ordered set:
    /// adding a value that is already present is a no-op, which is what makes
    /// re-running an enrichment stage observationally idempotent.
    pub fn add_value(&mut self, value: impl Into<String>) {
        let value = value.into();
        if !self.values.contains(&value) {
            self.values.push(value);
        }
    }

    /// First value, if any. Most identity attributes are single-valued.
    pub fn value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    /// True when `(id, data_type, issuer)` match, regardless of values.
    /// Used to merge values into an existing attribute during enrichment.
    pub fn same_meta(&self, other: &Attribute) -> bool {
        self.id == other.id && self.data_type == other.data_type && self.issuer == other.issuer
    }
}

/// Well-known XACML data type URIs.
pub mod data_types {
    pub const STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
    pub const DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
    pub const DATE: &str = "http://www.w3.org/2001/XMLSchema#date";
    pub const TIME: &str = "http://www.w3.org/2001/XMLSchema#time";
    pub const X500_NAME: &str = "urn:oasis:names:tc:xacml:1.0:data-type:x500Name";
    pub const INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_value_is_set_like() {
        let mut attr = Attribute::new("urn:test:id", data_types::STRING);
        attr.add_value("a");
        attr.add_value("b");
        attr.add_value("a");
        assert_eq!(attr.values, vec!["a", "b"]);
    }

    #[test]
    fn test_equality_is_structural() {
        let a = Attribute::new("urn:test:id", data_types::STRING).with_value("x");
        let b = Attribute::new("urn:test:id", data_types::STRING).with_value("x");
        let c = b.clone().with_issuer("urn:test:issuer");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_same_meta_ignores_values() {
        let a = Attribute::new("urn:test:id", data_types::STRING).with_value("x");
        let b = Attribute::new("urn:test:id", data_types::STRING).with_value("y");
        assert!(a.same_meta(&b));
        assert_ne!(a, b);
    }
}
