// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! In-memory XACML request model: subjects, resources, action, environment.
//!
//! Requests are constructed at the service boundary, mutated only by PIPs
//! during the enrichment phase, and frozen before dispatch to the PDP.

use serde::{Deserialize, Serialize};

use super::attribute::Attribute;

/// A request subject. Carries an optional XACML category URI in addition to
/// its attribute set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl Subject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            attributes: Vec::new(),
        }
    }

    pub fn attribute(&self, id: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.id == id)
    }

    /// Merge an attribute into the subject. If an attribute with the same
    /// `(id, data type, issuer)` already exists its values are merged
    /// set-wise, otherwise the attribute is appended.
    pub fn add_attribute(&mut self, attribute: Attribute) {
        merge_attribute(&mut self.attributes, attribute);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl Resource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(&self, id: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.id == id)
    }

    pub fn add_attribute(&mut self, attribute: Attribute) {
        merge_attribute(&mut self.attributes, attribute);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl Action {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(&self, id: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.id == id)
    }

    pub fn add_attribute(&mut self, attribute: Attribute) {
        merge_attribute(&mut self.attributes, attribute);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(&self, id: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.id == id)
    }

    pub fn add_attribute(&mut self, attribute: Attribute) {
        merge_attribute(&mut self.attributes, attribute);
    }
}

/// An authorization request: who may do what to which resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub action: Action,
    #[serde(default)]
    pub environment: Environment,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }
}

fn merge_attribute(attributes: &mut Vec<Attribute>, attribute: Attribute) {
    if let Some(existing) = attributes.iter_mut().find(|a| a.same_meta(&attribute)) {
        for value in attribute.values {
            existing.add_value(value);
        }
    } else {
        attributes.push(attribute);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::attribute::data_types;

    #[test]
    fn test_add_attribute_merges_values() {
        let mut subject = Subject::new();
        subject.add_attribute(Attribute::new("urn:test:id", data_types::STRING).with_value("a"));
        subject.add_attribute(Attribute::new("urn:test:id", data_types::STRING).with_value("b"));
        assert_eq!(subject.attributes.len(), 1);
        assert_eq!(subject.attributes[0].values, vec!["a", "b"]);
    }

    #[test]
    fn test_add_attribute_distinct_issuer_appends() {
        let mut subject = Subject::new();
        subject.add_attribute(Attribute::new("urn:test:id", data_types::STRING).with_value("a"));
        subject.add_attribute(
            Attribute::new("urn:test:id", data_types::STRING)
                .with_issuer("urn:test:issuer")
                .with_value("a"),
        );
        assert_eq!(subject.attributes.len(), 2);
    }

    #[test]
    fn test_re_adding_identical_attribute_is_idempotent() {
        let mut subject = Subject::new();
        let attr = Attribute::new("urn:test:id", data_types::STRING).with_value("a");
        subject.add_attribute(attr.clone());
        let before = subject.clone();
        subject.add_attribute(attr);
        assert_eq!(subject, before);
    }
}
