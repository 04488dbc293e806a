// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! Appends a configured, fixed set of attributes to the request.
//!
//! Used for deployment constants such as the resource-id of the service
//! the PEP fronts. Resource and subject attributes only broadcast to
//! multiple elements when the matching flag is set; otherwise a request
//! with several of them is ambiguous and fails the PIP.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::{ConfigError, SectionConfig};
use crate::domain::attribute::data_types;
use crate::domain::{Attribute, Request, Resource, Subject};

use super::{Pip, PipContext, PipError};

pub const TAG: &str = "static-pip";

#[derive(Debug, Clone, Deserialize)]
struct StaticAttribute {
    id: String,
    #[serde(rename = "dataType", default = "default_data_type")]
    data_type: String,
    #[serde(default)]
    issuer: Option<String>,
    #[serde(default)]
    values: Vec<String>,
}

fn default_data_type() -> String {
    data_types::STRING.to_string()
}

impl StaticAttribute {
    fn build(&self) -> Attribute {
        let mut attr = Attribute::new(&self.id, &self.data_type);
        if let Some(issuer) = &self.issuer {
            attr = attr.with_issuer(issuer);
        }
        for value in &self.values {
            attr.add_value(value);
        }
        attr
    }
}

pub struct StaticPip {
    id: String,
    action: Vec<StaticAttribute>,
    environment: Vec<StaticAttribute>,
    resource: Vec<StaticAttribute>,
    subject: Vec<StaticAttribute>,
    resource_broadcast: bool,
    subject_broadcast: bool,
}

impl StaticPip {
    pub fn from_section(
        section: &SectionConfig,
        _context: &PipContext<'_>,
    ) -> Result<Arc<dyn Pip>, ConfigError> {
        Ok(Arc::new(StaticPip {
            id: section.name.clone(),
            action: attribute_list(section, "actionAttributes")?,
            environment: attribute_list(section, "environmentAttributes")?,
            resource: attribute_list(section, "resourceAttributes")?,
            subject: attribute_list(section, "subjectAttributes")?,
            resource_broadcast: section
                .get_bool("includeResourceAttributesInAllResources", false),
            subject_broadcast: section.get_bool("includeSubjectAttributesInAllSubjects", false),
        }))
    }
}

fn attribute_list(
    section: &SectionConfig,
    key: &str,
) -> Result<Vec<StaticAttribute>, ConfigError> {
    match section.get_value(key) {
        None => Ok(Vec::new()),
        Some(value) => {
            serde_yaml::from_value(value.clone()).map_err(|e| ConfigError::InvalidValue {
                section: section.name.clone(),
                key: key.to_string(),
                reason: e.to_string(),
            })
        }
    }
}

#[async_trait]
impl Pip for StaticPip {
    fn id(&self) -> &str {
        &self.id
    }

    async fn populate(&self, request: &mut Request) -> Result<bool, PipError> {
        for attr in &self.action {
            request.action.add_attribute(attr.build());
        }
        for attr in &self.environment {
            request.environment.add_attribute(attr.build());
        }

        if !self.resource.is_empty() {
            if request.resources.is_empty() {
                request.resources.push(Resource::new());
            }
            if request.resources.len() > 1 && !self.resource_broadcast {
                return Err(PipError::failed(
                    &self.id,
                    "multiple resources present and resource broadcast is disabled",
                ));
            }
            for resource in &mut request.resources {
                for attr in &self.resource {
                    resource.add_attribute(attr.build());
                }
            }
        }

        if !self.subject.is_empty() {
            if request.subjects.is_empty() {
                request.subjects.push(Subject::new());
            }
            if request.subjects.len() > 1 && !self.subject_broadcast {
                return Err(PipError::failed(
                    &self.id,
                    "multiple subjects present and subject broadcast is disabled",
                ));
            }
            for subject in &mut request.subjects {
                for attr in &self.subject {
                    subject.add_attribute(attr.build());
                }
            }
        }

        Ok(true)
    }
}
