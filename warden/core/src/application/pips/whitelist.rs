// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! Drops attributes whose ids are not on the accepted list.
//!
//! Each request element carries its own accepted-id list; an element with
//! no configured list is left untouched. This runs first in most
//! deployments so later PIPs and the PDP only see vetted attribute ids.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::{ConfigError, SectionConfig};
use crate::domain::{Attribute, Request};

use super::{Pip, PipContext, PipError};

pub const TAG: &str = "whitelist-pip";

pub struct WhitelistPip {
    id: String,
    action_ids: Option<Vec<String>>,
    environment_ids: Option<Vec<String>>,
    resource_ids: Option<Vec<String>>,
    subject_ids: Option<Vec<String>>,
}

impl WhitelistPip {
    pub fn from_section(
        section: &SectionConfig,
        _context: &PipContext<'_>,
    ) -> Result<Arc<dyn Pip>, ConfigError> {
        Ok(Arc::new(WhitelistPip {
            id: section.name.clone(),
            action_ids: optional_list(section, "acceptedActionAttributeIds"),
            environment_ids: optional_list(section, "acceptedEnvironmentAttributeIds"),
            resource_ids: optional_list(section, "acceptedResourceAttributeIds"),
            subject_ids: optional_list(section, "acceptedSubjectAttributeIds"),
        }))
    }
}

/// A configured-but-empty list means "accept nothing"; an absent key means
/// "leave the element alone".
fn optional_list(section: &SectionConfig, key: &str) -> Option<Vec<String>> {
    section.get_value(key).map(|_| section.get_list(key))
}

fn retain_accepted(attributes: &mut Vec<Attribute>, accepted: &Option<Vec<String>>) -> usize {
    let Some(accepted) = accepted else {
        return 0;
    };
    let before = attributes.len();
    attributes.retain(|attr| accepted.iter().any(|id| id == &attr.id));
    before - attributes.len()
}

#[async_trait]
impl Pip for WhitelistPip {
    fn id(&self) -> &str {
        &self.id
    }

    async fn populate(&self, request: &mut Request) -> Result<bool, PipError> {
        let mut dropped = retain_accepted(&mut request.action.attributes, &self.action_ids);
        dropped += retain_accepted(&mut request.environment.attributes, &self.environment_ids);
        for resource in &mut request.resources {
            dropped += retain_accepted(&mut resource.attributes, &self.resource_ids);
        }
        for subject in &mut request.subjects {
            dropped += retain_accepted(&mut subject.attributes, &self.subject_ids);
        }
        if dropped > 0 {
            debug!(pip = %self.id, dropped, "Removed non-whitelisted attributes");
        }
        Ok(dropped > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::attribute::data_types;
    use crate::domain::Subject;
    use serde_yaml::{Mapping, Value};

    fn pip(subject_ids: Option<&str>) -> WhitelistPip {
        let mut params = Mapping::new();
        if let Some(ids) = subject_ids {
            params.insert(
                Value::from("acceptedSubjectAttributeIds"),
                Value::from(ids),
            );
        }
        let section = SectionConfig {
            name: "WL".to_string(),
            parser_class: TAG.to_string(),
            precedence: 0,
            params,
        };
        WhitelistPip {
            id: section.name.clone(),
            action_ids: None,
            environment_ids: None,
            resource_ids: None,
            subject_ids: optional_list(&section, "acceptedSubjectAttributeIds"),
        }
    }

    fn request_with_subject_attrs(ids: &[&str]) -> Request {
        let mut subject = Subject::new();
        for id in ids {
            subject.add_attribute(Attribute::new(*id, data_types::STRING).with_value("v"));
        }
        let mut request = Request::new();
        request.subjects.push(subject);
        request
    }

    #[tokio::test]
    async fn test_unlisted_ids_are_removed() {
        let pip = pip(Some("urn:keep"));
        let mut request = request_with_subject_attrs(&["urn:keep", "urn:drop"]);
        assert!(pip.populate(&mut request).await.unwrap());
        let ids: Vec<&str> = request.subjects[0]
            .attributes
            .iter()
            .map(|a| a.id.as_str())
            .collect();
        assert_eq!(ids, vec!["urn:keep"]);
    }

    #[tokio::test]
    async fn test_unconfigured_element_is_untouched() {
        let pip = pip(None);
        let mut request = request_with_subject_attrs(&["urn:anything"]);
        assert!(!pip.populate(&mut request).await.unwrap());
        assert_eq!(request.subjects[0].attributes.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_list_drops_everything() {
        let pip = pip(Some(""));
        let mut request = request_with_subject_attrs(&["urn:anything"]);
        assert!(pip.populate(&mut request).await.unwrap());
        assert!(request.subjects[0].attributes.is_empty());
    }
}
