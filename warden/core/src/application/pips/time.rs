// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! Injects the current wall-clock time into the request environment.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::config::{ConfigError, SectionConfig};
use crate::domain::attribute::data_types;
use crate::domain::profile::environment;
use crate::domain::{Attribute, Request};

use super::{Pip, PipContext, PipError};

pub const TAG: &str = "time-pip";

pub struct TimePip {
    id: String,
}

impl TimePip {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn from_section(
        section: &SectionConfig,
        _context: &PipContext<'_>,
    ) -> Result<Arc<dyn Pip>, ConfigError> {
        Ok(Arc::new(TimePip::new(section.name.clone())))
    }
}

#[async_trait]
impl Pip for TimePip {
    fn id(&self) -> &str {
        &self.id
    }

    async fn populate(&self, request: &mut Request) -> Result<bool, PipError> {
        let now = Utc::now();
        request.environment.add_attribute(
            Attribute::new(environment::CURRENT_DATE_TIME, data_types::DATE_TIME)
                .with_value(now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()),
        );
        request.environment.add_attribute(
            Attribute::new(environment::CURRENT_DATE, data_types::DATE)
                .with_value(now.format("%Y-%m-%d").to_string()),
        );
        request.environment.add_attribute(
            Attribute::new(environment::CURRENT_TIME, data_types::TIME)
                .with_value(now.format("%H:%M:%S%.3fZ").to_string()),
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_injects_three_environment_attributes() {
        let pip = TimePip::new("TIME");
        let mut request = Request::new();
        assert!(pip.populate(&mut request).await.unwrap());

        for id in [
            environment::CURRENT_DATE_TIME,
            environment::CURRENT_DATE,
            environment::CURRENT_TIME,
        ] {
            let attr = request.environment.attribute(id).expect(id);
            assert_eq!(attr.values.len(), 1);
        }
    }
}
