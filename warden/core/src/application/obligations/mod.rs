// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! Obligation handlers.
//!
//! After the PDP decides, each result's obligations are offered to the
//! configured handlers in precedence order (lower value first). A handler
//! is invoked when the result carries the obligation id it consumes, and
//! mutates the result in place: adding, removing, or transforming
//! obligations. A handler error rewrites the result's decision to
//! Indeterminate and stops processing that result.

pub mod account_map;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::warn;

use crate::config::{ConfigError, SectionConfig};
use crate::domain::{AuthzResult, Request};
use crate::infrastructure::dfpm::DfpmStore;

#[derive(Debug, Error)]
pub enum ObligationError {
    #[error("obligation handler {handler} failed: {reason}")]
    Failed { handler: String, reason: String },
}

impl ObligationError {
    pub fn failed(handler: &str, reason: impl std::fmt::Display) -> Self {
        Self::Failed {
            handler: handler.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A result post-processing stage.
#[async_trait]
pub trait ObligationHandler: Send + Sync {
    /// Instance id, from the configuration section name.
    fn id(&self) -> &str;

    /// The obligation id this handler consumes.
    fn handled_obligation(&self) -> &str;

    fn precedence(&self) -> i32;

    async fn apply(
        &self,
        request: &Request,
        result: &mut AuthzResult,
    ) -> Result<(), ObligationError>;
}

/// Applies the configured handlers to each result.
pub struct ObligationService {
    handlers: Vec<Arc<dyn ObligationHandler>>,
}

impl ObligationService {
    pub fn new(mut handlers: Vec<Arc<dyn ObligationHandler>>) -> Self {
        handlers.sort_by_key(|handler| handler.precedence());
        Self { handlers }
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the handler chain over one result. Errors poison the result,
    /// not the response.
    pub async fn process(&self, request: &Request, result: &mut AuthzResult) {
        for handler in &self.handlers {
            if result.obligation(handler.handled_obligation()).is_none() {
                continue;
            }
            if let Err(e) = handler.apply(request, result).await {
                warn!(handler = handler.id(), error = %e, "Obligation processing failed");
                result.set_indeterminate(format!("obligation processing failed: {e}"));
                break;
            }
        }
    }
}

/// Construction context for handler factories; collects the mapping
/// stores they open, with their refresh periods, so the runtime can
/// schedule refreshers.
pub struct OhContext {
    dfpm_stores: Mutex<Vec<(Arc<DfpmStore>, std::time::Duration)>>,
}

impl OhContext {
    pub fn new() -> Self {
        Self {
            dfpm_stores: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn register_dfpm_store(&self, store: Arc<DfpmStore>, period: std::time::Duration) {
        self.dfpm_stores.lock().push((store, period));
    }

    pub fn into_dfpm_stores(self) -> Vec<(Arc<DfpmStore>, std::time::Duration)> {
        self.dfpm_stores.into_inner()
    }
}

impl Default for OhContext {
    fn default() -> Self {
        Self::new()
    }
}

type OhFactory = fn(&SectionConfig, &OhContext) -> Result<Arc<dyn ObligationHandler>, ConfigError>;

const REGISTRY: &[(&str, OhFactory)] = &[(
    account_map::TAG,
    account_map::AccountMapHandler::from_section,
)];

pub fn create_obligation_handler(
    section: &SectionConfig,
    context: &OhContext,
) -> Result<Arc<dyn ObligationHandler>, ConfigError> {
    let factory = REGISTRY
        .iter()
        .find(|(tag, _)| *tag == section.parser_class)
        .map(|(_, factory)| factory)
        .ok_or_else(|| ConfigError::UnknownParser {
            section: section.name.clone(),
            parser: section.parser_class.clone(),
        })?;
    factory(section, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Decision, Obligation};

    struct RecordingHandler {
        id: String,
        obligation: String,
        precedence: i32,
        fail: bool,
    }

    #[async_trait]
    impl ObligationHandler for RecordingHandler {
        fn id(&self) -> &str {
            &self.id
        }

        fn handled_obligation(&self) -> &str {
            &self.obligation
        }

        fn precedence(&self) -> i32 {
            self.precedence
        }

        async fn apply(
            &self,
            _request: &Request,
            result: &mut AuthzResult,
        ) -> Result<(), ObligationError> {
            if self.fail {
                return Err(ObligationError::failed(&self.id, "boom"));
            }
            result
                .obligations
                .push(Obligation::new(format!("urn:applied:{}", self.id), result.decision));
            Ok(())
        }
    }

    fn handler(id: &str, obligation: &str, precedence: i32, fail: bool) -> Arc<dyn ObligationHandler> {
        Arc::new(RecordingHandler {
            id: id.to_string(),
            obligation: obligation.to_string(),
            precedence,
            fail,
        })
    }

    #[tokio::test]
    async fn test_handlers_run_in_precedence_order() {
        let service = ObligationService::new(vec![
            handler("second", "urn:trigger", 10, false),
            handler("first", "urn:trigger", 1, false),
        ]);
        let mut result = AuthzResult::new(Decision::Permit);
        result
            .obligations
            .push(Obligation::new("urn:trigger", Decision::Permit));

        service.process(&Request::new(), &mut result).await;
        let applied: Vec<&str> = result
            .obligations
            .iter()
            .filter(|o| o.id.starts_with("urn:applied:"))
            .map(|o| o.id.as_str())
            .collect();
        assert_eq!(applied, vec!["urn:applied:first", "urn:applied:second"]);
    }

    #[tokio::test]
    async fn test_handler_without_matching_obligation_is_skipped() {
        let service = ObligationService::new(vec![handler("h", "urn:absent", 0, false)]);
        let mut result = AuthzResult::new(Decision::Permit);
        service.process(&Request::new(), &mut result).await;
        assert_eq!(result.decision, Decision::Permit);
        assert!(result.obligations.is_empty());
    }

    #[tokio::test]
    async fn test_handler_error_poisons_only_the_result_decision() {
        let service = ObligationService::new(vec![
            handler("bad", "urn:trigger", 0, true),
            handler("never", "urn:trigger", 1, false),
        ]);
        let mut result = AuthzResult::new(Decision::Permit);
        result
            .obligations
            .push(Obligation::new("urn:trigger", Decision::Permit));

        service.process(&Request::new(), &mut result).await;
        assert_eq!(result.decision, Decision::Indeterminate);
        // The failing handler stopped the chain.
        assert!(!result.obligations.iter().any(|o| o.id == "urn:applied:never"));
    }

    #[test]
    fn test_unknown_handler_tag_is_rejected() {
        let section = SectionConfig {
            name: "OH".to_string(),
            parser_class: "no-such-oh".to_string(),
            precedence: 0,
            params: serde_yaml::Mapping::new(),
        };
        assert!(matches!(
            create_obligation_handler(&section, &OhContext::new()),
            Err(ConfigError::UnknownParser { .. })
        ));
    }
}
