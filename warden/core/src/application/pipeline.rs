// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! The request processing pipeline.
//!
//! Three phases, strictly ordered: the PIP chain enriches the request,
//! the external PDP decides, the obligation-handler chain post-processes
//! each result. Stage failures degrade to an Indeterminate decision with
//! a diagnostic status; nothing a request does takes the process down.

use std::sync::Arc;

use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::application::obligations::ObligationService;
use crate::application::pips::Pip;
use crate::domain::{AuthzResult, Decision, Request, Response};
use crate::infrastructure::pdp::PdpClient;
use crate::metrics::ServiceMetrics;

pub struct AuthorizationService {
    pips: Vec<Arc<dyn Pip>>,
    pdp: Arc<dyn PdpClient>,
    obligations: ObligationService,
    metrics: Arc<ServiceMetrics>,
}

impl AuthorizationService {
    pub fn new(
        pips: Vec<Arc<dyn Pip>>,
        pdp: Arc<dyn PdpClient>,
        obligations: ObligationService,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            pips,
            pdp,
            obligations,
            metrics,
        }
    }

    /// Process one authorization request to completion. Always yields a
    /// response; errors are folded into the decision.
    pub async fn process(&self, request: Request) -> Response {
        let request_id = Uuid::new_v4();
        let span = info_span!("authz_request", %request_id);
        let response = self.run(request).instrument(span).await;

        if let Some(result) = response.results.first() {
            self.metrics.record_decision(result.decision);
        }
        response
    }

    async fn run(&self, mut request: Request) -> Response {
        // Enrichment phase: sequential, each PIP observes its
        // predecessors' mutations.
        for pip in &self.pips {
            match pip.populate(&mut request).await {
                Ok(applied) => {
                    debug!(pip = pip.id(), applied, "PIP completed");
                }
                Err(e) => {
                    warn!(pip = pip.id(), error = %e, "PIP failed, returning Indeterminate");
                    return indeterminate_response(request, e.to_string());
                }
            }
        }

        // The request is frozen from here on.
        let request = request;

        let pdp_response = match self.pdp.authorize(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "PDP dispatch failed, returning Indeterminate");
                return indeterminate_response(request, e.to_string());
            }
        };

        // Post-processing phase: per result, handlers in precedence order.
        let Response { mut results, .. } = pdp_response;
        if results.is_empty() {
            warn!("PDP returned no results, returning Indeterminate");
            return indeterminate_response(request, "PDP returned no results".to_string());
        }
        for result in &mut results {
            self.obligations.process(&request, result).await;
        }

        Response::new(request, results)
    }
}

fn indeterminate_response(request: Request, message: String) -> Response {
    let mut result = AuthzResult::new(Decision::Indeterminate);
    result.set_indeterminate(message);
    Response::new(request, vec![result])
}
