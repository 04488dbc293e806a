// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! Outbound dispatch to the external policy decision point.
//!
//! The PDP is the authoritative XACML engine; this client only carries the
//! enriched request to it and the decision back. Endpoints are tried in
//! configured order and the first reachable one wins. There is no retry
//! beyond the failover walk; admission control upstream decides whether to
//! resubmit.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{Request, Response};

#[derive(Debug, Error)]
pub enum PdpError {
    #[error("no PDP endpoint reachable (tried {attempted}): last error: {last_error}")]
    Unreachable {
        attempted: usize,
        last_error: String,
    },

    #[error("PDP returned an unusable response: {0}")]
    Protocol(String),

    #[error("PDP client configuration invalid: {0}")]
    Configuration(String),
}

/// Decision dispatch seam. The pipeline depends on this trait; tests plug
/// in an in-process decider.
#[async_trait]
pub trait PdpClient: Send + Sync {
    async fn authorize(&self, request: &Request) -> Result<Response, PdpError>;
}

/// HTTP PDP client with endpoint failover.
pub struct HttpPdpClient {
    endpoints: Vec<String>,
    client: reqwest::Client,
}

impl HttpPdpClient {
    pub fn new(
        endpoints: Vec<String>,
        connection_timeout: Duration,
    ) -> Result<HttpPdpClient, PdpError> {
        if endpoints.is_empty() {
            return Err(PdpError::Configuration(
                "at least one PDP endpoint is required".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(connection_timeout)
            .timeout(connection_timeout.saturating_mul(2))
            .build()
            .map_err(|e| PdpError::Configuration(e.to_string()))?;
        Ok(HttpPdpClient { endpoints, client })
    }
}

#[async_trait]
impl PdpClient for HttpPdpClient {
    async fn authorize(&self, request: &Request) -> Result<Response, PdpError> {
        let mut last_error = String::new();

        for endpoint in &self.endpoints {
            let sent = self.client.post(endpoint).json(request).send().await;
            match sent {
                Ok(http_response) => {
                    let status = http_response.status();
                    if !status.is_success() {
                        return Err(PdpError::Protocol(format!(
                            "endpoint {endpoint} answered {status}"
                        )));
                    }
                    let response: Response = http_response
                        .json()
                        .await
                        .map_err(|e| PdpError::Protocol(e.to_string()))?;
                    debug!(endpoint = %endpoint, "PDP decision received");
                    return Ok(response);
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "PDP endpoint unreachable, trying next");
                    last_error = e.to_string();
                }
            }
        }

        Err(PdpError::Unreachable {
            attempted: self.endpoints.len(),
            last_error,
        })
    }
}
