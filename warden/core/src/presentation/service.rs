// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! The authorization service endpoint.
//!
//! One route: `POST /authz`. The body goes through the configured codec,
//! the pipeline, and back out through the codec. Admission is bounded:
//! `maximumRequests` requests run concurrently, `requestQueueSize` wait in
//! the buffer, anything beyond that is shed with `503` before it touches
//! the pipeline.

use std::sync::Arc;

use axum::body::Bytes;
use axum::error_handling::HandleErrorLayer;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{BoxError, Router};
use tower::ServiceBuilder;
use tracing::{debug, warn};

use crate::application::AuthorizationService;
use crate::presentation::codec::MessageCodec;

#[derive(Clone)]
pub struct ServiceState {
    pub authz: Arc<AuthorizationService>,
    pub codec: Arc<dyn MessageCodec>,
}

pub fn service_router(
    state: ServiceState,
    maximum_requests: usize,
    request_queue_size: usize,
) -> Router {
    Router::new()
        .route("/authz", post(authorize))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_admission_error))
                .load_shed()
                .buffer(request_queue_size.max(1))
                .concurrency_limit(maximum_requests.max(1)),
        )
        .with_state(state)
}

async fn authorize(State(state): State<ServiceState>, body: Bytes) -> impl IntoResponse {
    let request = match state.codec.decode_request(&body) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Rejecting malformed request");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let response = state.authz.process(request).await;

    match state.codec.encode_response(&response) {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, state.codec.content_type())],
            bytes,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Response encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Shed load as a transport-level error, never as a decision.
async fn handle_admission_error(error: BoxError) -> (StatusCode, &'static str) {
    if error.is::<tower::load_shed::error::Overloaded>() {
        (StatusCode::SERVICE_UNAVAILABLE, "service overloaded")
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::obligations::ObligationService;
    use crate::domain::{AuthzResult, Decision, Request, Response};
    use crate::infrastructure::pdp::{PdpClient, PdpError};
    use crate::metrics::ServiceMetrics;
    use crate::presentation::codec::JsonCodec;
    use async_trait::async_trait;
    use tower::util::ServiceExt;

    struct PermitAll;

    #[async_trait]
    impl PdpClient for PermitAll {
        async fn authorize(&self, request: &Request) -> Result<Response, PdpError> {
            Ok(Response::new(
                request.clone(),
                vec![AuthzResult::new(Decision::Permit)],
            ))
        }
    }

    fn router() -> Router {
        let authz = Arc::new(AuthorizationService::new(
            vec![],
            Arc::new(PermitAll),
            ObligationService::new(vec![]),
            Arc::new(ServiceMetrics::new()),
        ));
        service_router(
            ServiceState {
                authz,
                codec: Arc::new(JsonCodec),
            },
            10,
            10,
        )
    }

    #[tokio::test]
    async fn test_valid_request_gets_a_decision() {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/authz")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(
                serde_json::to_vec(&Request::new()).unwrap(),
            ))
            .unwrap();

        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["results"][0]["decision"], "Permit");
    }

    #[tokio::test]
    async fn test_malformed_body_is_400_without_pdp_call() {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/authz")
            .body(axum::body::Body::from("junk"))
            .unwrap();

        let response = router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
