// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! The admin control channel.
//!
//! A small HTTP endpoint on a separately configured (normally loopback)
//! address: `GET /status` renders the service metrics as plain text,
//! `GET /shutdown` runs the registered shutdown tasks in registration
//! order and then stops both channels. When an admin password is
//! configured it must be supplied as the `password` query parameter.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::metrics::ServiceMetrics;

/// Runs registered shutdown tasks in order, then cancels the serve token.
pub struct ShutdownCoordinator {
    tasks: Mutex<Vec<(String, BoxFuture<'static, ()>)>>,
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
            token: CancellationToken::new(),
        }
    }

    /// Register a task to run at shutdown. Tasks run in registration
    /// order, before the listeners stop.
    pub fn register(&self, name: impl Into<String>, task: BoxFuture<'static, ()>) {
        self.tasks.lock().push((name.into(), task));
    }

    /// Token the servers watch; cancelled after the tasks complete.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for (name, task) in tasks {
            info!(task = %name, "Running shutdown task");
            task.await;
        }
        self.token.cancel();
        info!("Shutdown complete, closing listeners");
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct AdminState {
    pub entity_id: String,
    pub metrics: Arc<ServiceMetrics>,
    pub password: Option<String>,
    pub coordinator: Arc<ShutdownCoordinator>,
}

pub fn admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/shutdown", get(shutdown))
        .with_state(state)
}

fn authorized(state: &AdminState, params: &HashMap<String, String>) -> bool {
    match &state.password {
        None => true,
        Some(expected) => params.get("password").map(String::as_str) == Some(expected),
    }
}

async fn status(
    State(state): State<AdminState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if !authorized(&state, &params) {
        return (StatusCode::UNAUTHORIZED, "unauthorized\n".to_string());
    }
    (StatusCode::OK, state.metrics.render_status(&state.entity_id))
}

async fn shutdown(
    State(state): State<AdminState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if !authorized(&state, &params) {
        return (StatusCode::UNAUTHORIZED, "unauthorized\n");
    }
    warn!("Shutdown requested via admin channel");
    let coordinator = Arc::clone(&state.coordinator);
    tokio::spawn(async move {
        coordinator.shutdown().await;
    });
    (StatusCode::OK, "shutting down\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::util::ServiceExt;

    fn state(password: Option<&str>) -> AdminState {
        AdminState {
            entity_id: "https://pep.example.org".to_string(),
            metrics: Arc::new(ServiceMetrics::new()),
            password: password.map(str::to_string),
            coordinator: Arc::new(ShutdownCoordinator::new()),
        }
    }

    async fn get_status(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(
                axum::http::Request::builder()
                    .uri(uri)
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn test_status_without_password() {
        let (code, body) = get_status(admin_router(state(None)), "/status").await;
        assert_eq!(code, StatusCode::OK);
        assert!(body.contains("Status: OK"));
    }

    #[tokio::test]
    async fn test_wrong_password_is_401() {
        let router = admin_router(state(Some("sekrit")));
        let (code, _) = get_status(router.clone(), "/status?password=wrong").await;
        assert_eq!(code, StatusCode::UNAUTHORIZED);
        let (code, _) = get_status(router, "/status?password=sekrit").await;
        assert_eq!(code, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_shutdown_runs_tasks_in_registration_order() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let counter = Arc::new(AtomicUsize::new(0));

        for name in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            let counter = Arc::clone(&counter);
            coordinator.register(name, {
                Box::pin(async move {
                    order.lock().push((name, counter.fetch_add(1, Ordering::SeqCst)));
                })
            });
        }

        let token = coordinator.token();
        coordinator.shutdown().await;
        assert!(token.is_cancelled());
        let order = order.lock();
        assert_eq!(
            *order,
            vec![("first", 0), ("second", 1), ("third", 2)]
        );
    }
}
