// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! Service wiring and lifecycle.
//!
//! Builds the PIP and obligation-handler chains from the configuration,
//! starts the background refreshers, and serves the two HTTP channels.
//! Shutdown arrives either from a signal or from the admin channel; both
//! paths run the registered shutdown tasks in order before the listeners
//! close.

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use warden_core::application::obligations::{
    create_obligation_handler, ObligationService, OhContext,
};
use warden_core::application::pips::{create_pip, Pip, PipContext};
use warden_core::application::AuthorizationService;
use warden_core::config::ServiceConfig;
use warden_core::infrastructure::pdp::HttpPdpClient;
use warden_core::metrics::ServiceMetrics;
use warden_core::presentation::{
    admin_router, service_router, AdminState, JsonCodec, ServiceState, ShutdownCoordinator,
};

use crate::tls;

/// Trust material is re-read on a slow cycle; the external updater runs
/// hourly at most sites.
const TRUST_REFRESH_PERIOD: Duration = Duration::from_secs(3600);

/// Grace period for in-flight requests once shutdown starts.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run(config: ServiceConfig) -> Result<()> {
    let metrics = Arc::new(ServiceMetrics::new());
    let coordinator = Arc::new(ShutdownCoordinator::new());
    let refresh_token = CancellationToken::new();

    // PIP chain, in configured order.
    let pip_context = PipContext::new(&config.security);
    let mut pips: Vec<Arc<dyn Pip>> = Vec::new();
    for section in &config.pips {
        let pip = create_pip(section, &pip_context)
            .with_context(|| format!("Failed to build PIP {:?}", section.name))?;
        info!(pip = %section.name, parser = %section.parser_class, "Registered PIP");
        pips.push(pip);
    }
    let (ca_stores, voms_stores) = pip_context.into_trust_stores();

    // Obligation handlers; the service orders them by precedence.
    let oh_context = OhContext::new();
    let mut handlers = Vec::new();
    for section in &config.obligation_handlers {
        let handler = create_obligation_handler(section, &oh_context)
            .with_context(|| format!("Failed to build obligation handler {:?}", section.name))?;
        info!(
            handler = %section.name,
            parser = %section.parser_class,
            precedence = section.precedence,
            "Registered obligation handler"
        );
        handlers.push(handler);
    }
    let dfpm_stores = oh_context.into_dfpm_stores();

    // Background refreshers, all stopped by one shutdown task.
    for (store, period) in &dfpm_stores {
        Arc::clone(store).spawn_refresher(*period, refresh_token.clone());
    }
    for store in &ca_stores {
        Arc::clone(store).spawn_refresher(TRUST_REFRESH_PERIOD, refresh_token.clone());
    }
    for store in &voms_stores {
        Arc::clone(store).spawn_refresher(TRUST_REFRESH_PERIOD, refresh_token.clone());
    }
    {
        let refresh_token = refresh_token.clone();
        coordinator.register(
            "stop-refreshers",
            Box::pin(async move { refresh_token.cancel() }),
        );
    }

    let pdp = Arc::new(
        HttpPdpClient::new(config.pdp_endpoints.clone(), config.connection_timeout)
            .context("Failed to build PDP client")?,
    );

    let authz = Arc::new(AuthorizationService::new(
        pips,
        pdp,
        ObligationService::new(handlers),
        Arc::clone(&metrics),
    ));

    // Admin channel.
    let admin_addr = resolve(&config.admin.host, config.admin.port)
        .context("Cannot resolve admin address")?;
    let admin_app = admin_router(AdminState {
        entity_id: config.entity_id.clone(),
        metrics: Arc::clone(&metrics),
        password: config.admin.password.clone(),
        coordinator: Arc::clone(&coordinator),
    });
    let admin_handle = axum_server::Handle::new();
    let admin_task = tokio::spawn({
        let handle = admin_handle.clone();
        async move {
            info!(addr = %admin_addr, "Admin channel listening");
            if let Err(e) = axum_server::bind(admin_addr)
                .handle(handle)
                .serve(admin_app.into_make_service())
                .await
            {
                error!(error = %e, "Admin channel failed");
            }
        }
    });

    // Service channel, optionally TLS.
    let service_addr =
        resolve(&config.hostname, config.port).context("Cannot resolve service address")?;
    let service_app = service_router(
        ServiceState {
            authz,
            codec: Arc::new(JsonCodec),
        },
        config.maximum_requests,
        config.request_queue_size,
    );
    let service_listener = bind_listener(
        service_addr,
        config.receive_buffer_size,
        config.send_buffer_size,
    )
    .with_context(|| format!("Failed to bind service listener on {service_addr}"))?;
    let service_handle = axum_server::Handle::new();
    let service_task = if config.enable_ssl {
        let rustls_config = tls::server_config(&config)
            .await
            .context("Failed to build TLS configuration")?;
        let handle = service_handle.clone();
        tokio::spawn(async move {
            info!(addr = %service_addr, "Service channel listening (TLS)");
            if let Err(e) = axum_server::from_tcp_rustls(service_listener, rustls_config)
                .handle(handle)
                .serve(service_app.into_make_service())
                .await
            {
                error!(error = %e, "Service channel failed");
            }
        })
    } else {
        let handle = service_handle.clone();
        tokio::spawn(async move {
            info!(addr = %service_addr, "Service channel listening");
            if let Err(e) = axum_server::from_tcp(service_listener)
                .handle(handle)
                .serve(service_app.into_make_service())
                .await
            {
                error!(error = %e, "Service channel failed");
            }
        })
    };

    // Closing the listeners is the last step of coordinated shutdown.
    {
        let token = coordinator.token();
        let service_handle = service_handle.clone();
        let admin_handle = admin_handle.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            service_handle.graceful_shutdown(Some(DRAIN_TIMEOUT));
            admin_handle.graceful_shutdown(Some(DRAIN_TIMEOUT));
        });
    }

    tokio::select! {
        _ = shutdown_signal() => {
            info!("Signal received, shutting down");
            coordinator.shutdown().await;
        }
        _ = coordinator.token().cancelled() => {
            // Admin-channel shutdown already ran the tasks.
        }
    }

    let _ = service_task.await;
    let _ = admin_task.await;
    info!("wardend stopped");
    Ok(())
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let Some(addr) = (host, port).to_socket_addrs()?.next() else {
        bail!("{host}:{port} does not resolve");
    };
    Ok(addr)
}

/// Service listener with the configured socket buffer sizes applied.
fn bind_listener(
    addr: SocketAddr,
    receive_buffer: usize,
    send_buffer: usize,
) -> Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;
    socket.set_reuse_address(true)?;
    socket.set_recv_buffer_size(receive_buffer)?;
    socket.set_send_buffer_size(send_buffer)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
