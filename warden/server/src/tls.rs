// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! TLS setup for the service channel.
//!
//! Uses the `SECURITY` credentials. With client-certificate
//! authentication enabled, the verifier roots are the CA certificates of
//! `trustInfoDir`, the same anchors the X.509 PIP validates against.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use tracing::info;

use warden_core::config::ServiceConfig;

pub async fn server_config(config: &ServiceConfig) -> Result<RustlsConfig> {
    let Some(cert_path) = &config.security.service_certificate else {
        bail!("enableSSL requires SECURITY.serviceCertificate");
    };
    let Some(key_path) = &config.security.service_private_key else {
        bail!("enableSSL requires SECURITY.servicePrivateKey");
    };

    let cert_chain = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let builder = rustls::ServerConfig::builder();
    let server_config = if config.require_client_cert_authentication {
        let Some(trust_dir) = &config.security.trust_info_dir else {
            bail!("requireClientCertAuthentication requires SECURITY.trustInfoDir");
        };
        let mut roots = RootCertStore::empty();
        let mut loaded = 0usize;
        for entry in std::fs::read_dir(trust_dir)
            .with_context(|| format!("reading {}", trust_dir.display()))?
            .flatten()
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            for cert in load_certs(&path).unwrap_or_default() {
                if roots.add(cert).is_ok() {
                    loaded += 1;
                }
            }
        }
        if loaded == 0 {
            bail!("no usable CA certificates in {}", trust_dir.display());
        }
        info!(anchors = loaded, "Client certificate verification enabled");
        let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
            .build()
            .context("building client certificate verifier")?;
        builder
            .with_client_cert_verifier(verifier)
            .with_single_cert(cert_chain, key)?
    } else {
        builder
            .with_no_client_auth()
            .with_single_cert(cert_chain, key)?
    };

    Ok(RustlsConfig::from_config(Arc::new(server_config)))
}

fn load_certs(path: &std::path::Path) -> Result<Vec<CertificateDer<'static>>> {
    let content =
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let certs: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut content.as_slice()).collect::<Result<_, _>>()?;
    Ok(certs)
}

fn load_key(path: &std::path::Path) -> Result<PrivateKeyDer<'static>> {
    let content =
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    rustls_pemfile::private_key(&mut content.as_slice())?
        .with_context(|| format!("no private key in {}", path.display()))
}
