// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! Trust material for PKIX and VOMS validation.
//!
//! The CA store reads a grid `trustInfoDir` (CA certificates plus CRLs, PEM
//! or DER, as maintained by the site's trust-anchor updater) into an
//! immutable snapshot. The VOMS store reads an LSC directory
//! (`vomsdir/<vo>/<host>.lsc`), each file naming the accepted attribute
//! authority by its certificate DN chain.
//!
//! Both stores refresh periodically; a failed refresh keeps the previous
//! snapshot, so a half-written update on disk never takes the service down.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use x509_parser::prelude::*;

use crate::domain::dn::Dn;
use crate::infrastructure::x509::x509_name_to_dn;

#[derive(Debug, Error)]
pub enum TrustStoreError {
    #[error("trust directory {path} is unreadable: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("trust directory {path} contains no CA certificates")]
    NoAnchors { path: PathBuf },
}

/// An immutable snapshot of CA certificates and CRLs, stored as DER.
#[derive(Debug, Default)]
pub struct TrustAnchors {
    cas: Vec<Vec<u8>>,
    crls: Vec<Vec<u8>>,
}

impl TrustAnchors {
    pub fn ca_count(&self) -> usize {
        self.cas.len()
    }

    pub fn crl_count(&self) -> usize {
        self.crls.len()
    }

    /// DER of the anchor whose subject equals `issuer`, if any.
    pub fn anchor_for(&self, issuer: &Dn) -> Option<&[u8]> {
        self.cas.iter().map(Vec::as_slice).find(|der| {
            X509Certificate::from_der(der)
                .map(|(_, cert)| &x509_name_to_dn(cert.subject()) == issuer)
                .unwrap_or(false)
        })
    }

    /// DERs of every CRL issued by `issuer`.
    pub fn crls_for(&self, issuer: &Dn) -> Vec<&[u8]> {
        self.crls
            .iter()
            .map(Vec::as_slice)
            .filter(|der| {
                CertificateRevocationList::from_der(der)
                    .map(|(_, crl)| &x509_name_to_dn(crl.issuer()) == issuer)
                    .unwrap_or(false)
            })
            .collect()
    }
}

/// CA trust store over a grid trust-info directory.
pub struct CaStore {
    dir: PathBuf,
    snapshot: ArcSwap<TrustAnchors>,
}

impl CaStore {
    /// Load eagerly. An unreadable or empty directory is fatal here;
    /// the same condition during refresh only logs.
    pub fn open(dir: impl Into<PathBuf>) -> Result<CaStore, TrustStoreError> {
        let dir = dir.into();
        let anchors = load_anchors(&dir)?;
        if anchors.cas.is_empty() {
            return Err(TrustStoreError::NoAnchors { path: dir });
        }
        info!(
            dir = %dir.display(),
            cas = anchors.ca_count(),
            crls = anchors.crl_count(),
            "Loaded CA trust store"
        );
        Ok(CaStore {
            dir,
            snapshot: ArcSwap::from_pointee(anchors),
        })
    }

    pub fn snapshot(&self) -> Arc<TrustAnchors> {
        self.snapshot.load_full()
    }

    pub fn refresh(&self) {
        match load_anchors(&self.dir) {
            Ok(anchors) if !anchors.cas.is_empty() => {
                debug!(dir = %self.dir.display(), cas = anchors.ca_count(), "Swapped CA trust store");
                self.snapshot.store(Arc::new(anchors));
            }
            Ok(_) => {
                warn!(dir = %self.dir.display(), "Trust store refresh found no CAs, keeping previous snapshot");
            }
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Trust store refresh failed, keeping previous snapshot");
            }
        }
    }

    pub fn spawn_refresher(
        self: Arc<Self>,
        period: Duration,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let store = self;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => store.refresh(),
                    _ = shutdown.cancelled() => break,
                }
            }
        })
    }
}

fn load_anchors(dir: &Path) -> Result<TrustAnchors, TrustStoreError> {
    let mut anchors = TrustAnchors::default();
    let entries = std::fs::read_dir(dir).map_err(|source| TrustStoreError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping unreadable trust file");
                continue;
            }
        };
        classify_trust_file(&path, &bytes, &mut anchors);
    }
    Ok(anchors)
}

/// Sort file content into CA certificates and CRLs, accepting both PEM and
/// raw DER. Anything else (keys, signing policy files, info files) is
/// ignored.
fn classify_trust_file(path: &Path, bytes: &[u8], anchors: &mut TrustAnchors) {
    if bytes.starts_with(b"-----BEGIN") {
        match ::pem::parse_many(bytes) {
            Ok(blocks) => {
                for block in blocks {
                    match block.tag() {
                        "CERTIFICATE" => anchors.cas.push(block.contents().to_vec()),
                        "X509 CRL" => anchors.crls.push(block.contents().to_vec()),
                        _ => {}
                    }
                }
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping unparseable PEM trust file");
            }
        }
        return;
    }

    if X509Certificate::from_der(bytes).is_ok() {
        anchors.cas.push(bytes.to_vec());
    } else if CertificateRevocationList::from_der(bytes).is_ok() {
        anchors.crls.push(bytes.to_vec());
    }
}

/// One accepted attribute authority: its certificate DN chain, leaf first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LscEntry {
    pub chain: Vec<Dn>,
}

#[derive(Debug, Default)]
pub struct LscTable {
    by_vo: HashMap<String, Vec<LscEntry>>,
}

impl LscTable {
    /// True when `issuer` is a listed attribute authority for `vo`.
    pub fn is_trusted(&self, vo: &str, issuer: &Dn) -> bool {
        self.by_vo
            .get(vo)
            .map(|entries| {
                entries
                    .iter()
                    .any(|entry| entry.chain.first() == Some(issuer))
            })
            .unwrap_or(false)
    }

    pub fn vo_count(&self) -> usize {
        self.by_vo.len()
    }
}

/// VOMS trust store over an LSC directory.
pub struct VomsTrustStore {
    dir: PathBuf,
    snapshot: ArcSwap<LscTable>,
}

impl VomsTrustStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<VomsTrustStore, TrustStoreError> {
        let dir = dir.into();
        let table = load_lsc(&dir)?;
        info!(dir = %dir.display(), vos = table.vo_count(), "Loaded VOMS trust store");
        Ok(VomsTrustStore {
            dir,
            snapshot: ArcSwap::from_pointee(table),
        })
    }

    pub fn snapshot(&self) -> Arc<LscTable> {
        self.snapshot.load_full()
    }

    pub fn refresh(&self) {
        match load_lsc(&self.dir) {
            Ok(table) => self.snapshot.store(Arc::new(table)),
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "VOMS trust store refresh failed, keeping previous snapshot");
            }
        }
    }

    pub fn spawn_refresher(
        self: Arc<Self>,
        period: Duration,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let store = self;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => store.refresh(),
                    _ = shutdown.cancelled() => break,
                }
            }
        })
    }
}

fn load_lsc(dir: &Path) -> Result<LscTable, TrustStoreError> {
    let mut table = LscTable::default();
    let vo_dirs = std::fs::read_dir(dir).map_err(|source| TrustStoreError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    for vo_entry in vo_dirs.flatten() {
        let vo_path = vo_entry.path();
        if !vo_path.is_dir() {
            continue;
        }
        let vo = vo_entry.file_name().to_string_lossy().into_owned();
        let Ok(files) = std::fs::read_dir(&vo_path) else {
            continue;
        };
        for file in files.flatten() {
            let path = file.path();
            if path.extension().and_then(|e| e.to_str()) != Some("lsc") {
                continue;
            }
            match parse_lsc_file(&path) {
                Ok(entry) => table.by_vo.entry(vo.clone()).or_default().push(entry),
                Err(reason) => {
                    warn!(file = %path.display(), reason = %reason, "Skipping unparseable LSC file");
                }
            }
        }
    }
    Ok(table)
}

fn parse_lsc_file(path: &Path) -> Result<LscEntry, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let mut chain = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("---") {
            continue;
        }
        chain.push(Dn::parse(line).map_err(|e| e.to_string())?);
    }
    if chain.is_empty() {
        return Err("no DN entries".to_string());
    }
    Ok(LscEntry { chain })
}
