// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! Process-wide request counters, served as plain text on the admin
//! status page.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::domain::Decision;

#[derive(Debug)]
pub struct ServiceMetrics {
    started: Instant,
    total_requests: AtomicU64,
    permits: AtomicU64,
    denies: AtomicU64,
    errors: AtomicU64,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            total_requests: AtomicU64::new(0),
            permits: AtomicU64::new(0),
            denies: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn record_decision(&self, decision: Decision) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        match decision {
            Decision::Permit => {
                self.permits.fetch_add(1, Ordering::Relaxed);
            }
            Decision::Deny => {
                self.denies.fetch_add(1, Ordering::Relaxed);
            }
            Decision::Indeterminate => {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
            Decision::NotApplicable => {}
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn permits(&self) -> u64 {
        self.permits.load(Ordering::Relaxed)
    }

    pub fn denies(&self) -> u64 {
        self.denies.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Plain-text rendering for `GET /status`.
    pub fn render_status(&self, entity_id: &str) -> String {
        format!(
            "Service: {}\nStatus: OK\nUptime: {} seconds\nRequests: {}\nPermits: {}\nDenies: {}\nErrors: {}\n",
            entity_id,
            self.uptime_seconds(),
            self.total_requests(),
            self.permits(),
            self.denies(),
            self.errors(),
        )
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}
