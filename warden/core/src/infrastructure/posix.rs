// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! Local account database.
//!
//! Parses `/etc/passwd` and `/etc/group` directly instead of calling
//! `getpwnam(3)`, caching each file until its mtime advances. Mapping is
//! called on every authorized request, so the cache keeps the per-request
//! cost to two stats.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PosixDbError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswdEntry {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    pub gid: u32,
    pub members: Vec<String>,
}

struct Cached<T> {
    mtime: SystemTime,
    entries: Vec<T>,
}

struct CachedFile<T> {
    path: PathBuf,
    state: Mutex<Option<Cached<T>>>,
}

impl<T: Clone> CachedFile<T> {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: Mutex::new(None),
        }
    }

    fn entries(&self, parse: fn(&str) -> Vec<T>) -> Result<Vec<T>, PosixDbError> {
        let mtime = std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(|source| PosixDbError::Io {
                path: self.path.clone(),
                source,
            })?;

        let mut state = self.state.lock();
        if let Some(cached) = state.as_ref() {
            if cached.mtime == mtime {
                return Ok(cached.entries.clone());
            }
        }

        let content = std::fs::read_to_string(&self.path).map_err(|source| PosixDbError::Io {
            path: self.path.clone(),
            source,
        })?;
        let entries = parse(&content);
        debug!(file = %self.path.display(), count = entries.len(), "Reloaded account database");
        *state = Some(Cached {
            mtime,
            entries: entries.clone(),
        });
        Ok(entries)
    }
}

/// Cached view of the local passwd and group databases.
pub struct PosixDb {
    passwd: CachedFile<PasswdEntry>,
    group: CachedFile<GroupEntry>,
}

impl PosixDb {
    pub fn new() -> Self {
        Self::with_paths("/etc/passwd", "/etc/group")
    }

    /// Alternate database files; used by the test suites and by sites that
    /// publish a dedicated grid account database.
    pub fn with_paths(passwd: impl Into<PathBuf>, group: impl Into<PathBuf>) -> Self {
        Self {
            passwd: CachedFile::new(passwd.into()),
            group: CachedFile::new(group.into()),
        }
    }

    pub fn user_by_name(&self, name: &str) -> Result<Option<PasswdEntry>, PosixDbError> {
        Ok(self
            .passwd
            .entries(parse_passwd)?
            .into_iter()
            .find(|e| e.name == name))
    }

    pub fn group_by_name(&self, name: &str) -> Result<Option<GroupEntry>, PosixDbError> {
        Ok(self
            .group
            .entries(parse_group)?
            .into_iter()
            .find(|e| e.name == name))
    }

    pub fn group_by_gid(&self, gid: u32) -> Result<Option<GroupEntry>, PosixDbError> {
        Ok(self
            .group
            .entries(parse_group)?
            .into_iter()
            .find(|e| e.gid == gid))
    }
}

impl Default for PosixDb {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_passwd(content: &str) -> Vec<PasswdEntry> {
    content
        .lines()
        .filter_map(|line| {
            // NIS compat entries and comments are not local accounts.
            if line.starts_with(['#', '+', '-']) {
                return None;
            }
            let mut fields = line.split(':');
            let name = fields.next()?;
            let _passwd = fields.next()?;
            let uid = fields.next()?.trim().parse().ok()?;
            let gid = fields.next()?.trim().parse().ok()?;
            Some(PasswdEntry {
                name: name.to_string(),
                uid,
                gid,
            })
        })
        .collect()
}

fn parse_group(content: &str) -> Vec<GroupEntry> {
    content
        .lines()
        .filter_map(|line| {
            if line.starts_with(['#', '+', '-']) {
                return None;
            }
            let mut fields = line.split(':');
            let name = fields.next()?;
            let _passwd = fields.next()?;
            let gid = fields.next()?.trim().parse().ok()?;
            let members = fields
                .next()
                .map(|m| {
                    m.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            Some(GroupEntry {
                name: name.to_string(),
                gid,
                members,
            })
        })
        .collect()
}
