// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! DN/FQAN → POSIX mapping (DFPM) store.
//!
//! An ordered first-match table loaded from a gridmap-style file:
//!
//! ```text
//! # account indicators
//! "/atlas/prod" .atlas
//! "/C=CH/O=CERN/CN=Alice" alice
//! ```
//!
//! The pattern sits between double quotes; the rest of the line is a comma-
//! or whitespace-separated target list. Lookups scan entries in file order
//! and return the first whose pattern kind matches the key kind and whose
//! pattern matches the key. Refresh re-reads the file when its mtime has
//! advanced and atomically swaps the snapshot, so concurrent lookups always
//! observe either the old table or the new one.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::dn::{self, Dn};
use crate::domain::fqan::Fqan;

#[derive(Debug, Error)]
pub enum DfpmError {
    #[error("failed to read mapping file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A lookup key: either a subject DN or an FQAN.
#[derive(Debug, Clone)]
pub enum MapKey {
    Dn(Dn),
    Fqan(Fqan),
}

/// A parsed pattern from the mapping file.
#[derive(Debug, Clone)]
enum MapPattern {
    Dn(Dn),
    Fqan(Fqan),
}

#[derive(Debug, Clone)]
pub struct DfpmEntry {
    /// Pattern exactly as written in the file, for diagnostics.
    pub raw_pattern: String,
    pattern: MapPattern,
    pub targets: Vec<String>,
}

impl DfpmEntry {
    fn matches(&self, key: &MapKey) -> bool {
        match (&self.pattern, key) {
            (MapPattern::Dn(pattern), MapKey::Dn(dn)) => pattern == dn,
            (MapPattern::Fqan(pattern), MapKey::Fqan(fqan)) => {
                match pattern.matches(fqan) {
                    Ok(matched) => matched,
                    Err(e) => {
                        warn!(pattern = %self.raw_pattern, error = %e, "Skipping malformed pattern during lookup");
                        false
                    }
                }
            }
            _ => false,
        }
    }
}

/// An immutable snapshot of the mapping table.
#[derive(Debug, Default)]
pub struct DfpmTable {
    entries: Vec<DfpmEntry>,
}

impl DfpmTable {
    /// Parse the gridmap file format. Lines whose pattern fails to parse
    /// are skipped with a warning; parsing continues.
    pub fn parse(content: &str, origin: &Path) -> DfpmTable {
        let mut entries = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_line(line) {
                Ok(entry) => entries.push(entry),
                Err(reason) => {
                    warn!(
                        file = %origin.display(),
                        line = lineno + 1,
                        reason = %reason,
                        "Skipping unparseable mapping entry"
                    );
                }
            }
        }
        DfpmTable { entries }
    }

    /// First-match lookup. Returns the matched entry, whose `targets` and
    /// `raw_pattern` identify the mapping.
    pub fn lookup(&self, key: &MapKey) -> Option<&DfpmEntry> {
        self.entries.iter().find(|entry| entry.matches(key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_line(line: &str) -> Result<DfpmEntry, String> {
    let rest = line
        .strip_prefix('"')
        .ok_or_else(|| "pattern must be quoted".to_string())?;
    let (raw_pattern, remainder) = rest
        .split_once('"')
        .ok_or_else(|| "unterminated pattern quote".to_string())?;

    let pattern = if dn::is_dn_pattern(raw_pattern) {
        MapPattern::Dn(Dn::parse(raw_pattern).map_err(|e| e.to_string())?)
    } else {
        MapPattern::Fqan(Fqan::parse(raw_pattern).map_err(|e| e.to_string())?)
    };

    let targets: Vec<String> = remainder
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    Ok(DfpmEntry {
        raw_pattern: raw_pattern.to_string(),
        pattern,
        targets,
    })
}

/// A mapping store backed by a file, refreshed periodically.
pub struct DfpmStore {
    path: PathBuf,
    table: ArcSwap<DfpmTable>,
    last_mtime: Mutex<Option<SystemTime>>,
}

impl DfpmStore {
    /// Load the file eagerly; an unreadable file at construction time is an
    /// error (at refresh time it only logs).
    pub fn open(path: impl Into<PathBuf>) -> Result<DfpmStore, DfpmError> {
        let path = path.into();
        let (table, mtime) = read_table(&path)?;
        info!(file = %path.display(), entries = table.len(), "Loaded mapping file");
        Ok(DfpmStore {
            path,
            table: ArcSwap::from_pointee(table),
            last_mtime: Mutex::new(mtime),
        })
    }

    /// The current snapshot. Callers hold it for the duration of one
    /// request; refreshes never mutate a published table.
    pub fn snapshot(&self) -> Arc<DfpmTable> {
        self.table.load_full()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file if its mtime has advanced. On I/O failure the
    /// previous table is retained and an error is logged.
    pub fn refresh_if_changed(&self) {
        let mtime = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(e) => {
                error!(file = %self.path.display(), error = %e, "Cannot stat mapping file, keeping previous table");
                return;
            }
        };

        {
            let last = self.last_mtime.lock();
            if *last == Some(mtime) {
                return;
            }
        }

        match read_table(&self.path) {
            Ok((table, new_mtime)) => {
                debug!(file = %self.path.display(), entries = table.len(), "Mapping file changed, swapping table");
                self.table.store(Arc::new(table));
                *self.last_mtime.lock() = new_mtime;
            }
            Err(e) => {
                error!(file = %self.path.display(), error = %e, "Mapping file refresh failed, keeping previous table");
            }
        }
    }

    /// Spawn the periodic refresher. Cancelling the returned token's parent
    /// stops the task; this is registered as a shutdown task by the runtime.
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
                    _ = tick.tick() => store.refresh_if_changed(),
                    _ = shutdown.cancelled() => {
                        debug!(file = %store.path.display(), "Stopping mapping file refresher");
                        break;
                    }
                }
            }
        })
    }
}

fn read_table(path: &Path) -> Result<(DfpmTable, Option<SystemTime>), DfpmError> {
    let content = std::fs::read_to_string(path).map_err(|source| DfpmError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mtime = std::fs::metadata(path).ok().and_then(|m| m.modified().ok());
    Ok((DfpmTable::parse(&content, path), mtime))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fqan_key(s: &str) -> MapKey {
        MapKey::Fqan(Fqan::parse(s).unwrap())
    }

    fn dn_key(s: &str) -> MapKey {
        MapKey::Dn(Dn::parse(s).unwrap())
    }

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let table = DfpmTable::parse(
            "# comment\n\n\"/atlas\" .atlas\n   \n\"/cms\" cmsuser\n",
            Path::new("test"),
        );
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_parse_skips_bad_lines_and_continues() {
        let table = DfpmTable::parse(
            "\"/atlas\" .atlas\nnot-quoted x\n\"/bad//fqan\" y\n\"/cms\" cmsuser\n",
            Path::new("test"),
        );
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_targets_split_on_commas_and_whitespace() {
        let table = DfpmTable::parse("\"/atlas\" atlasprod, atlas  extra\n", Path::new("test"));
        let entry = table.lookup(&fqan_key("/atlas")).unwrap();
        assert_eq!(entry.targets, vec!["atlasprod", "atlas", "extra"]);
    }

    #[test]
    fn test_first_match_wins() {
        let table = DfpmTable::parse(
            "\"/cms/*\" cmsuser\n\"/cms/prod\" cmsprod\n",
            Path::new("test"),
        );
        let entry = table.lookup(&fqan_key("/cms/prod")).unwrap();
        assert_eq!(entry.targets, vec!["cmsuser"]);
    }

    #[test]
    fn test_key_kind_must_match_pattern_kind() {
        let table = DfpmTable::parse(
            "\"/C=CH/O=CERN/CN=Alice\" alice\n\"/atlas\" .atlas\n",
            Path::new("test"),
        );
        // The DN entry comes first, but an FQAN key skips it.
        let entry = table.lookup(&fqan_key("/atlas")).unwrap();
        assert_eq!(entry.targets, vec![".atlas"]);
        let entry = table.lookup(&dn_key("CN=Alice,O=CERN,C=CH")).unwrap();
        assert_eq!(entry.targets, vec!["alice"]);
    }

    #[test]
    fn test_no_match_returns_none() {
        let table = DfpmTable::parse("\"/atlas\" .atlas\n", Path::new("test"));
        assert!(table.lookup(&fqan_key("/cms")).is_none());
        assert!(table.lookup(&dn_key("CN=Bob,C=CH")).is_none());
    }

    #[test]
    fn test_refresh_swaps_on_mtime_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid-mapfile");
        std::fs::write(&path, "\"/atlas\" .atlas\n").unwrap();

        let store = DfpmStore::open(&path).unwrap();
        assert_eq!(store.snapshot().len(), 1);

        std::fs::write(&path, "\"/atlas\" .atlas\n\"/cms\" cmsuser\n").unwrap();
        // Force a visible mtime advance regardless of filesystem resolution.
        filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(4102444800, 0))
            .unwrap();
        store.refresh_if_changed();
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn test_refresh_keeps_table_when_file_disappears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid-mapfile");
        std::fs::write(&path, "\"/atlas\" .atlas\n").unwrap();

        let store = DfpmStore::open(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        store.refresh_if_changed();
        assert_eq!(store.snapshot().len(), 1);
    }
}
