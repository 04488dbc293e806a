// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! Pool-account leasing on a gridmapdir.
//!
//! The gridmapdir is a directory of zero-length files shared by every
//! process mapping subjects on the host. For a pool prefix `atlas` the
//! candidate login names are `atlas001..atlas999`, each with its own target
//! file. A lease is a hard link from the encoded subject key to one target:
//!
//! ```text
//! gridmapdir/atlas001                 <- target, nlink 2 when leased
//! gridmapdir/%2FC%3DCH%2F...%3DAlice  <- lease, same inode
//! ```
//!
//! All mutual exclusion is delegated to the filesystem: `link(2)` fails
//! with `EEXIST` when another process created the same lease first, which
//! makes lease creation atomic per subject key. The manager holds no
//! in-process state. On filesystems without POSIX link atomicity (some
//! network filesystems) this contract does not hold; that is an operational
//! constraint of the gridmapdir protocol itself.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;
use tracing::{debug, warn};

/// Everything outside `[A-Za-z0-9._-]` is `%HH`-encoded in subject keys.
const SUBJECT_KEY_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'_')
    .remove(b'-');

/// Candidate indices per pool prefix.
const POOL_RANGE: std::ops::RangeInclusive<u32> = 1..=999;

/// Bound on `EEXIST` restarts; converts an orphaned lease file into an
/// error instead of a spin.
const MAX_RESTARTS: u32 = 10;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool {prefix:?} exhausted, no free account in {prefix}001..{prefix}999")]
    Exhausted { prefix: String },

    #[error("lease for key {key:?} could not be established after {MAX_RESTARTS} attempts")]
    RetriesExhausted { key: String },

    #[error("{op} {path} failed: {source}")]
    Syscall {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PoolError {
    fn syscall(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Syscall {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Percent-encode one subject-key component.
pub fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, SUBJECT_KEY_SET).to_string()
}

/// Build the lease-file name for a subject.
///
/// DN-only subjects use the encoded OpenSSL-form DN. FQAN-scoped subjects
/// append the encoded primary group and the encoded secondary groups in
/// sorted order, joined with `:`.
pub fn subject_key(dn: &str, primary_group: Option<&str>, secondary_groups: &[String]) -> String {
    let mut key = encode_component(dn);
    if let Some(primary) = primary_group {
        key.push(':');
        key.push_str(&encode_component(primary));
        let mut sorted: Vec<&String> = secondary_groups.iter().collect();
        sorted.sort();
        for group in sorted {
            key.push(':');
            key.push_str(&encode_component(group));
        }
    }
    key
}

enum Allocation {
    Leased(String),
    /// Lost the `link(2)` race for this subject key; restart from discovery.
    Raced,
    Exhausted,
}

/// Leases pool-account login names on a shared gridmapdir.
#[derive(Debug, Clone)]
pub struct PoolAccountManager {
    dir: PathBuf,
}

impl PoolAccountManager {
    /// The directory must exist; it is shared state owned by the site
    /// administrator, never created by the service.
    pub fn new(dir: impl Into<PathBuf>) -> Result<PoolAccountManager, PoolError> {
        let dir = dir.into();
        let meta = fs::metadata(&dir).map_err(|e| PoolError::syscall("stat", &dir, e))?;
        if !meta.is_dir() {
            return Err(PoolError::syscall(
                "stat",
                &dir,
                std::io::Error::new(ErrorKind::NotADirectory, "not a directory"),
            ));
        }
        Ok(PoolAccountManager { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Obtain the login name leased to `subject_key` under `prefix`,
    /// creating the lease if necessary.
    ///
    /// Existing leases are discovered by inode identity and refreshed
    /// (mtime touch). New leases take the lowest free candidate. Losing the
    /// lease-creation race restarts discovery, so two concurrent callers
    /// with the same key converge on the same login name.
    pub fn lease(&self, prefix: &str, subject_key: &str) -> Result<String, PoolError> {
        for _ in 0..MAX_RESTARTS {
            if let Some(login) = self.find_existing(prefix, subject_key)? {
                return Ok(login);
            }
            match self.allocate(prefix, subject_key)? {
                Allocation::Leased(login) => return Ok(login),
                Allocation::Raced => continue,
                Allocation::Exhausted => {
                    return Err(PoolError::Exhausted {
                        prefix: prefix.to_string(),
                    });
                }
            }
        }
        // Only reachable when a lease file exists but no candidate shares
        // its inode, e.g. after a half-finished external prune.
        warn!(key = subject_key, "Lease file exists but matches no pool account");
        Err(PoolError::RetriesExhausted {
            key: subject_key.to_string(),
        })
    }

    /// Step 1: if the lease file exists, locate the candidate sharing its
    /// inode, refresh it, and return its login name.
    fn find_existing(&self, prefix: &str, subject_key: &str) -> Result<Option<String>, PoolError> {
        let lease_path = self.dir.join(subject_key);
        let lease_meta = match fs::metadata(&lease_path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PoolError::syscall("stat", &lease_path, e)),
        };

        for index in POOL_RANGE {
            let login = format!("{prefix}{index:03}");
            let target = self.dir.join(&login);
            match fs::metadata(&target) {
                Ok(meta) if meta.ino() == lease_meta.ino() => {
                    self.touch(&target)?;
                    debug!(key = subject_key, login = %login, "Refreshed existing pool lease");
                    return Ok(Some(login));
                }
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(PoolError::syscall("stat", &target, e)),
            }
        }

        // Tolerate a concurrent prune; the caller falls through to
        // allocation.
        Ok(None)
    }

    /// Step 2: scan candidates in ascending order and try to lease the
    /// first free one.
    fn allocate(&self, prefix: &str, subject_key: &str) -> Result<Allocation, PoolError> {
        let lease_path = self.dir.join(subject_key);

        for index in POOL_RANGE {
            let login = format!("{prefix}{index:03}");
            let target = self.dir.join(&login);

            let meta = match fs::metadata(&target) {
                Ok(meta) => meta,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    self.create_target(&target)?;
                    match fs::metadata(&target) {
                        Ok(meta) => meta,
                        Err(e) => return Err(PoolError::syscall("stat", &target, e)),
                    }
                }
                Err(e) => return Err(PoolError::syscall("stat", &target, e)),
            };

            if meta.nlink() != 1 {
                continue;
            }

            match fs::hard_link(&target, &lease_path) {
                Ok(()) => {
                    let after = fs::metadata(&target)
                        .map_err(|e| PoolError::syscall("stat", &target, e))?;
                    if after.nlink() > 2 {
                        // Another process leased the same candidate for a
                        // different key between our stat and link. Back out
                        // and keep scanning.
                        let _ = fs::remove_file(&lease_path);
                        continue;
                    }
                    self.touch(&target)?;
                    debug!(key = subject_key, login = %login, "Created pool lease");
                    return Ok(Allocation::Leased(login));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(Allocation::Raced),
                Err(e) => return Err(PoolError::syscall("link", &lease_path, e)),
            }
        }

        Ok(Allocation::Exhausted)
    }

    fn create_target(&self, target: &Path) -> Result<(), PoolError> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o644)
            .open(target)
        {
            Ok(_) => Ok(()),
            // A concurrent request created it first; the caller re-stats.
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(PoolError::syscall("create", target, e)),
        }
    }

    fn touch(&self, path: &Path) -> Result<(), PoolError> {
        filetime::set_file_mtime(path, filetime::FileTime::now())
            .map_err(|e| PoolError::syscall("utimes", path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_encode_component_escapes_outside_safe_set() {
        assert_eq!(encode_component("/CN=User A"), "%2FCN%3DUser%20A");
        assert_eq!(encode_component("plain-name_1.2"), "plain-name_1.2");
    }

    #[test]
    fn test_subject_key_dn_only() {
        assert_eq!(subject_key("/CN=User A", None, &[]), "%2FCN%3DUser%20A");
    }

    #[test]
    fn test_subject_key_sorts_secondary_groups() {
        let key = subject_key(
            "/CN=U",
            Some("atlasprod"),
            &["zebra".to_string(), "atlas".to_string()],
        );
        assert_eq!(key, "%2FCN%3DU:atlasprod:atlas:zebra");
    }

    #[test]
    fn test_first_lease_creates_linked_pair() {
        let dir = TempDir::new().unwrap();
        let manager = PoolAccountManager::new(dir.path()).unwrap();

        let login = manager.lease("atlas", "%2FCN%3DUser%20A").unwrap();
        assert_eq!(login, "atlas001");

        let target = fs::metadata(dir.path().join("atlas001")).unwrap();
        let lease = fs::metadata(dir.path().join("%2FCN%3DUser%20A")).unwrap();
        assert_eq!(target.ino(), lease.ino());
        assert_eq!(target.nlink(), 2);
    }

    #[test]
    fn test_second_lease_is_stable() {
        let dir = TempDir::new().unwrap();
        let manager = PoolAccountManager::new(dir.path()).unwrap();

        assert_eq!(manager.lease("atlas", "keyA").unwrap(), "atlas001");
        assert_eq!(manager.lease("atlas", "keyA").unwrap(), "atlas001");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_distinct_keys_take_distinct_accounts() {
        let dir = TempDir::new().unwrap();
        let manager = PoolAccountManager::new(dir.path()).unwrap();

        assert_eq!(manager.lease("atlas", "keyA").unwrap(), "atlas001");
        assert_eq!(manager.lease("atlas", "keyB").unwrap(), "atlas002");
        assert_eq!(manager.lease("atlas", "keyA").unwrap(), "atlas001");
    }

    #[test]
    fn test_prefixes_do_not_interfere() {
        let dir = TempDir::new().unwrap();
        let manager = PoolAccountManager::new(dir.path()).unwrap();

        assert_eq!(manager.lease("atlas", "keyA").unwrap(), "atlas001");
        assert_eq!(manager.lease("cms", "keyB").unwrap(), "cms001");
    }

    #[test]
    fn test_unleased_target_is_reused() {
        let dir = TempDir::new().unwrap();
        let manager = PoolAccountManager::new(dir.path()).unwrap();

        // A target file without a lease, e.g. left over from a partial
        // failure, is still the lowest free candidate.
        fs::write(dir.path().join("atlas001"), b"").unwrap();
        assert_eq!(manager.lease("atlas", "keyA").unwrap(), "atlas001");
    }

    #[test]
    fn test_orphaned_lease_fails_after_bounded_retries() {
        let dir = TempDir::new().unwrap();
        let manager = PoolAccountManager::new(dir.path()).unwrap();

        // Lease file with no matching candidate: discovery finds nothing,
        // allocation hits EEXIST forever.
        fs::write(dir.path().join("orphan-key"), b"").unwrap();
        let err = manager.lease("atlas", "orphan-key").unwrap_err();
        assert!(matches!(err, PoolError::RetriesExhausted { .. }));
    }

    #[test]
    fn test_missing_gridmapdir_is_an_error() {
        assert!(PoolAccountManager::new("/nonexistent/gridmapdir").is_err());
    }

    #[test]
    fn test_concurrent_distinct_keys() {
        let dir = TempDir::new().unwrap();
        let manager = PoolAccountManager::new(dir.path()).unwrap();

        let handles: Vec<_> = ["keyA", "keyB"]
            .into_iter()
            .map(|key| {
                let manager = manager.clone();
                std::thread::spawn(move || manager.lease("atlas", key).unwrap())
            })
            .collect();

        let mut logins: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        logins.sort();
        assert_eq!(logins, vec!["atlas001", "atlas002"]);

        for login in &logins {
            assert_eq!(fs::metadata(dir.path().join(login)).unwrap().nlink(), 2);
        }
    }

    #[test]
    fn test_concurrent_same_key_converges() {
        let dir = TempDir::new().unwrap();
        let manager = PoolAccountManager::new(dir.path()).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let manager = manager.clone();
                std::thread::spawn(move || manager.lease("atlas", "sameKey").unwrap())
            })
            .collect();

        let logins: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(logins.iter().all(|l| l == "atlas001"), "{logins:?}");
    }
}
