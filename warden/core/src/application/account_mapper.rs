// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! DN/FQAN → POSIX account resolution.
//!
//! Two mapping tables drive the resolution: the account map yields the
//! *account indicator* (a static login name, or a pool prefix marked with
//! a leading `.`), the group map yields the primary and secondary groups.
//! Pool indicators go through the gridmapdir lease; everything ends in
//! `/etc/passwd` / `/etc/group` lookups.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::domain::dn::Dn;
use crate::domain::fqan::Fqan;
use crate::domain::{Group, PosixAccount};
use crate::infrastructure::dfpm::{DfpmStore, MapKey};
use crate::infrastructure::gridmapdir::{subject_key, PoolAccountManager, PoolError};
use crate::infrastructure::posix::{PosixDb, PosixDbError};

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("no account mapping for subject {subject:?}")]
    NoAccountMapping { subject: String },

    #[error("no group mapping for subject {subject:?}")]
    NoGroupMapping { subject: String },

    #[error("mapping failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Posix(#[from] PosixDbError),
}

pub struct AccountMapper {
    account_map: Arc<DfpmStore>,
    group_map: Arc<DfpmStore>,
    pool: Arc<PoolAccountManager>,
    posix: Arc<PosixDb>,
    /// Consult the account map by DN before the FQANs.
    prefer_dn: bool,
}

impl AccountMapper {
    pub fn new(
        account_map: Arc<DfpmStore>,
        group_map: Arc<DfpmStore>,
        pool: Arc<PoolAccountManager>,
        posix: Arc<PosixDb>,
        prefer_dn: bool,
    ) -> Self {
        Self {
            account_map,
            group_map,
            pool,
            posix,
            prefer_dn,
        }
    }

    /// Resolve the subject to a local account. The FQAN list order is
    /// significant: the primary FQAN is consulted before the secondaries.
    pub fn map(
        &self,
        dn: &Dn,
        primary_fqan: Option<&Fqan>,
        secondary_fqans: &[Fqan],
    ) -> Result<PosixAccount, MappingError> {
        let indicator = self.account_indicator(dn, primary_fqan, secondary_fqans)?;
        let pool_prefix = indicator.strip_prefix('.');

        let account = match primary_fqan {
            Some(primary) => {
                let (primary_group, secondary_groups) =
                    self.resolve_groups(dn, primary, secondary_fqans)?;
                let login = match pool_prefix {
                    Some(prefix) => {
                        let key = subject_key(
                            &dn.to_openssl_form(),
                            Some(&primary_group),
                            &secondary_groups,
                        );
                        self.pool.lease(prefix, &key)?
                    }
                    None => indicator.clone(),
                };
                self.build_account(&login, &primary_group, &secondary_groups)?
            }
            None => {
                let login = match pool_prefix {
                    Some(prefix) => {
                        let key = subject_key(&dn.to_openssl_form(), None, &[]);
                        self.pool.lease(prefix, &key)?
                    }
                    None => indicator.clone(),
                };
                self.account_from_passwd(&login)?
            }
        };

        debug!(
            subject = %dn,
            login = %account.login_name,
            uid = account.uid,
            "Mapped subject to local account"
        );
        Ok(account)
    }

    /// First hit in the account map decides. Key order is FQANs first
    /// (primary, then secondaries) and DN last, or DN first in
    /// DN-preferred mode.
    fn account_indicator(
        &self,
        dn: &Dn,
        primary_fqan: Option<&Fqan>,
        secondary_fqans: &[Fqan],
    ) -> Result<String, MappingError> {
        let mut keys: Vec<MapKey> = Vec::new();
        let fqan_keys = primary_fqan
            .into_iter()
            .chain(secondary_fqans.iter())
            .map(|f| MapKey::Fqan(f.clone()));
        if self.prefer_dn {
            keys.push(MapKey::Dn(dn.clone()));
            keys.extend(fqan_keys);
        } else {
            keys.extend(fqan_keys);
            keys.push(MapKey::Dn(dn.clone()));
        }

        let table = self.account_map.snapshot();
        for key in &keys {
            if let Some(entry) = table.lookup(key) {
                return entry
                    .targets
                    .first()
                    .cloned()
                    .ok_or_else(|| MappingError::NoAccountMapping {
                        subject: dn.to_string(),
                    });
            }
        }
        Err(MappingError::NoAccountMapping {
            subject: dn.to_string(),
        })
    }

    /// Primary group comes from the primary FQAN's first target; that
    /// entry's remaining targets and every secondary-FQAN hit contribute
    /// secondaries, deduplicated in first-seen order.
    fn resolve_groups(
        &self,
        dn: &Dn,
        primary_fqan: &Fqan,
        secondary_fqans: &[Fqan],
    ) -> Result<(String, Vec<String>), MappingError> {
        let table = self.group_map.snapshot();

        let primary_entry = table
            .lookup(&MapKey::Fqan(primary_fqan.clone()))
            .filter(|entry| !entry.targets.is_empty())
            .ok_or_else(|| MappingError::NoGroupMapping {
                subject: dn.to_string(),
            })?;
        let primary_group = primary_entry.targets[0].clone();

        let mut secondary_groups: Vec<String> = Vec::new();
        let push_unique = |group: &str, secondary_groups: &mut Vec<String>| {
            if group != primary_group && !secondary_groups.iter().any(|g| g == group) {
                secondary_groups.push(group.to_string());
            }
        };

        for group in &primary_entry.targets[1..] {
            push_unique(group, &mut secondary_groups);
        }
        for fqan in secondary_fqans {
            if let Some(entry) = table.lookup(&MapKey::Fqan(fqan.clone())) {
                for group in &entry.targets {
                    push_unique(group, &mut secondary_groups);
                }
            }
        }

        Ok((primary_group, secondary_groups))
    }

    fn build_account(
        &self,
        login: &str,
        primary_group: &str,
        secondary_groups: &[String],
    ) -> Result<PosixAccount, MappingError> {
        let user = self
            .posix
            .user_by_name(login)?
            .ok_or_else(|| MappingError::Failed(format!("unknown account {login:?}")))?;
        let primary = self
            .posix
            .group_by_name(primary_group)?
            .ok_or_else(|| MappingError::Failed(format!("unknown group {primary_group:?}")))?;

        let mut secondaries = Vec::with_capacity(secondary_groups.len());
        for name in secondary_groups {
            let group = self
                .posix
                .group_by_name(name)?
                .ok_or_else(|| MappingError::Failed(format!("unknown group {name:?}")))?;
            secondaries.push(Group::new(&group.name, group.gid));
        }

        Ok(PosixAccount {
            login_name: user.name,
            uid: user.uid,
            primary_group: Group::new(&primary.name, primary.gid),
            secondary_groups: secondaries,
        })
    }

    /// Without FQANs the primary group comes from the account's passwd
    /// entry. The GID observed there is authoritative; the group name is
    /// looked up by that GID for display only.
    fn account_from_passwd(&self, login: &str) -> Result<PosixAccount, MappingError> {
        let user = self
            .posix
            .user_by_name(login)?
            .ok_or_else(|| MappingError::Failed(format!("unknown account {login:?}")))?;
        let group = self
            .posix
            .group_by_gid(user.gid)?
            .ok_or_else(|| MappingError::Failed(format!("unknown gid {}", user.gid)))?;

        Ok(PosixAccount {
            login_name: user.name,
            uid: user.uid,
            primary_group: Group::new(&group.name, user.gid),
            secondary_groups: Vec::new(),
        })
    }
}
