// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! The local-environment-map obligation handler.
//!
//! When the PDP permits and attaches the map-to-local-environment
//! obligation, this handler reads the subject identity off the enriched
//! request, resolves it through the account mapper, and replaces the
//! trigger obligation with the concrete POSIX mapping obligations the
//! enforcement point consumes.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::application::account_mapper::AccountMapper;
use crate::config::{ConfigError, SectionConfig};
use crate::domain::attribute::data_types;
use crate::domain::dn::Dn;
use crate::domain::fqan::Fqan;
use crate::domain::profile::{assignment, obligation, subject as subject_ids};
use crate::domain::{
    AttributeAssignment, AuthzResult, Obligation, PosixAccount, Request, Subject,
};
use crate::infrastructure::dfpm::DfpmStore;
use crate::infrastructure::gridmapdir::PoolAccountManager;
use crate::infrastructure::posix::PosixDb;

use super::{ObligationError, ObligationHandler, OhContext};

pub const TAG: &str = "gridmap-oh";

pub struct AccountMapHandler {
    id: String,
    precedence: i32,
    mapper: Arc<AccountMapper>,
}

impl AccountMapHandler {
    /// Section keys: `accountMap`, `groupMap`, `gridmapDir` (required),
    /// `preferDNForLoginName` (default false), `refreshIntervalSecs`
    /// (default 600), `passwdFile` / `groupFile` (defaults `/etc/passwd`,
    /// `/etc/group`).
    pub fn from_section(
        section: &SectionConfig,
        context: &OhContext,
    ) -> Result<Arc<dyn ObligationHandler>, ConfigError> {
        let refresh = std::time::Duration::from_secs(section.get_u64(
            "refreshIntervalSecs",
            600,
            1..=86_400,
        ));
        let account_map = open_store(section, "accountMap", refresh, context)?;
        let group_map = open_store(section, "groupMap", refresh, context)?;

        let gridmap_dir = section.require_str("gridmapDir")?;
        let pool = PoolAccountManager::new(&gridmap_dir).map_err(|e| {
            ConfigError::InvalidValue {
                section: section.name.clone(),
                key: "gridmapDir".to_string(),
                reason: e.to_string(),
            }
        })?;

        let posix = match (section.get_str("passwdFile"), section.get_str("groupFile")) {
            (None, None) => PosixDb::new(),
            (passwd, group) => PosixDb::with_paths(
                passwd.unwrap_or_else(|| "/etc/passwd".to_string()),
                group.unwrap_or_else(|| "/etc/group".to_string()),
            ),
        };

        let mapper = Arc::new(AccountMapper::new(
            account_map,
            group_map,
            Arc::new(pool),
            Arc::new(posix),
            section.get_bool("preferDNForLoginName", false),
        ));

        Ok(Arc::new(AccountMapHandler {
            id: section.name.clone(),
            precedence: section.precedence,
            mapper,
        }))
    }
}

fn open_store(
    section: &SectionConfig,
    key: &str,
    refresh: std::time::Duration,
    context: &OhContext,
) -> Result<Arc<DfpmStore>, ConfigError> {
    let path = section.require_str(key)?;
    let store = DfpmStore::open(&path).map_err(|e| ConfigError::InvalidValue {
        section: section.name.clone(),
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    let store = Arc::new(store);
    context.register_dfpm_store(Arc::clone(&store), refresh);
    Ok(store)
}

#[async_trait]
impl ObligationHandler for AccountMapHandler {
    fn id(&self) -> &str {
        &self.id
    }

    fn handled_obligation(&self) -> &str {
        obligation::LOCAL_ENVIRONMENT_MAP
    }

    fn precedence(&self) -> i32 {
        self.precedence
    }

    async fn apply(
        &self,
        request: &Request,
        result: &mut AuthzResult,
    ) -> Result<(), ObligationError> {
        let Some(trigger) = result.obligation(obligation::LOCAL_ENVIRONMENT_MAP) else {
            return Ok(());
        };
        if trigger.fulfill_on != result.decision {
            // Not our decision to act on; leave the obligation for the PEP.
            return Ok(());
        }

        let subject = request
            .subjects
            .first()
            .ok_or_else(|| ObligationError::failed(&self.id, "request has no subject"))?;
        let identity = SubjectIdentity::from_subject(subject)
            .map_err(|reason| ObligationError::failed(&self.id, reason))?;

        // The mapper stats and links on a shared filesystem; keep that off
        // the async workers.
        let mapper = Arc::clone(&self.mapper);
        let SubjectIdentity {
            dn,
            primary_fqan,
            secondary_fqans,
        } = identity;
        let account = tokio::task::spawn_blocking(move || {
            mapper.map(&dn, primary_fqan.as_ref(), &secondary_fqans)
        })
        .await
        .map_err(|e| ObligationError::failed(&self.id, e))?
        .map_err(|e| ObligationError::failed(&self.id, e))?;

        debug!(handler = %self.id, login = %account.login_name, "Fulfilled account-map obligation");
        rewrite_obligations(result, &account);
        Ok(())
    }
}

struct SubjectIdentity {
    dn: Dn,
    primary_fqan: Option<Fqan>,
    secondary_fqans: Vec<Fqan>,
}

impl SubjectIdentity {
    fn from_subject(subject: &Subject) -> Result<SubjectIdentity, String> {
        let dn_value = subject
            .attribute(subject_ids::X509_ID)
            .and_then(|attr| attr.value())
            .ok_or_else(|| "subject carries no X.509 id attribute".to_string())?;
        let dn = Dn::parse(dn_value).map_err(|e| e.to_string())?;

        let primary_fqan = subject
            .attribute(subject_ids::PRIMARY_FQAN)
            .and_then(|attr| attr.value())
            .map(Fqan::parse)
            .transpose()
            .map_err(|e| e.to_string())?;

        let mut secondary_fqans = Vec::new();
        if let Some(all) = subject.attribute(subject_ids::FQAN) {
            for value in &all.values {
                let fqan = Fqan::parse(value).map_err(|e| e.to_string())?;
                if Some(&fqan) != primary_fqan.as_ref() {
                    secondary_fqans.push(fqan);
                }
            }
        }

        Ok(SubjectIdentity {
            dn,
            primary_fqan,
            secondary_fqans,
        })
    }
}

/// Swap the trigger obligation for the concrete mapping obligations.
fn rewrite_obligations(result: &mut AuthzResult, account: &PosixAccount) {
    let decision = result.decision;
    result
        .obligations
        .retain(|o| o.id != obligation::LOCAL_ENVIRONMENT_MAP);

    result.obligations.push(
        Obligation::new(obligation::USERNAME, decision).with_assignment(
            AttributeAssignment::new(
                assignment::USERNAME,
                data_types::STRING,
                &account.login_name,
            ),
        ),
    );

    result.obligations.push(
        Obligation::new(obligation::UIDGID, decision)
            .with_assignment(AttributeAssignment::new(
                assignment::POSIX_UID,
                data_types::STRING,
                account.uid.to_string(),
            ))
            .with_assignment(AttributeAssignment::new(
                assignment::POSIX_GID,
                data_types::STRING,
                account.primary_group.gid.to_string(),
            )),
    );

    if !account.secondary_groups.is_empty() {
        let mut secondary = Obligation::new(obligation::SECONDARY_GIDS, decision);
        for group in &account.secondary_groups {
            secondary = secondary.with_assignment(AttributeAssignment::new(
                assignment::POSIX_GID,
                data_types::STRING,
                group.gid.to_string(),
            ));
        }
        result.obligations.push(secondary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Decision, Group};

    #[test]
    fn test_rewrite_replaces_trigger_with_mapping_obligations() {
        let mut result = AuthzResult::new(Decision::Permit);
        result.obligations.push(Obligation::new(
            obligation::LOCAL_ENVIRONMENT_MAP,
            Decision::Permit,
        ));

        let account = PosixAccount {
            login_name: "atlas001".to_string(),
            uid: 50001,
            primary_group: Group::new("atlasprod", 2001),
            secondary_groups: vec![Group::new("atlas", 1001)],
        };
        rewrite_obligations(&mut result, &account);

        assert!(result.obligation(obligation::LOCAL_ENVIRONMENT_MAP).is_none());
        let username = result.obligation(obligation::USERNAME).unwrap();
        assert_eq!(username.assignments[0].value, "atlas001");

        let uidgid = result.obligation(obligation::UIDGID).unwrap();
        assert_eq!(uidgid.assignments[0].attribute_id, assignment::POSIX_UID);
        assert_eq!(uidgid.assignments[0].value, "50001");
        assert_eq!(uidgid.assignments[1].value, "2001");

        let secondary = result.obligation(obligation::SECONDARY_GIDS).unwrap();
        assert_eq!(secondary.assignments.len(), 1);
        assert_eq!(secondary.assignments[0].value, "1001");
    }

    #[test]
    fn test_identity_extraction_separates_primary_from_secondaries() {
        use crate::domain::Attribute;

        let mut subject = Subject::new();
        subject.add_attribute(
            Attribute::new(subject_ids::X509_ID, data_types::X500_NAME)
                .with_value("CN=Alice,O=CERN,C=CH"),
        );
        subject.add_attribute(
            Attribute::new(subject_ids::PRIMARY_FQAN, data_types::STRING)
                .with_value("/atlas/prod"),
        );
        subject.add_attribute(
            Attribute::new(subject_ids::FQAN, data_types::STRING)
                .with_value("/atlas/prod")
                .with_value("/atlas"),
        );

        let identity = SubjectIdentity::from_subject(&subject).unwrap();
        assert_eq!(identity.dn.to_string(), "CN=Alice,O=CERN,C=CH");
        assert_eq!(
            identity.primary_fqan.as_ref().map(Fqan::to_string),
            Some("/atlas/prod/Role=NULL/Capability=NULL".to_string())
        );
        assert_eq!(identity.secondary_fqans.len(), 1);
    }

    #[test]
    fn test_identity_requires_dn() {
        let subject = Subject::new();
        assert!(SubjectIdentity::from_subject(&subject).is_err());
    }
}
