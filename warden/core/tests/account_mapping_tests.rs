// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! Account mapper integration tests over real mapping files, a real
//! gridmapdir, and passwd/group fixtures.

use std::sync::Arc;

use tempfile::TempDir;

use warden_core::application::account_mapper::{AccountMapper, MappingError};
use warden_core::domain::dn::Dn;
use warden_core::domain::fqan::Fqan;
use warden_core::infrastructure::dfpm::DfpmStore;
use warden_core::infrastructure::gridmapdir::PoolAccountManager;
use warden_core::infrastructure::posix::PosixDb;

struct Fixture {
    _dir: TempDir,
    mapper: AccountMapper,
    gridmapdir: std::path::PathBuf,
}

fn fixture(account_map: &str, group_map: &str, passwd: &str, group: &str) -> Fixture {
    let dir = TempDir::new().unwrap();
    let account_path = dir.path().join("grid-mapfile");
    let group_path = dir.path().join("group-mapfile");
    let passwd_path = dir.path().join("passwd");
    let group_db_path = dir.path().join("group");
    let gridmapdir = dir.path().join("gridmapdir");

    std::fs::write(&account_path, account_map).unwrap();
    std::fs::write(&group_path, group_map).unwrap();
    std::fs::write(&passwd_path, passwd).unwrap();
    std::fs::write(&group_db_path, group).unwrap();
    std::fs::create_dir(&gridmapdir).unwrap();

    let mapper = AccountMapper::new(
        Arc::new(DfpmStore::open(&account_path).unwrap()),
        Arc::new(DfpmStore::open(&group_path).unwrap()),
        Arc::new(PoolAccountManager::new(&gridmapdir).unwrap()),
        Arc::new(PosixDb::with_paths(&passwd_path, &group_db_path)),
        false,
    );

    Fixture {
        _dir: dir,
        mapper,
        gridmapdir,
    }
}

fn alice() -> Dn {
    Dn::parse("/C=CH/O=CERN/CN=Alice").unwrap()
}

#[test]
fn test_pool_account_mapping_end_to_end() {
    let fixture = fixture(
        "\"/atlas/prod\" .atlas\n",
        "\"/atlas/prod\" atlasprod atlas\n",
        "atlas001:x:50001:1001::/home/atlas001:/bin/sh\n",
        "atlasprod:x:2001:\natlas:x:1001:\n",
    );

    let primary = Fqan::parse("/atlas/prod").unwrap();
    let account = fixture.mapper.map(&alice(), Some(&primary), &[]).unwrap();

    assert_eq!(account.login_name, "atlas001");
    assert_eq!(account.uid, 50001);
    assert_eq!(account.primary_group.name, "atlasprod");
    assert_eq!(account.primary_group.gid, 2001);
    assert_eq!(account.secondary_groups.len(), 1);
    assert_eq!(account.secondary_groups[0].name, "atlas");
    assert_eq!(account.secondary_groups[0].gid, 1001);

    // The lease file uses the encoded DN plus the mapped groups.
    let lease = fixture
        .gridmapdir
        .join("%2FC%3DCH%2FO%3DCERN%2FCN%3DAlice:atlasprod:atlas");
    assert!(lease.exists(), "lease file missing");
}

#[test]
fn test_repeated_mapping_is_stable() {
    let fixture = fixture(
        "\"/atlas/prod\" .atlas\n",
        "\"/atlas/prod\" atlasprod\n",
        "atlas001:x:50001:2001::/h:/bin/sh\natlas002:x:50002:2001::/h:/bin/sh\n",
        "atlasprod:x:2001:\n",
    );

    let primary = Fqan::parse("/atlas/prod").unwrap();
    let first = fixture.mapper.map(&alice(), Some(&primary), &[]).unwrap();
    let second = fixture.mapper.map(&alice(), Some(&primary), &[]).unwrap();
    assert_eq!(first.login_name, second.login_name);
}

#[test]
fn test_distinct_subjects_get_distinct_pool_accounts() {
    let fixture = fixture(
        "\"/atlas/*\" .atlas\n",
        "\"/atlas/*\" atlasprod\n",
        "atlas001:x:50001:2001::/h:/bin/sh\natlas002:x:50002:2001::/h:/bin/sh\n",
        "atlasprod:x:2001:\n",
    );

    let primary = Fqan::parse("/atlas/prod").unwrap();
    let bob = Dn::parse("/C=CH/O=CERN/CN=Bob").unwrap();
    let a = fixture.mapper.map(&alice(), Some(&primary), &[]).unwrap();
    let b = fixture.mapper.map(&bob, Some(&primary), &[]).unwrap();
    assert_ne!(a.login_name, b.login_name);
}

#[test]
fn test_static_account_skips_the_pool() {
    let fixture = fixture(
        "\"/C=CH/O=CERN/CN=Alice\" alicegrid\n",
        "\"/atlas\" atlas\n",
        "alicegrid:x:1000:1001::/home/alice:/bin/sh\n",
        "atlas:x:1001:\n",
    );

    let primary = Fqan::parse("/atlas").unwrap();
    let account = fixture.mapper.map(&alice(), Some(&primary), &[]).unwrap();
    assert_eq!(account.login_name, "alicegrid");
    // No lease files appear for static accounts.
    assert_eq!(std::fs::read_dir(&fixture.gridmapdir).unwrap().count(), 0);
}

#[test]
fn test_dn_only_mapping_reads_primary_group_from_passwd() {
    let fixture = fixture(
        "\"/C=CH/O=CERN/CN=Alice\" .dteam\n",
        "\"/unused\" unused\n",
        "dteam001:x:60001:3001::/h:/bin/sh\n",
        "dteam:x:3001:\n",
    );

    let account = fixture.mapper.map(&alice(), None, &[]).unwrap();
    assert_eq!(account.login_name, "dteam001");
    assert_eq!(account.uid, 60001);
    // GID comes from the passwd entry, the name from the group database.
    assert_eq!(account.primary_group.gid, 3001);
    assert_eq!(account.primary_group.name, "dteam");
    assert!(account.secondary_groups.is_empty());
}

#[test]
fn test_secondary_fqans_contribute_groups_in_order() {
    let fixture = fixture(
        "\"/atlas/prod\" .atlas\n",
        "\"/atlas/prod\" atlasprod\n\"/atlas/calib\" atlascalib atlas\n\"/atlas\" atlas\n",
        "atlas001:x:50001:2001::/h:/bin/sh\n",
        "atlasprod:x:2001:\natlascalib:x:2002:\natlas:x:1001:\n",
    );

    let primary = Fqan::parse("/atlas/prod").unwrap();
    let secondaries = [
        Fqan::parse("/atlas/calib").unwrap(),
        Fqan::parse("/atlas").unwrap(),
    ];
    let account = fixture
        .mapper
        .map(&alice(), Some(&primary), &secondaries)
        .unwrap();

    let names: Vec<&str> = account
        .secondary_groups
        .iter()
        .map(|g| g.name.as_str())
        .collect();
    // First-seen order, duplicates collapsed.
    assert_eq!(names, vec!["atlascalib", "atlas"]);
}

#[test]
fn test_unmatched_subject_is_no_account_mapping() {
    let fixture = fixture(
        "\"/cms\" cmsuser\n",
        "\"/cms\" cms\n",
        "cmsuser:x:1:1::/h:/bin/sh\n",
        "cms:x:1:\n",
    );

    let primary = Fqan::parse("/atlas").unwrap();
    let err = fixture
        .mapper
        .map(&alice(), Some(&primary), &[])
        .unwrap_err();
    assert!(matches!(err, MappingError::NoAccountMapping { .. }));
}

#[test]
fn test_missing_group_mapping_is_no_group_mapping() {
    let fixture = fixture(
        "\"/atlas\" .atlas\n",
        "\"/cms\" cms\n",
        "atlas001:x:1:1::/h:/bin/sh\n",
        "atlas:x:1:\n",
    );

    let primary = Fqan::parse("/atlas").unwrap();
    let err = fixture
        .mapper
        .map(&alice(), Some(&primary), &[])
        .unwrap_err();
    assert!(matches!(err, MappingError::NoGroupMapping { .. }));
}

#[test]
fn test_unknown_account_name_is_mapping_failed() {
    let fixture = fixture(
        "\"/atlas\" nosuchuser\n",
        "\"/atlas\" atlas\n",
        "other:x:1:1::/h:/bin/sh\n",
        "atlas:x:1:\n",
    );

    let primary = Fqan::parse("/atlas").unwrap();
    let err = fixture
        .mapper
        .map(&alice(), Some(&primary), &[])
        .unwrap_err();
    assert!(matches!(err, MappingError::Failed(_)));
}

#[test]
fn test_first_match_wins_over_later_more_specific_entries() {
    let fixture = fixture(
        "\"/cms/*\" cmsuser\n\"/cms/prod\" cmsprod\n",
        "\"/cms/*\" cms\n",
        "cmsuser:x:10:20::/h:/bin/sh\ncmsprod:x:11:20::/h:/bin/sh\n",
        "cms:x:20:\n",
    );

    let primary = Fqan::parse("/cms/prod").unwrap();
    let account = fixture.mapper.map(&alice(), Some(&primary), &[]).unwrap();
    assert_eq!(account.login_name, "cmsuser");
}
