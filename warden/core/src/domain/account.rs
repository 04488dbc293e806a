// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! Local POSIX account model produced by the account mapper.

use serde::{Deserialize, Serialize};

/// A named POSIX group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub gid: u32,
}

impl Group {
    pub fn new(name: impl Into<String>, gid: u32) -> Self {
        Self {
            name: name.into(),
            gid,
        }
    }
}

/// The complete mapping result: login name, UID, primary group, and
/// secondary groups in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosixAccount {
    pub login_name: String,
    pub uid: u32,
    pub primary_group: Group,
    pub secondary_groups: Vec<Group>,
}

impl PosixAccount {
    /// All GIDs, primary first.
    pub fn gids(&self) -> Vec<u32> {
        std::iter::once(self.primary_group.gid)
            .chain(self.secondary_groups.iter().map(|g| g.gid))
            .collect()
    }
}
