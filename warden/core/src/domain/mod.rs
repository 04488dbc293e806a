// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! Domain model: the in-memory XACML request/response structures, FQANs,
//! and POSIX account values. Everything here is plain data with pure logic;
//! I/O lives in the infrastructure layer.

pub mod account;
pub mod attribute;
pub mod dn;
pub mod fqan;
pub mod profile;
pub mod request;
pub mod response;

pub use account::{Group, PosixAccount};
pub use attribute::Attribute;
pub use dn::{Dn, DnError};
pub use fqan::{Fqan, FqanError};
pub use request::{Action, Environment, Request, Resource, Subject};
pub use response::{
    AttributeAssignment, AuthzResult, Decision, Obligation, Response, Status,
};
