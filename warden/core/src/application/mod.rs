// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! Application services: the request pipeline and its pluggable stages.

pub mod account_mapper;
pub mod obligations;
pub mod pipeline;
pub mod pips;

pub use account_mapper::{AccountMapper, MappingError};
pub use pipeline::AuthorizationService;
