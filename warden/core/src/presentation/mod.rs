// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! HTTP surfaces: the authorization service endpoint and the admin
//! control channel.

pub mod admin;
pub mod codec;
pub mod service;

pub use admin::{admin_router, AdminState, ShutdownCoordinator};
pub use codec::{CodecError, JsonCodec, MessageCodec};
pub use service::{service_router, ServiceState};
