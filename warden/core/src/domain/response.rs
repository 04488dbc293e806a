// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! Decision model: results, status, and obligations.
//!
//! Results are produced by the PDP and mutated only by obligation handlers
//! during the post-processing phase.

use serde::{Deserialize, Serialize};

use super::request::Request;

/// The four XACML decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Permit,
    Deny,
    Indeterminate,
    NotApplicable,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Decision::Permit => "Permit",
            Decision::Deny => "Deny",
            Decision::Indeterminate => "Indeterminate",
            Decision::NotApplicable => "NotApplicable",
        };
        f.write_str(s)
    }
}

/// XACML status code URIs.
pub mod status_codes {
    pub const OK: &str = "urn:oasis:names:tc:xacml:1.0:status:ok";
    pub const PROCESSING_ERROR: &str = "urn:oasis:names:tc:xacml:1.0:status:processing-error";
    pub const MISSING_ATTRIBUTE: &str = "urn:oasis:names:tc:xacml:1.0:status:missing-attribute";
}

/// Diagnostic status attached to a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Status {
    pub fn ok() -> Self {
        Self {
            code: status_codes::OK.to_string(),
            message: None,
        }
    }

    pub fn processing_error(message: impl Into<String>) -> Self {
        Self {
            code: status_codes::PROCESSING_ERROR.to_string(),
            message: Some(message.into()),
        }
    }
}

/// A single attribute assignment inside an obligation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeAssignment {
    #[serde(rename = "attributeId")]
    pub attribute_id: String,
    #[serde(rename = "dataType")]
    pub data_type: String,
    pub value: String,
}

impl AttributeAssignment {
    pub fn new(
        attribute_id: impl Into<String>,
        data_type: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            attribute_id: attribute_id.into(),
            data_type: data_type.into(),
            value: value.into(),
        }
    }
}

/// An obligation the enforcement point must fulfill when the result's
/// decision matches `fulfill_on`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obligation {
    pub id: String,
    #[serde(rename = "fulfillOn")]
    pub fulfill_on: Decision,
    #[serde(default)]
    pub assignments: Vec<AttributeAssignment>,
}

impl Obligation {
    pub fn new(id: impl Into<String>, fulfill_on: Decision) -> Self {
        Self {
            id: id.into(),
            fulfill_on,
            assignments: Vec::new(),
        }
    }

    pub fn with_assignment(mut self, assignment: AttributeAssignment) -> Self {
        self.assignments.push(assignment);
        self
    }
}

/// One decision for one resource, with the obligations attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthzResult {
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(rename = "resourceId", skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub obligations: Vec<Obligation>,
}

impl AuthzResult {
    pub fn new(decision: Decision) -> Self {
        Self {
            decision,
            status: None,
            resource_id: None,
            obligations: Vec::new(),
        }
    }

    pub fn obligation(&self, id: &str) -> Option<&Obligation> {
        self.obligations.iter().find(|o| o.id == id)
    }

    /// Rewrite the result to Indeterminate with a processing-error status.
    /// Invoked when a PIP or obligation handler fails for this result.
    pub fn set_indeterminate(&mut self, message: impl Into<String>) {
        self.decision = Decision::Indeterminate;
        self.status = Some(Status::processing_error(message));
    }
}

/// The complete response: one result per resource plus the request echo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub results: Vec<AuthzResult>,
    pub request: Request,
}

impl Response {
    pub fn new(request: Request, results: Vec<AuthzResult>) -> Self {
        Self { results, request }
    }
}
