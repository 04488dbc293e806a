// Copyright (c) 2026 Warden Project
// SPDX-License-Identifier: Apache-2.0

//! Wire codec seam.
//!
//! The service endpoint is defined against this trait; the XACML/SAML
//! SOAP profile serializer is an external collaborator that plugs in
//! here. The JSON codec below is the embedded implementation used by the
//! in-tree endpoint and the test suites.

use thiserror::Error;

use crate::domain::{Request, Response};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("response serialization failed: {0}")]
    Serialization(String),
}

pub trait MessageCodec: Send + Sync {
    fn content_type(&self) -> &'static str;

    fn decode_request(&self, bytes: &[u8]) -> Result<Request, CodecError>;

    fn encode_response(&self, response: &Response) -> Result<Vec<u8>, CodecError>;
}

/// Plain JSON rendering of the in-memory model.
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn decode_request(&self, bytes: &[u8]) -> Result<Request, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed(e.to_string()))
    }

    fn encode_response(&self, response: &Response) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(response).map_err(|e| CodecError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::attribute::data_types;
    use crate::domain::{Attribute, AuthzResult, Decision, Subject};

    #[test]
    fn test_round_trip() {
        let mut request = Request::new();
        let mut subject = Subject::new();
        subject.add_attribute(
            Attribute::new("urn:test:id", data_types::STRING).with_value("value"),
        );
        request.subjects.push(subject);

        let codec = JsonCodec;
        let response = Response::new(request.clone(), vec![AuthzResult::new(Decision::Permit)]);
        let bytes = codec.encode_response(&response).unwrap();
        let echoed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(echoed["results"][0]["decision"], "Permit");

        let decoded = codec
            .decode_request(&serde_json::to_vec(&request).unwrap())
            .unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_malformed_input() {
        let codec = JsonCodec;
        assert!(matches!(
            codec.decode_request(b"not json"),
            Err(CodecError::Malformed(_))
        ));
    }
}
