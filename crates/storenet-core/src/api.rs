//! Response envelope shared by the fabric and DNS APIs
//!
//! Every response carries `{success, errors, messages, result}`. It is
//! decoded into an [`ApiEnvelope`] and then collapsed into an [`ApiOutcome`];
//! `success=false` is always a hard failure of the step that made the call.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One entry of an envelope's `errors` or `messages` list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
}

impl fmt::Display for ApiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Raw response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    #[serde(default)]
    pub messages: Vec<ApiMessage>,
    pub result: Option<T>,
}

/// Tagged result of one remote call
#[derive(Debug, Clone, PartialEq)]
pub enum ApiOutcome<T> {
    Success(T),
    Failure(Vec<ApiMessage>),
}

impl<T> ApiEnvelope<T> {
    /// Collapse into a tagged outcome
    ///
    /// A successful envelope without a `result` counts as a failure.
    pub fn into_outcome(self) -> ApiOutcome<T> {
        match (self.success, self.result) {
            (true, Some(result)) => ApiOutcome::Success(result),
            (true, None) => ApiOutcome::Failure(vec![ApiMessage {
                code: None,
                message: "response carried no result".to_string(),
            }]),
            (false, _) => ApiOutcome::Failure(self.errors),
        }
    }
}

impl<T> ApiOutcome<T> {
    /// Convert into a result, embedding the error list verbatim
    pub fn into_result(self, service: &str, action: &str) -> Result<T> {
        match self {
            ApiOutcome::Success(value) => Ok(value),
            ApiOutcome::Failure(errors) => {
                let payload = serde_json::to_string(&errors).unwrap_or_else(|_| {
                    errors
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("; ")
                });
                Err(Error::upstream(service, format!("{}: {}", action, payload)))
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ApiOutcome::Success(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Created {
        id: String,
    }

    #[test]
    fn success_envelope_yields_result() {
        let envelope: ApiEnvelope<Created> = serde_json::from_value(json!({
            "success": true,
            "errors": [],
            "messages": [],
            "result": { "id": "abc" }
        }))
        .unwrap();

        let outcome = envelope.into_outcome();
        assert!(outcome.is_success());
        assert_eq!(
            outcome.into_result("fabric", "create site").unwrap(),
            Created { id: "abc".into() }
        );
    }

    #[test]
    fn failure_embeds_error_payload() {
        let envelope: ApiEnvelope<Created> = serde_json::from_value(json!({
            "success": false,
            "errors": [{ "code": 1003, "message": "connector already in use" }],
            "messages": [],
            "result": null
        }))
        .unwrap();

        let err = envelope
            .into_outcome()
            .into_result("fabric", "create site")
            .unwrap_err();
        match err {
            Error::UpstreamRejected { service, message } => {
                assert_eq!(service, "fabric");
                assert!(message.contains("create site"));
                assert!(message.contains("connector already in use"));
                assert!(message.contains("1003"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_result_is_failure() {
        let envelope: ApiEnvelope<Created> =
            serde_json::from_value(json!({ "success": true })).unwrap();
        assert!(!envelope.into_outcome().is_success());
    }
}
