//! Response envelopes and the failure code taxonomy.
//!
//! Every processing-service answer is one of these envelopes; callers never
//! see a bare transport error from this service.
use std::fmt;

use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::core::job::Job;

const RESULT_OK: &str = "1";
const RESULT_FAILED: &str = "0";
const CODE_OK: &str = "OK";

/// Failure codes returned in envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Malformed or missing required field
    BadRequest,
    /// Missing or blank input text
    MissingInput,
    /// No job stored under the key
    NotFound,
    /// Store, transport or empty processor response
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "E400",
            ErrorCode::MissingInput => "E401",
            ErrorCode::NotFound => "E404",
            ErrorCode::Internal => "E500",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "E400" => Some(ErrorCode::BadRequest),
            "E401" => Some(ErrorCode::MissingInput),
            "E404" => Some(ErrorCode::NotFound),
            "E500" => Some(ErrorCode::Internal),
            _ => None,
        }
    }

    /// Transport status class for this code.
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::BadRequest | ErrorCode::MissingInput => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map an envelope code to a status: `OK` → 200, taxonomy codes by class,
/// anything unrecognised → 500.
pub fn status_for_code(code: &str) -> StatusCode {
    if code == CODE_OK {
        return StatusCode::OK;
    }
    ErrorCode::from_code(code)
        .map(|c| c.status())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Answer to `process`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub result: String,
    pub code: String,
    /// Processor output on success, failure message otherwise
    pub answer: String,
}

impl ProcessResponse {
    pub fn success(answer: impl Into<String>) -> Self {
        Self {
            result: RESULT_OK.to_string(),
            code: CODE_OK.to_string(),
            answer: answer.into(),
        }
    }

    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            result: RESULT_FAILED.to_string(),
            code: code.as_str().to_string(),
            answer: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == RESULT_OK && self.code == CODE_OK
    }

    pub fn status(&self) -> StatusCode {
        status_for_code(&self.code)
    }
}

/// Answer to `query`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub result: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl QueryResponse {
    pub fn success(job: Job) -> Self {
        Self {
            result: RESULT_OK.to_string(),
            code: CODE_OK.to_string(),
            key: Some(job.key),
            input_text: Some(job.input_text),
            output_text: job.output_text,
            created_at: Some(job.created_at),
            updated_at: Some(job.updated_at),
            message: None,
        }
    }

    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            result: RESULT_FAILED.to_string(),
            code: code.as_str().to_string(),
            key: None,
            input_text: None,
            output_text: None,
            created_at: None,
            updated_at: None,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == RESULT_OK && self.code == CODE_OK
    }

    pub fn status(&self) -> StatusCode {
        status_for_code(&self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_to_status_table() {
        assert_eq!(status_for_code("OK"), StatusCode::OK);
        assert_eq!(status_for_code("E400"), StatusCode::BAD_REQUEST);
        assert_eq!(status_for_code("E401"), StatusCode::BAD_REQUEST);
        assert_eq!(status_for_code("E404"), StatusCode::NOT_FOUND);
        assert_eq!(status_for_code("E500"), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_for_code("E999"), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_process_envelopes() {
        let ok = ProcessResponse::success("done");
        assert!(ok.is_success());
        assert_eq!(ok.status(), StatusCode::OK);

        let failed = ProcessResponse::failure(ErrorCode::MissingInput, "text is required");
        assert!(!failed.is_success());
        assert_eq!(failed.result, "0");
        assert_eq!(failed.code, "E401");
        assert_eq!(failed.answer, "text is required");
    }

    #[test]
    fn test_query_failure_serialization_omits_job_fields() {
        let body = serde_json::to_value(QueryResponse::failure(ErrorCode::NotFound, "nope")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"result": "0", "code": "E404", "message": "nope"})
        );
    }

    #[test]
    fn test_query_success_uses_camel_case() {
        let job = Job::new("k", "in", Utc::now());
        let body = serde_json::to_value(QueryResponse::success(job)).unwrap();
        assert_eq!(body["key"], "k");
        assert_eq!(body["inputText"], "in");
        assert!(body.get("outputText").is_none());
        assert!(body.get("createdAt").is_some());
    }
}
