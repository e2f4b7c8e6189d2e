//! Shared request/response types exchanged with the programming platform.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: String,
}

impl HealthCheckResponse {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// A submission of a programming exercise as the platform serializes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgrammingSubmission {
    pub id: i64,
    pub submission_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(default)]
    pub build_failed: bool,
    #[serde(default)]
    pub build_artifact: bool,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub submission_type: Option<String>,
}

/// Error payload sent on the new-submission topic when the server could not
/// create or build a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionError {
    pub error: String,
    pub participation_id: i64,
}

/// Payload of the new-submission topic.
///
/// Decoding tries the error shape first: only payloads carrying an `error`
/// field are errors, everything else must be a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubmissionMessage {
    Error(SubmissionError),
    Submission(ProgrammingSubmission),
}

/// Reference to the submission a result was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRef {
    pub id: i64,
}

/// Build result as delivered on the result topic of a participation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildResult {
    pub id: i64,
    #[serde(default)]
    pub submission: Option<SubmissionRef>,
    #[serde(default)]
    pub successful: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_date: Option<DateTime<Utc>>,
}

impl BuildResult {
    /// Id of the submission this result belongs to, if the server sent one.
    pub fn submission_id(&self) -> Option<i64> {
        self.submission.map(|submission| submission.id)
    }
}
