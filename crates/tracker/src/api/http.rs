//! 基于 reqwest 的平台 REST 客户端。

use std::collections::HashMap;

use async_trait::async_trait;
use buildwatch_api_types::ProgrammingSubmission;
use buildwatch_core::{ExerciseId, ParticipationId};
use reqwest::{Client, RequestBuilder};
use tracing::{debug, warn};

use super::{PendingSubmissions, SubmissionApi};
use crate::TrackerConfig;
use crate::error::Result;

/// 通过 HTTP 访问平台服务器的 `SubmissionApi` 实现。
pub struct HttpSubmissionApi {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpSubmissionApi {
    /// 根据配置创建客户端。
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn post_empty(&self, path: &str) -> Result<()> {
        self.authorized(self.client.post(self.url(path)))
            .json(&serde_json::json!({}))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

#[async_trait]
impl SubmissionApi for HttpSubmissionApi {
    async fn latest_pending_submission(
        &self,
        participation_id: ParticipationId,
    ) -> Result<Option<ProgrammingSubmission>> {
        let path = format!(
            "programming-exercise-participations/{participation_id}/latest-pending-submission"
        );
        let body = self
            .authorized(self.client.get(self.url(&path)))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_optional_submission(&body)
    }

    async fn latest_pending_submissions(
        &self,
        exercise_id: ExerciseId,
    ) -> Result<PendingSubmissions> {
        let path = format!("programming-exercises/{exercise_id}/latest-pending-submissions");
        let raw: HashMap<String, Option<ProgrammingSubmission>> = self
            .authorized(self.client.get(self.url(&path)))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(parse_participation_keys(raw))
    }

    async fn trigger_build(&self, participation_id: ParticipationId) -> Result<()> {
        debug!(participation_id = %participation_id, "triggering build");
        self.post_empty(&format!(
            "programming-submissions/{participation_id}/trigger-build"
        ))
        .await
    }

    async fn trigger_instructor_build(&self, participation_id: ParticipationId) -> Result<()> {
        debug!(participation_id = %participation_id, "triggering instructor build");
        self.post_empty(&format!(
            "programming-submissions/{participation_id}/trigger-instructor-build"
        ))
        .await
    }

    async fn trigger_instructor_build_all(&self, exercise_id: ExerciseId) -> Result<()> {
        debug!(exercise_id = %exercise_id, "triggering instructor build for all participations");
        self.post_empty(&format!(
            "programming-exercises/{exercise_id}/trigger-instructor-build-all"
        ))
        .await
    }

    async fn trigger_instructor_build_for(
        &self,
        exercise_id: ExerciseId,
        participation_ids: &[ParticipationId],
    ) -> Result<()> {
        debug!(
            exercise_id = %exercise_id,
            count = participation_ids.len(),
            "triggering instructor build for participations"
        );
        let path = format!("programming-exercises/{exercise_id}/trigger-instructor-build");
        self.authorized(self.client.post(self.url(&path)))
            .json(participation_ids)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

/// 服务器在没有待处理提交时返回空响应体或 `null`。
fn parse_optional_submission(body: &str) -> Result<Option<ProgrammingSubmission>> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(None);
    }
    Ok(serde_json::from_str(body)?)
}

fn parse_participation_keys(
    raw: HashMap<String, Option<ProgrammingSubmission>>,
) -> PendingSubmissions {
    raw.into_iter()
        .filter_map(|(key, submission)| match key.parse::<ParticipationId>() {
            Ok(participation_id) => Some((participation_id, submission)),
            Err(err) => {
                warn!(key = %key, error = %err, "skipping non-numeric participation key");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_or_null_body_means_no_pending_submission() {
        assert!(parse_optional_submission("").expect("empty body").is_none());
        assert!(parse_optional_submission(" null ").expect("null body").is_none());
    }

    #[test]
    fn submission_body_is_parsed() {
        let submission = parse_optional_submission(
            r#"{"id": 42, "submissionDate": "2019-11-05T10:00:00Z"}"#,
        )
        .expect("submission body")
        .expect("submission present");

        assert_eq!(submission.id, 42);
    }

    #[test]
    fn participation_keys_are_parsed_and_invalid_keys_skipped() {
        let raw: HashMap<String, Option<ProgrammingSubmission>> = serde_json::from_str(
            r#"{
                "7": {"id": 42, "submissionDate": "2019-11-05T10:00:00Z"},
                "8": null,
                "abc": null
            }"#,
        )
        .expect("raw map");

        let parsed = parse_participation_keys(raw);

        assert_eq!(parsed.len(), 2);
        assert_eq!(
            parsed
                .get(&ParticipationId::new(7))
                .and_then(|submission| submission.as_ref())
                .map(|submission| submission.id),
            Some(42)
        );
        assert!(matches!(parsed.get(&ParticipationId::new(8)), Some(None)));
    }

    #[test]
    fn urls_are_built_from_trimmed_base() {
        let api = HttpSubmissionApi::new(&TrackerConfig::for_server("http://localhost:8080/"))
            .expect("client should build");

        assert_eq!(
            api.url("programming-submissions/5/trigger-build"),
            "http://localhost:8080/api/programming-submissions/5/trigger-build"
        );
    }
}
