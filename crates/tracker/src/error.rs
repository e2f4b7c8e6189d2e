use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("平台接口错误: {0}")]
    Api(String),

    #[error("推送通道错误: {0}")]
    Channel(String),

    #[error("未知推送主题: {0}")]
    UnknownTopic(String),

    #[error("领域错误: {0}")]
    Domain(#[from] buildwatch_core::DomainError),

    #[error("HTTP 错误: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use buildwatch_core::DomainError;

    use super::*;

    #[test]
    fn domain_and_json_errors_convert() {
        let err: TrackerError = DomainError::InvalidEtaBucketSize(0).into();
        assert!(matches!(err, TrackerError::Domain(_)));
        assert!(err.to_string().starts_with("领域错误"));

        let json = serde_json::from_str::<serde_json::Value>("not json")
            .expect_err("input is not json");
        assert!(matches!(TrackerError::from(json), TrackerError::Json(_)));
    }
}
