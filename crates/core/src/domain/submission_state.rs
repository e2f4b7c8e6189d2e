use serde::{Deserialize, Serialize};

/// Build state of the latest submission of a participation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    /// The latest submission already has a result.
    #[default]
    NoPending,
    /// A submission exists and its build is expected to finish in time.
    Building,
    /// A pending submission did not receive a result in the expected time frame.
    Failed,
}

impl SubmissionState {
    pub fn is_building(self) -> bool {
        self == Self::Building
    }
}
