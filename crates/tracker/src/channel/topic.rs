use std::fmt::{Display, Formatter};
use std::str::FromStr;

use buildwatch_core::ParticipationId;

use crate::error::TrackerError;

const PREFIX: &str = "/topic/participation/";
const NEW_SUBMISSION: &str = "newSubmission";
const NEW_RESULTS: &str = "newResults";

/// 单个参与的推送主题。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    NewSubmission(ParticipationId),
    NewResults(ParticipationId),
}

impl Topic {
    pub fn participation_id(self) -> ParticipationId {
        match self {
            Self::NewSubmission(id) | Self::NewResults(id) => id,
        }
    }
}

impl Display for Topic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NewSubmission(id) => write!(f, "{PREFIX}{id}/{NEW_SUBMISSION}"),
            Self::NewResults(id) => write!(f, "{PREFIX}{id}/{NEW_RESULTS}"),
        }
    }
}

impl FromStr for Topic {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || TrackerError::UnknownTopic(s.to_string());
        let rest = s.strip_prefix(PREFIX).ok_or_else(unknown)?;
        let (id, kind) = rest.split_once('/').ok_or_else(unknown)?;
        let id: ParticipationId = id.parse().map_err(|_| unknown())?;

        match kind {
            NEW_SUBMISSION => Ok(Self::NewSubmission(id)),
            NEW_RESULTS => Ok(Self::NewResults(id)),
            _ => Err(unknown()),
        }
    }
}
