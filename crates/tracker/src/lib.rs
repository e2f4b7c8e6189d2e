pub mod api;
pub mod channel;
pub mod config;
pub mod error;
pub mod events;
pub mod store;
pub mod tracker;

mod command;
mod registry;
mod timer;

#[cfg(feature = "ws-api")]
pub mod ws_api;

pub use api::{HttpSubmissionApi, PendingSubmissions, SubmissionApi};
pub use channel::{PushChannel, Topic, TopicHub};
pub use config::TrackerConfig;
pub use error::{Result, TrackerError};
pub use events::{EventBroadcaster, EventStream, TrackerEvent};
pub use store::StateStore;
pub use tracker::{EtaStream, StateStream, SubmissionTracker};
