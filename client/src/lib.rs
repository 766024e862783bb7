#![deny(clippy::unwrap_used, clippy::expect_used)]

pub use api::Error;
pub use api::ListId;
pub use api::RemoteTask;
pub use api::Result;
pub use api::TaskId;
pub use api::TaskList;
pub use api::TaskPayload;
pub use api::TaskStatus;
pub use api::TasksBackend;
pub use api::TokenSource;
use quadrant_api as api;

/// Production endpoint for the Google Tasks API.
pub const DEFAULT_BASE_URL: &str = "https://tasks.googleapis.com/tasks/v1";

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "online")]
mod http;

#[cfg(feature = "mock")]
pub use mock::MockClient;

#[cfg(feature = "online")]
pub use http::HttpClient;
