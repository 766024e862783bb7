#![deny(clippy::unwrap_used, clippy::expect_used)]

mod api;
pub mod notes;
pub mod title;

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
pub use title::Quadrant;
pub use title::TitleTag;
