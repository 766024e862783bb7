use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The remote rejected the bearer token (HTTP 401). Carries the
    /// provider's error message when one could be extracted from the body.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Any other non-2xx response.
    #[error("request failed ({status}): {message}")]
    Status { status: u16, message: String },
    /// Transport-level failure (connect, timeout, body decode).
    #[error("http error: {0}")]
    Http(String),
}

impl Error {
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl std::fmt::Display for ListId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskList {
    pub id: ListId,
    pub title: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    #[default]
    NeedsAction,
    Completed,
}

impl TaskStatus {
    pub fn toggled(self) -> Self {
        match self {
            TaskStatus::NeedsAction => TaskStatus::Completed,
            TaskStatus::Completed => TaskStatus::NeedsAction,
        }
    }
}

/// A task as the remote API returns it. Quadrant and delegate metadata
/// live encoded inside `title` (see [`crate::title`]).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTask {
    pub id: TaskId,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: TaskStatus,
}

/// Request body for task create/patch. Absent fields are omitted from the
/// JSON entirely, which is what the remote PATCH semantics expect.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TaskPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

/// Where the gateway obtains the bearer token for each request. Implemented
/// by the session manager so freshly refreshed tokens are picked up without
/// rebuilding the client.
pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

#[async_trait::async_trait]
pub trait TasksBackend: Send + Sync {
    async fn list_task_lists(&self) -> Result<Vec<TaskList>>;
    async fn create_task_list(&self, title: &str) -> Result<TaskList>;
    async fn rename_task_list(&self, list: &ListId, title: &str) -> Result<TaskList>;
    async fn delete_task_list(&self, list: &ListId) -> Result<()>;
    async fn list_tasks(&self, list: &ListId) -> Result<Vec<RemoteTask>>;
    async fn create_task(&self, list: &ListId, payload: &TaskPayload) -> Result<RemoteTask>;
    async fn patch_task(
        &self,
        list: &ListId,
        task: &TaskId,
        payload: &TaskPayload,
    ) -> Result<RemoteTask>;
    async fn delete_task(&self, list: &ListId, task: &TaskId) -> Result<()>;
    /// Cross-list move, synthesized as create-in-target followed by
    /// delete-in-source. The created task carries a fresh id. If the delete
    /// step fails the task exists in both lists and the error is returned
    /// as-is; callers must not assume the source copy is gone.
    async fn move_task(&self, from: &ListId, to: &ListId, task: &RemoteTask) -> Result<RemoteTask>;
}
