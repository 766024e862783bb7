use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use quadrant_api::ListId;
use quadrant_api::TaskId;
use quadrant_api::TaskList;
use quadrant_api::TaskPayload;
use quadrant_api::TaskStatus;
use quadrant_api::TasksBackend;
use quadrant_api::notes;
use quadrant_api::title;
use quadrant_api::title::Quadrant;
use quadrant_login::SessionManager;
use tokio::time::Instant;

use crate::state::StateChange;
use crate::state::StoreState;
use crate::state::reduce;
use crate::task::Task;

/// A second authentication failure within this window of the last
/// refresh trigger is suppressed, so a burst of 401s cannot start a
/// refresh storm.
const AUTH_REFRESH_SUPPRESSION: Duration = Duration::from_secs(5);

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No task list exists yet to create the task in.
    #[error("no task list available")]
    NoListAvailable,
    #[error("task {0} not found")]
    TaskNotFound(TaskId),
    #[error("list {0} not found")]
    ListNotFound(ListId),
    #[error(transparent)]
    Backend(#[from] quadrant_api::Error),
}

/// How the store asks for 401 recovery. Implemented by
/// [`quadrant_login::SessionManager`]; tests substitute a counting fake.
#[async_trait::async_trait]
pub trait RefreshSession: Send + Sync {
    async fn refresh_session(&self);
}

#[async_trait::async_trait]
impl RefreshSession for SessionManager {
    async fn refresh_session(&self) {
        // Refresh errors are retained by the session manager itself.
        let _ = self.refresh().await;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    Loaded,
    /// An authentication failure aborted the fetch. A session refresh was
    /// triggered (or suppressed inside the storm window) and the caller
    /// should retry the fetch once.
    AuthRequired,
}

/// Input for [`TaskStore::create`].
#[derive(Clone, Debug, Default)]
pub struct NewTask {
    pub title: String,
    pub quadrant: Quadrant,
    pub delegated_to: Option<String>,
    pub notes: Option<String>,
    pub due: Option<DateTime<Utc>>,
    pub status: Option<TaskStatus>,
    /// Target list; the primary list when absent or unknown.
    pub category: Option<ListId>,
}

/// Partial update for [`TaskStore::update`]. Outer `None` leaves the field
/// alone; for the clearable fields the inner option distinguishes "set"
/// from "clear".
#[derive(Clone, Debug, Default)]
pub struct TaskPatch {
    pub quadrant: Option<Quadrant>,
    pub delegated_to: Option<Option<String>>,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub due: Option<Option<DateTime<Utc>>>,
    pub status: Option<TaskStatus>,
}

#[derive(Clone, Debug)]
pub enum DeleteTarget {
    Id(TaskId),
    /// An owned record, which need not still be present in store state.
    Record(Task),
}

impl From<TaskId> for DeleteTarget {
    fn from(id: TaskId) -> Self {
        DeleteTarget::Id(id)
    }
}

impl From<Task> for DeleteTarget {
    fn from(task: Task) -> Self {
        DeleteTarget::Record(task)
    }
}

/// In-memory store over the remote task API. Mutations are optimistic:
/// local state changes before the network call, and a failed call rolls the
/// change back to its pre-mutation snapshot, so local state never diverges
/// permanently from a failed write. The state mutex is held only across
/// synchronous reduce steps, never across an await.
pub struct TaskStore {
    backend: Arc<dyn TasksBackend>,
    session: Arc<dyn RefreshSession>,
    state: Mutex<StoreState>,
    last_auth_refresh: Mutex<Option<Instant>>,
}

impl TaskStore {
    pub fn new(backend: Arc<dyn TasksBackend>, session: Arc<dyn RefreshSession>) -> Self {
        Self {
            backend,
            session,
            state: Mutex::new(StoreState::default()),
            last_auth_refresh: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn dispatch(&self, change: StateChange) {
        let mut st = self.state();
        *st = reduce(std::mem::take(&mut *st), change);
    }

    /// Record `err` as the store-level error and hand it back.
    fn fail(&self, err: StoreError) -> StoreError {
        self.dispatch(StateChange::SetError(Some(err.to_string())));
        err
    }

    fn find_task(&self, id: &TaskId) -> Result<Task> {
        self.state()
            .tasks
            .iter()
            .find(|t| t.id == *id)
            .cloned()
            .ok_or_else(|| StoreError::TaskNotFound(id.clone()))
    }

    /// Load all task lists, then the tasks of every list concurrently. The
    /// task collection is replaced atomically once after all per-list
    /// fetches join. A list failing with a non-auth error contributes zero
    /// tasks; an auth failure aborts the fetch and triggers one session
    /// refresh, after which the caller retries.
    pub async fn fetch_all(&self) -> Result<FetchOutcome> {
        self.dispatch(StateChange::SetLoading(true));
        self.dispatch(StateChange::SetError(None));
        let result = self.fetch_all_inner().await;
        self.dispatch(StateChange::SetLoading(false));
        match result {
            Ok(()) => Ok(FetchOutcome::Loaded),
            Err(StoreError::Backend(err)) if err.is_auth() => {
                tracing::info!("fetch hit an authentication failure: {err}");
                self.trigger_refresh().await;
                Ok(FetchOutcome::AuthRequired)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    async fn fetch_all_inner(&self) -> Result<()> {
        let lists = self.backend.list_task_lists().await?;
        self.dispatch(StateChange::SetPrimaryList(lists.first().cloned()));
        self.dispatch(StateChange::ReplaceTaskLists(lists.clone()));

        let fetches = lists
            .iter()
            .map(|list| async move { (list, self.backend.list_tasks(&list.id).await) });
        let mut tasks = Vec::new();
        for (list, fetched) in futures::future::join_all(fetches).await {
            match fetched {
                Ok(remotes) => {
                    tasks.extend(remotes.into_iter().map(|r| Task::from_remote(r, list)));
                }
                Err(err) if err.is_auth() => return Err(err.into()),
                Err(err) => {
                    tracing::warn!("skipping list `{}`: {err}", list.title);
                }
            }
        }
        self.dispatch(StateChange::ReplaceTasks(tasks));
        Ok(())
    }

    async fn trigger_refresh(&self) {
        let now = Instant::now();
        {
            let mut last = match self.last_auth_refresh.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(prev) = *last
                && now.duration_since(prev) < AUTH_REFRESH_SUPPRESSION
            {
                tracing::debug!("suppressing repeated auth-triggered refresh");
                return;
            }
            *last = Some(now);
        }
        self.session.refresh_session().await;
    }

    /// Create a task in the explicit category when it exists locally, else
    /// in the primary list. The server-returned record, enriched with list
    /// metadata and decoded fields, is appended to state and returned.
    pub async fn create(&self, data: NewTask) -> Result<Task> {
        self.dispatch(StateChange::SetError(None));
        let list = {
            let st = self.state();
            data.category
                .as_ref()
                .and_then(|id| st.task_lists.iter().find(|l| l.id == *id).cloned())
                .or_else(|| st.primary_list.clone())
        };
        let Some(list) = list else {
            return Err(self.fail(StoreError::NoListAvailable));
        };
        let payload = TaskPayload {
            title: Some(title::encode_title(
                data.title.trim(),
                data.quadrant,
                data.delegated_to.as_deref(),
            )),
            notes: data.notes,
            due: data.due,
            status: Some(data.status.unwrap_or_default()),
        };
        let remote = self
            .backend
            .create_task(&list.id, &payload)
            .await
            .map_err(|e| self.fail(e.into()))?;
        let task = Task::from_remote(remote, &list);
        self.dispatch(StateChange::AddTask(task.clone()));
        Ok(task)
    }

    /// Merge `patch` over the current record, re-encode the title, apply
    /// locally, then issue the remote patch. On remote failure the
    /// pre-mutation snapshot is restored; on success the optimistic record
    /// stands (the server echo is not re-applied).
    pub async fn update(&self, id: &TaskId, patch: TaskPatch) -> Result<Task> {
        self.dispatch(StateChange::SetError(None));
        let snapshot = match self.find_task(id) {
            Ok(task) => task,
            Err(err) => return Err(self.fail(err)),
        };
        let updated = apply_patch(&snapshot, patch);
        self.dispatch(StateChange::ReplaceTask(updated.clone()));

        let payload = TaskPayload {
            title: Some(updated.raw_title.clone()),
            notes: Some(updated.notes.clone()),
            due: updated.due,
            status: Some(updated.status),
        };
        if let Err(err) = self.backend.patch_task(&updated.list_id, id, &payload).await {
            self.dispatch(StateChange::ReplaceTask(snapshot));
            return Err(self.fail(err.into()));
        }
        Ok(updated)
    }

    /// Reclassify into `quadrant`, merging any extra field changes the
    /// transition needs (a new due date, a delegate).
    pub async fn move_to_quadrant(
        &self,
        id: &TaskId,
        quadrant: Quadrant,
        extra: TaskPatch,
    ) -> Result<Task> {
        let patch = TaskPatch {
            quadrant: Some(quadrant),
            ..extra
        };
        self.update(id, patch).await
    }

    pub async fn toggle_complete(&self, id: &TaskId) -> Result<Task> {
        let status = self.find_task(id).map_err(|e| self.fail(e))?.status;
        let patch = TaskPatch {
            status: Some(status.toggled()),
            ..TaskPatch::default()
        };
        self.update(id, patch).await
    }

    /// Move the task to another list. Not optimistic: the remote move
    /// (create-in-target, delete-in-source) runs first, and only then is
    /// the old record swapped for the newly created one, which carries a
    /// fresh id.
    pub async fn change_category(&self, id: &TaskId, new_list: &ListId) -> Result<Task> {
        self.dispatch(StateChange::SetError(None));
        let task = match self.find_task(id) {
            Ok(task) => task,
            Err(err) => return Err(self.fail(err)),
        };
        if task.list_id == *new_list {
            return Ok(task);
        }
        let target = self
            .state()
            .task_lists
            .iter()
            .find(|l| l.id == *new_list)
            .cloned()
            .ok_or_else(|| StoreError::ListNotFound(new_list.clone()))
            .map_err(|e| self.fail(e))?;
        let created = self
            .backend
            .move_task(&task.list_id, new_list, &task.to_remote())
            .await
            .map_err(|e| self.fail(e.into()))?;
        let moved = Task::from_remote(created, &target);
        self.dispatch(StateChange::RemoveTask(task.id));
        self.dispatch(StateChange::AddTask(moved.clone()));
        Ok(moved)
    }

    /// Remove the task locally first; a failed remote delete re-inserts the
    /// removed record.
    pub async fn delete(&self, target: impl Into<DeleteTarget>) -> Result<()> {
        self.dispatch(StateChange::SetError(None));
        let record = match target.into() {
            DeleteTarget::Id(id) => match self.find_task(&id) {
                Ok(task) => task,
                Err(err) => return Err(self.fail(err)),
            },
            DeleteTarget::Record(task) => task,
        };
        self.dispatch(StateChange::RemoveTask(record.id.clone()));
        if let Err(err) = self
            .backend
            .delete_task(&record.list_id, &record.id)
            .await
        {
            self.dispatch(StateChange::AddTask(record));
            return Err(self.fail(err.into()));
        }
        Ok(())
    }

    pub async fn create_category(&self, name: &str) -> Result<TaskList> {
        self.dispatch(StateChange::SetError(None));
        let list = self
            .backend
            .create_task_list(name)
            .await
            .map_err(|e| self.fail(e.into()))?;
        self.dispatch(StateChange::AppendTaskList(list.clone()));
        Ok(list)
    }

    pub async fn rename_category(&self, id: &ListId, name: &str) -> Result<TaskList> {
        self.dispatch(StateChange::SetError(None));
        let list = self
            .backend
            .rename_task_list(id, name)
            .await
            .map_err(|e| self.fail(e.into()))?;
        self.dispatch(StateChange::ReplaceTaskList(list.clone()));
        Ok(list)
    }

    /// Tasks of the deleted list stay in local state until the next fetch
    /// replaces the collection.
    pub async fn delete_category(&self, id: &ListId) -> Result<()> {
        self.dispatch(StateChange::SetError(None));
        self.backend
            .delete_task_list(id)
            .await
            .map_err(|e| self.fail(e.into()))?;
        self.dispatch(StateChange::RemoveTaskList(id.clone()));
        Ok(())
    }

    /// Tasks of `quadrant` in insertion order, with completed tasks
    /// filtered out unless the per-quadrant toggle shows them.
    pub fn tasks_by_quadrant(&self, quadrant: Quadrant) -> Vec<Task> {
        let st = self.state();
        let show_completed = st.show_completed.get(&quadrant).copied().unwrap_or(false);
        st.tasks
            .iter()
            .filter(|t| t.quadrant == quadrant && (show_completed || !t.is_completed()))
            .cloned()
            .collect()
    }

    pub fn set_show_completed(&self, quadrant: Quadrant, show: bool) {
        self.dispatch(StateChange::SetShowCompleted(quadrant, show));
    }

    pub fn show_completed(&self, quadrant: Quadrant) -> bool {
        self.state()
            .show_completed
            .get(&quadrant)
            .copied()
            .unwrap_or(false)
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state().tasks.clone()
    }

    pub fn task_lists(&self) -> Vec<TaskList> {
        self.state().task_lists.clone()
    }

    pub fn primary_list(&self) -> Option<TaskList> {
        self.state().primary_list.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state().is_loading
    }
}

/// Merge `patch` over `task` and re-derive every title-encoded field, so
/// the record keeps the invariant that quadrant and delegate always match
/// what decoding `raw_title` yields.
fn apply_patch(task: &Task, patch: TaskPatch) -> Task {
    let quadrant = patch.quadrant.unwrap_or(task.quadrant);
    let delegated_to = match patch.delegated_to {
        Some(delegate) => delegate,
        None => task.delegated_to.clone(),
    };
    let clean_title = patch.title.unwrap_or_else(|| task.clean_title.clone());
    let notes = patch.notes.unwrap_or_else(|| task.notes.clone());
    let due = match patch.due {
        Some(due) => due,
        None => task.due,
    };
    let status = patch.status.unwrap_or(task.status);

    let raw_title = title::encode_title(clean_title.trim(), quadrant, delegated_to.as_deref());
    let decoded = title::decode_title(&raw_title);
    Task {
        id: task.id.clone(),
        list_id: task.list_id.clone(),
        list_title: task.list_title.clone(),
        raw_title,
        clean_title: decoded.clean_title,
        display_notes: notes::display_notes(&notes),
        notes,
        due,
        status,
        quadrant: decoded.quadrant,
        delegated_to: decoded.delegated_to,
    }
}
