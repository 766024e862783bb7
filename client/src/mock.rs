use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use quadrant_api::Error;
use quadrant_api::ListId;
use quadrant_api::RemoteTask;
use quadrant_api::Result;
use quadrant_api::TaskId;
use quadrant_api::TaskList;
use quadrant_api::TaskPayload;
use quadrant_api::TaskStatus;
use quadrant_api::TasksBackend;

#[derive(Default)]
struct MockState {
    lists: Vec<TaskList>,
    tasks: HashMap<String, Vec<RemoteTask>>,
    next_id: u64,
}

/// In-memory stand-in for the remote API, used for offline runs and demos.
/// Mutations behave like the real thing (fresh ids on create, 404 on unknown
/// ids) so the store logic above it cannot tell the difference.
#[derive(Clone, Default)]
pub struct MockClient {
    state: Arc<Mutex<MockState>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client pre-populated with a small believable data set.
    pub fn seeded() -> Self {
        let client = Self::default();
        {
            let mut st = client.state();
            st.lists = vec![
                TaskList {
                    id: ListId("list-0001".to_string()),
                    title: "My Tasks".to_string(),
                },
                TaskList {
                    id: ListId("list-0002".to_string()),
                    title: "Work".to_string(),
                },
            ];
            st.tasks.insert(
                "list-0001".to_string(),
                vec![
                    seed_task("task-1000", "[DO] Pay electricity bill", None, TaskStatus::NeedsAction),
                    seed_task(
                        "task-1001",
                        "[DELAY] Clean the garage",
                        None,
                        TaskStatus::Completed,
                    ),
                    seed_task(
                        "task-1002",
                        "Call the dentist",
                        Some("Ask about the invoice\n---EISENHOWER_META---\n{\"quadrant\":\"delay\"}"),
                        TaskStatus::NeedsAction,
                    ),
                ],
            );
            st.tasks.insert(
                "list-0002".to_string(),
                vec![
                    seed_task(
                        "task-2000",
                        "[DELEGATE:sam@example.com] Draft quarterly report",
                        None,
                        TaskStatus::NeedsAction,
                    ),
                    seed_task(
                        "task-2001",
                        "[DELETE] Old newsletter signup",
                        None,
                        TaskStatus::NeedsAction,
                    ),
                ],
            );
            st.next_id = 3000;
        }
        client
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn seed_task(id: &str, title: &str, notes: Option<&str>, status: TaskStatus) -> RemoteTask {
    RemoteTask {
        id: TaskId(id.to_string()),
        title: title.to_string(),
        notes: notes.map(|s| s.to_string()),
        due: None,
        status,
    }
}

fn not_found(what: &str, id: &str) -> Error {
    Error::Status {
        status: 404,
        message: format!("{what} {id} not found"),
    }
}

#[async_trait::async_trait]
impl TasksBackend for MockClient {
    async fn list_task_lists(&self) -> Result<Vec<TaskList>> {
        Ok(self.state().lists.clone())
    }

    async fn create_task_list(&self, title: &str) -> Result<TaskList> {
        let mut st = self.state();
        st.next_id += 1;
        let list = TaskList {
            id: ListId(format!("list-{:04}", st.next_id)),
            title: title.to_string(),
        };
        st.lists.push(list.clone());
        st.tasks.insert(list.id.0.clone(), Vec::new());
        Ok(list)
    }

    async fn rename_task_list(&self, list: &ListId, title: &str) -> Result<TaskList> {
        let mut st = self.state();
        let entry = st
            .lists
            .iter_mut()
            .find(|l| l.id == *list)
            .ok_or_else(|| not_found("list", &list.0))?;
        entry.title = title.to_string();
        Ok(entry.clone())
    }

    async fn delete_task_list(&self, list: &ListId) -> Result<()> {
        let mut st = self.state();
        let before = st.lists.len();
        st.lists.retain(|l| l.id != *list);
        if st.lists.len() == before {
            return Err(not_found("list", &list.0));
        }
        st.tasks.remove(&list.0);
        Ok(())
    }

    async fn list_tasks(&self, list: &ListId) -> Result<Vec<RemoteTask>> {
        let st = self.state();
        match st.tasks.get(&list.0) {
            Some(tasks) => Ok(tasks.clone()),
            None => Err(not_found("list", &list.0)),
        }
    }

    async fn create_task(&self, list: &ListId, payload: &TaskPayload) -> Result<RemoteTask> {
        let mut st = self.state();
        if !st.tasks.contains_key(&list.0) && !st.lists.iter().any(|l| l.id == *list) {
            return Err(not_found("list", &list.0));
        }
        st.next_id += 1;
        let task = RemoteTask {
            id: TaskId(format!("task-{:04}", st.next_id)),
            title: payload.title.clone().unwrap_or_default(),
            notes: payload.notes.clone(),
            due: payload.due,
            status: payload.status.unwrap_or_default(),
        };
        st.tasks
            .entry(list.0.clone())
            .or_default()
            .push(task.clone());
        Ok(task)
    }

    async fn patch_task(
        &self,
        list: &ListId,
        task: &TaskId,
        payload: &TaskPayload,
    ) -> Result<RemoteTask> {
        let mut st = self.state();
        let tasks = st
            .tasks
            .get_mut(&list.0)
            .ok_or_else(|| not_found("list", &list.0))?;
        let entry = tasks
            .iter_mut()
            .find(|t| t.id == *task)
            .ok_or_else(|| not_found("task", &task.0))?;
        if let Some(title) = &payload.title {
            entry.title = title.clone();
        }
        if let Some(notes) = &payload.notes {
            entry.notes = Some(notes.clone());
        }
        if let Some(due) = payload.due {
            entry.due = Some(due);
        }
        if let Some(status) = payload.status {
            entry.status = status;
        }
        Ok(entry.clone())
    }

    async fn delete_task(&self, list: &ListId, task: &TaskId) -> Result<()> {
        let mut st = self.state();
        let tasks = st
            .tasks
            .get_mut(&list.0)
            .ok_or_else(|| not_found("list", &list.0))?;
        let before = tasks.len();
        tasks.retain(|t| t.id != *task);
        if tasks.len() == before {
            return Err(not_found("task", &task.0));
        }
        Ok(())
    }

    async fn move_task(&self, from: &ListId, to: &ListId, task: &RemoteTask) -> Result<RemoteTask> {
        let payload = TaskPayload {
            title: Some(task.title.clone()),
            notes: task.notes.clone(),
            due: task.due,
            status: Some(task.status),
        };
        let created = self.create_task(to, &payload).await?;
        self.delete_task(from, &task.id).await?;
        Ok(created)
    }
}
