//! All store mutations funnel through [`reduce`]: an explicit value-in,
//! value-out transition function with no hidden mutation, so every state the
//! store can reach is one of these transitions applied to a previous state.

use std::collections::HashMap;

use quadrant_api::ListId;
use quadrant_api::TaskId;
use quadrant_api::TaskList;
use quadrant_api::title::Quadrant;

use crate::task::Task;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoreState {
    pub task_lists: Vec<TaskList>,
    /// First list fetched; fallback target for tasks without a category.
    pub primary_list: Option<TaskList>,
    pub tasks: Vec<Task>,
    pub is_loading: bool,
    pub error: Option<String>,
    /// Per-quadrant completed-task visibility. Absent means hidden.
    pub show_completed: HashMap<Quadrant, bool>,
}

#[derive(Clone, Debug)]
pub enum StateChange {
    SetLoading(bool),
    SetError(Option<String>),
    ReplaceTaskLists(Vec<TaskList>),
    SetPrimaryList(Option<TaskList>),
    ReplaceTasks(Vec<Task>),
    AddTask(Task),
    /// Replace the record with the same id; unknown ids are ignored.
    ReplaceTask(Task),
    RemoveTask(TaskId),
    AppendTaskList(TaskList),
    ReplaceTaskList(TaskList),
    RemoveTaskList(ListId),
    SetShowCompleted(Quadrant, bool),
}

pub fn reduce(state: StoreState, change: StateChange) -> StoreState {
    let mut next = state;
    match change {
        StateChange::SetLoading(loading) => next.is_loading = loading,
        StateChange::SetError(error) => next.error = error,
        StateChange::ReplaceTaskLists(lists) => next.task_lists = lists,
        StateChange::SetPrimaryList(list) => next.primary_list = list,
        StateChange::ReplaceTasks(tasks) => next.tasks = tasks,
        StateChange::AddTask(task) => next.tasks.push(task),
        StateChange::ReplaceTask(task) => {
            if let Some(slot) = next.tasks.iter_mut().find(|t| t.id == task.id) {
                *slot = task;
            }
        }
        StateChange::RemoveTask(id) => next.tasks.retain(|t| t.id != id),
        StateChange::AppendTaskList(list) => {
            if next.primary_list.is_none() {
                next.primary_list = Some(list.clone());
            }
            next.task_lists.push(list);
        }
        StateChange::ReplaceTaskList(list) => {
            if let Some(slot) = next.task_lists.iter_mut().find(|l| l.id == list.id) {
                *slot = list.clone();
            }
            if next.primary_list.as_ref().is_some_and(|p| p.id == list.id) {
                next.primary_list = Some(list);
            }
        }
        StateChange::RemoveTaskList(id) => {
            next.task_lists.retain(|l| l.id != id);
            if next.primary_list.as_ref().is_some_and(|p| p.id == id) {
                next.primary_list = next.task_lists.first().cloned();
            }
        }
        StateChange::SetShowCompleted(quadrant, show) => {
            next.show_completed.insert(quadrant, show);
        }
    }
    next
}
