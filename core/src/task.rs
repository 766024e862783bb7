use chrono::DateTime;
use chrono::Utc;
use quadrant_api::ListId;
use quadrant_api::RemoteTask;
use quadrant_api::TaskId;
use quadrant_api::TaskList;
use quadrant_api::TaskStatus;
use quadrant_api::notes;
use quadrant_api::title;
use quadrant_api::title::Quadrant;

/// A remote task enriched for local use: list metadata attached, the title
/// prefix decoded into `quadrant`/`delegated_to`/`clean_title`, and the
/// notes split into the raw field and its display form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub list_id: ListId,
    pub list_title: String,
    pub raw_title: String,
    pub clean_title: String,
    pub notes: String,
    pub display_notes: String,
    pub due: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub quadrant: Quadrant,
    pub delegated_to: Option<String>,
}

impl Task {
    /// Decode `remote` into the enriched record. The title prefix wins; the
    /// legacy notes block is consulted only when the title carries no
    /// recognized prefix.
    pub fn from_remote(remote: RemoteTask, list: &TaskList) -> Self {
        let notes_raw = remote.notes.unwrap_or_default();
        let tag = title::decode_title(&remote.title);
        let (quadrant, delegated_to) = if title::has_tag(&remote.title) {
            (tag.quadrant, tag.delegated_to)
        } else {
            match notes::parse_legacy_metadata(&notes_raw) {
                Some(meta) => (meta.quadrant.unwrap_or_default(), meta.delegated_to),
                None => (Quadrant::Do, None),
            }
        };
        Self {
            id: remote.id,
            list_id: list.id.clone(),
            list_title: list.title.clone(),
            raw_title: remote.title,
            clean_title: tag.clean_title,
            display_notes: notes::display_notes(&notes_raw),
            notes: notes_raw,
            due: remote.due,
            status: remote.status,
            quadrant,
            delegated_to,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// The wire shape of this record, used when handing the task back to the
    /// gateway (cross-list move recreates it from these fields).
    pub fn to_remote(&self) -> RemoteTask {
        RemoteTask {
            id: self.id.clone(),
            title: self.raw_title.clone(),
            notes: if self.notes.is_empty() {
                None
            } else {
                Some(self.notes.clone())
            },
            due: self.due,
            status: self.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn list() -> TaskList {
        TaskList {
            id: ListId("list-1".to_string()),
            title: "My Tasks".to_string(),
        }
    }

    fn remote(title: &str, notes: Option<&str>) -> RemoteTask {
        RemoteTask {
            id: TaskId("task-1".to_string()),
            title: title.to_string(),
            notes: notes.map(|s| s.to_string()),
            due: None,
            status: TaskStatus::NeedsAction,
        }
    }

    #[test]
    fn title_prefix_drives_classification() {
        let task = Task::from_remote(remote("[DELEGATE:sam@x.com] Draft report", None), &list());
        assert_eq!(task.quadrant, Quadrant::Delegate);
        assert_eq!(task.delegated_to.as_deref(), Some("sam@x.com"));
        assert_eq!(task.clean_title, "Draft report");
        assert_eq!(task.list_title, "My Tasks");
    }

    #[test]
    fn legacy_notes_block_classifies_unprefixed_titles() {
        let notes = "Ask about the invoice\n---EISENHOWER_META---\n{\"quadrant\":\"delay\"}";
        let task = Task::from_remote(remote("Call the dentist", Some(notes)), &list());
        assert_eq!(task.quadrant, Quadrant::Delay);
        assert_eq!(task.clean_title, "Call the dentist");
        assert_eq!(task.display_notes, "Ask about the invoice");
    }

    #[test]
    fn title_prefix_wins_over_legacy_notes() {
        let notes = "body\n---EISENHOWER_META---\n{\"quadrant\":\"delay\"}";
        let task = Task::from_remote(remote("[DO] Pay bill", Some(notes)), &list());
        assert_eq!(task.quadrant, Quadrant::Do);
        assert_eq!(task.display_notes, "body");
    }

    #[test]
    fn plain_task_defaults_to_do() {
        let task = Task::from_remote(remote("Water plants", None), &list());
        assert_eq!(task.quadrant, Quadrant::Do);
        assert_eq!(task.delegated_to, None);
        assert_eq!(task.clean_title, "Water plants");
        assert_eq!(task.display_notes, "");
    }

    #[test]
    fn to_remote_round_trips_the_wire_fields() {
        let original = remote("[DELAY] Clean garage", Some("later"));
        let task = Task::from_remote(original.clone(), &list());
        assert_eq!(task.to_remote(), original);
    }
}
