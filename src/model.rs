use serde::{Deserialize, Serialize};

/// A single to-do item as stored under `tasks/{user}/{id}`.
///
/// `id` is assigned by the store when the task is created and never changes
/// afterwards. When a task is materialized from a snapshot the storage key
/// wins over whatever `id` the stored document carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    /// Epoch milliseconds of the reminder armed when the task was created.
    /// Held in memory only; armed reminders are not recorded in the store.
    #[serde(skip)]
    pub reminder_at: Option<i64>,
}

impl Task {
    pub fn new(id: String, title: &str, description: &str) -> Self {
        Self {
            id,
            title: title.to_string(),
            description: description.to_string(),
            completed: false,
            reminder_at: None,
        }
    }

    /// Returns display icon: x=completed, .=pending
    pub fn icon(&self) -> &'static str {
        if self.completed {
            "x"
        } else {
            "."
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        // Task has only string/bool/integer fields, so this cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Decode a stored document, taking the identifier from its storage key.
    pub fn from_child(key: &str, value: &serde_json::Value) -> Option<Self> {
        let mut task: Task = serde_json::from_value(value.clone()).ok()?;
        task.id = key.to_string();
        Some(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stored_layout_uses_camel_case() {
        let mut task = Task::new("k1".into(), "Buy milk", "2%");
        assert_eq!(
            task.to_value(),
            json!({"id": "k1", "title": "Buy milk", "description": "2%", "completed": false})
        );
        task.reminder_at = Some(1_000);
        assert!(task.to_value().get("reminderAt").is_none());
    }

    #[test]
    fn stored_reminder_field_is_ignored() {
        let value = json!({"title": "t", "reminderAt": 5_000});
        let task = Task::from_child("k", &value).unwrap();
        assert!(task.reminder_at.is_none());
    }

    #[test]
    fn storage_key_overrides_embedded_id() {
        let value = json!({"id": "stale", "title": "t", "description": "", "completed": true});
        let task = Task::from_child("fresh", &value).unwrap();
        assert_eq!(task.id, "fresh");
        assert!(task.completed);
    }

    #[test]
    fn missing_optional_fields_default() {
        let task = Task::from_child("k", &json!({"title": "only title"})).unwrap();
        assert_eq!(task.description, "");
        assert!(!task.completed);
        assert!(task.reminder_at.is_none());
    }

    #[test]
    fn undecodable_child_is_none() {
        assert!(Task::from_child("k", &json!({"description": "no title"})).is_none());
        assert!(Task::from_child("k", &json!("just a string")).is_none());
    }
}
