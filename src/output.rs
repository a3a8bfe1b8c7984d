use serde::Serialize;

use crate::model::Task;
use crate::reconciler::ViewMode;

#[derive(Serialize)]
pub struct TaskListing<'a> {
    pub view: &'static str,
    pub tasks: &'a [Task],
}

pub fn view_name(mode: ViewMode) -> &'static str {
    match mode {
        ViewMode::Idle | ViewMode::Live => "all",
        ViewMode::Snapshot { completed: true } => "completed",
        ViewMode::Snapshot { completed: false } => "pending",
    }
}

pub fn format_task_detail(task: &Task) -> String {
    let mut out = String::new();
    out.push_str(&format!("Id:          {}\n", task.id));
    out.push_str(&format!("Title:       {}\n", task.title));
    out.push_str(&format!(
        "Status:      {}\n",
        if task.completed { "completed" } else { "pending" }
    ));
    if !task.description.is_empty() {
        out.push_str(&format!("Description: {}\n", task.description));
    }
    out
}

pub fn format_task_list(tasks: &[Task]) -> String {
    let mut out = String::new();
    for task in tasks {
        let desc = if task.description.is_empty() {
            String::new()
        } else {
            format!("  {}", task.description)
        };
        out.push_str(&format!("{} {}  {}{}\n", task.icon(), task.id, task.title, desc));
    }
    out
}
