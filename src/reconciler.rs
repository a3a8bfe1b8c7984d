//! The in-memory task list and the rules that keep it in step with the store.
//!
//! The store is the source of truth. The list is a read-through cache that is
//! fully replaced from store snapshots, supplied either by a live subscription
//! (`load_all`) or by a one-shot filtered query (`load_filtered`). Adds and
//! edits go to the store only and show up through the next snapshot; deletes
//! also drop the task from the list immediately.

use std::time::Duration;

use crate::error::{Result, TodoError, WriteOp};
use crate::model::Task;
use crate::reminder::ReminderHandle;
use crate::session::Session;
use crate::store::{Filter, RemoteStore, Snapshot, StoreEvent, Subscription};
use crate::validate::validate_title;

/// Where the current list contents came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    /// Nothing loaded yet, or closed.
    Idle,
    /// Continuously updated by a subscription.
    Live,
    /// Frozen result of a one-shot `completed == value` query.
    Snapshot { completed: bool },
}

enum Supply {
    Idle,
    Live(Subscription),
    Snapshot { completed: bool },
}

pub struct TaskList<S: RemoteStore> {
    store: S,
    session: Session,
    reminders: Option<ReminderHandle>,
    tasks: Vec<Task>,
    supply: Supply,
}

fn tasks_from(snapshot: Snapshot) -> Vec<Task> {
    snapshot
        .children
        .into_iter()
        .filter_map(|child| {
            let task = Task::from_child(&child.key, &child.value);
            if task.is_none() {
                log::warn!("skipping undecodable task '{}'", child.key);
            }
            task
        })
        .collect()
}

impl<S: RemoteStore> TaskList<S> {
    pub fn new(store: S, session: Session) -> Self {
        Self {
            store,
            session,
            reminders: None,
            tasks: Vec::new(),
            supply: Supply::Idle,
        }
    }

    pub fn with_reminders(mut self, reminders: ReminderHandle) -> Self {
        self.reminders = Some(reminders);
        self
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn mode(&self) -> ViewMode {
        match self.supply {
            Supply::Idle => ViewMode::Idle,
            Supply::Live(_) => ViewMode::Live,
            Supply::Snapshot { completed } => ViewMode::Snapshot { completed },
        }
    }

    fn user(&self) -> &str {
        &self.session.user_id
    }

    /// Subscribe to the whole collection and apply the initial snapshot.
    /// Any previous subscription is released once the new one is open; if
    /// subscribing fails the previous list and supply are left as they were.
    pub fn load_all(&mut self) -> Result<()> {
        let sub = self
            .store
            .subscribe(self.user())
            .map_err(TodoError::read)?;
        log::debug!("live view opened for {}", self.user());
        // Replacing the supply drops the previous subscription.
        self.supply = Supply::Live(sub);
        self.pump()?;
        Ok(())
    }

    /// Replace the list once with tasks whose `completed` flag equals
    /// `completed`. The list is not kept up to date afterwards. On failure the
    /// previous list and supply are left as they were.
    pub fn load_filtered(&mut self, completed: bool) -> Result<()> {
        let snapshot = self
            .store
            .query_once(self.user(), &Filter::completed(completed))
            .map_err(TodoError::read)?;
        self.supply = Supply::Snapshot { completed };
        self.tasks = tasks_from(snapshot);
        log::debug!(
            "snapshot view (completed={completed}) with {} tasks",
            self.tasks.len()
        );
        Ok(())
    }

    /// Apply every subscription event that has already arrived.
    /// Returns the number of snapshots applied. An error event is reported
    /// after the snapshots before it are applied; the list keeps the last
    /// good snapshot.
    pub fn pump(&mut self) -> Result<usize> {
        let events = match &self.supply {
            Supply::Live(sub) => sub.drain(),
            _ => return Ok(0),
        };
        self.apply(events)
    }

    /// Block up to `timeout` for the next subscription event, then apply it
    /// and anything queued behind it. Returns whether a snapshot was applied.
    pub fn wait(&mut self, timeout: Duration) -> Result<bool> {
        let mut events = match &self.supply {
            Supply::Live(sub) => match sub.wait(timeout) {
                Some(ev) => vec![ev],
                None => return Ok(false),
            },
            _ => return Ok(false),
        };
        if let Supply::Live(sub) = &self.supply {
            events.extend(sub.drain());
        }
        Ok(self.apply(events)? > 0)
    }

    fn apply(&mut self, events: Vec<StoreEvent>) -> Result<usize> {
        let mut applied = 0;
        let mut failure = None;
        for event in events {
            match event {
                StoreEvent::Snapshot(snapshot) => {
                    self.tasks = tasks_from(snapshot);
                    applied += 1;
                }
                StoreEvent::Error(msg) => {
                    log::warn!("subscription error: {msg}");
                    failure = Some(msg);
                }
            }
        }
        match failure {
            Some(msg) => Err(TodoError::Read(msg)),
            None => Ok(applied),
        }
    }

    /// Release the live subscription, if any. The list keeps its contents.
    pub fn close(&mut self) {
        self.supply = Supply::Idle;
    }

    /// Create a task. It reaches the list through the next live snapshot,
    /// not directly.
    pub fn add_task(
        &mut self,
        title: &str,
        description: &str,
        reminder_at: Option<i64>,
    ) -> Result<Task> {
        validate_title(title)?;
        let id = self
            .store
            .push(self.user())
            .ok_or(TodoError::KeyGeneration)?;
        let mut task = Task::new(id, title, description);
        task.reminder_at = reminder_at;
        self.store
            .set_value(self.user(), &task.id, &task.to_value())
            .map_err(|e| TodoError::write(WriteOp::Add, e))?;
        log::debug!("added task {}", task.id);
        if let Some(at) = reminder_at {
            self.set_task_reminder(&task, at);
        }
        Ok(task)
    }

    /// Overwrite `task` with a new title and description. Last writer wins.
    pub fn update_task(&mut self, task: &mut Task, title: &str, description: &str) -> Result<()> {
        validate_title(title)?;
        task.title = title.to_string();
        task.description = description.to_string();
        self.store
            .set_value(self.user(), &task.id, &task.to_value())
            .map_err(|e| TodoError::write(WriteOp::Update, e))?;
        log::debug!("updated task {}", task.id);
        Ok(())
    }

    /// Set the completed flag. When the flag already has that value nothing is
    /// written, so re-applying displayed state cannot echo back as writes.
    /// Returns whether a write happened. A failed write leaves `task` as it was.
    pub fn toggle_completed(&mut self, task: &mut Task, checked: bool) -> Result<bool> {
        if task.completed == checked {
            return Ok(false);
        }
        task.completed = checked;
        if let Err(e) = self.store.set_value(self.user(), &task.id, &task.to_value()) {
            // Keep the caller's copy matching the store so a retry writes again.
            task.completed = !checked;
            return Err(TodoError::write(WriteOp::Toggle, e));
        }
        log::debug!("task {} completed={checked}", task.id);
        Ok(true)
    }

    /// Drop the task from the list right away, then from the store. A failed
    /// store delete does not put it back.
    pub fn delete_task(&mut self, task: &Task) -> Result<()> {
        self.tasks.retain(|t| t.id != task.id);
        self.store
            .remove_value(self.user(), &task.id)
            .map_err(|e| TodoError::write(WriteOp::Delete, e))?;
        log::debug!("deleted task {}", task.id);
        Ok(())
    }

    /// Arm a reminder for `task` at `at` (epoch ms). Fire and forget.
    pub fn set_task_reminder(&self, task: &Task, at: i64) {
        match &self.reminders {
            Some(reminders) => reminders.arm_task(task, at),
            None => log::debug!("no reminder scheduler; reminder for {} ignored", task.id),
        }
    }
}
