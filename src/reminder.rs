//! One-shot task reminders.
//!
//! A single worker thread owns the alarm table. Alarms are keyed by
//! [`alarm_key`] of the task id, so arming a task twice replaces the earlier
//! alarm. Each alarm produces exactly one [`Notification`] when it comes due
//! and is then forgotten; nothing is persisted.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;

use crate::model::Task;

/// Where activating a notification should lead.
pub const MAIN_VIEW: &str = "main";

pub const NOTIFICATION_TITLE: &str = "Task reminder";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Same as the alarm key; re-notifying a task replaces its notification.
    pub key: i32,
    pub task_id: String,
    pub title: String,
    pub body: String,
    pub target: &'static str,
}

pub trait Notifier: Send + 'static {
    fn notify(&self, notification: &Notification);
}

impl<F> Notifier for F
where
    F: Fn(&Notification) + Send + 'static,
{
    fn notify(&self, notification: &Notification) {
        self(notification)
    }
}

impl Notifier for Sender<Notification> {
    fn notify(&self, notification: &Notification) {
        if self.send(notification.clone()).is_err() {
            log::warn!("notification receiver gone; dropped reminder for {}", notification.task_id);
        }
    }
}

/// Deterministic 32-bit key for a task id: the classic 31-multiplier string
/// hash over UTF-16 code units, wrapping on overflow.
pub fn alarm_key(task_id: &str) -> i32 {
    task_id
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// Epoch milliseconds `secs` seconds after `now`, or `None` if that is not
/// representable.
pub fn fire_at_after(now: i64, secs: u64) -> Option<i64> {
    i64::try_from(secs).ok()?.checked_mul(1000)?.checked_add(now)
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
struct Alarm {
    task_id: String,
    title: String,
    fire_at: i64,
}

/// Cloneable arming handle. Holding one keeps the worker accepting alarms.
#[derive(Clone)]
pub struct ReminderHandle {
    tx: Sender<Alarm>,
    pending: Arc<Mutex<usize>>,
}

impl ReminderHandle {
    /// Schedule a notification for `task_id` at `fire_at` (epoch ms).
    /// Fire and forget: a stopped worker is logged, not reported.
    pub fn arm(&self, task_id: &str, title: &str, fire_at: i64) {
        let alarm = Alarm {
            task_id: task_id.to_string(),
            title: title.to_string(),
            fire_at,
        };
        if self.tx.send(alarm).is_err() {
            log::warn!("reminder worker stopped; reminder for {task_id} not armed");
        }
    }

    pub fn arm_task(&self, task: &Task, fire_at: i64) {
        self.arm(&task.id, &task.title, fire_at);
    }

    /// Number of alarms armed and not yet fired.
    pub fn pending(&self) -> usize {
        self.pending.lock().map(|p| *p).unwrap_or(0)
    }
}

/// Owns the worker thread. Dropping the scheduler detaches the worker:
/// pending alarms still fire, and the thread exits once every handle is gone
/// and the table is empty.
pub struct ReminderScheduler {
    handle: ReminderHandle,
    worker: JoinHandle<()>,
}

impl ReminderScheduler {
    pub fn start(notifier: impl Notifier) -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let pending = Arc::new(Mutex::new(0));
        let worker_pending = pending.clone();
        let worker = thread::Builder::new()
            .name("todosync-reminders".into())
            .spawn(move || run_worker(rx, notifier, worker_pending))
            .context("failed to spawn reminder thread")?;
        Ok(Self {
            handle: ReminderHandle { tx, pending },
            worker,
        })
    }

    pub fn handle(&self) -> ReminderHandle {
        self.handle.clone()
    }

    pub fn arm(&self, task_id: &str, title: &str, fire_at: i64) {
        self.handle.arm(task_id, title, fire_at);
    }

    pub fn pending(&self) -> usize {
        self.handle.pending()
    }

    /// Stop accepting alarms from this scheduler and wait until every other
    /// handle is dropped and all armed alarms have fired.
    pub fn join(self) {
        let Self { handle, worker } = self;
        drop(handle);
        if worker.join().is_err() {
            log::warn!("reminder worker panicked");
        }
    }
}

fn run_worker(rx: Receiver<Alarm>, notifier: impl Notifier, pending: Arc<Mutex<usize>>) {
    let mut alarms: HashMap<i32, Alarm> = HashMap::new();
    let mut accepting = true;

    let publish = |alarms: &HashMap<i32, Alarm>| {
        if let Ok(mut p) = pending.lock() {
            *p = alarms.len();
        }
    };

    loop {
        let next_due = alarms.values().map(|a| a.fire_at).min();
        let armed = match (accepting, next_due) {
            (false, None) => break,
            (false, Some(due)) => {
                let wait = (due - now_ms()).max(0) as u64;
                thread::sleep(Duration::from_millis(wait));
                None
            }
            (true, None) => match rx.recv() {
                Ok(alarm) => Some(alarm),
                Err(_) => {
                    accepting = false;
                    None
                }
            },
            (true, Some(due)) => {
                let wait = (due - now_ms()).max(0) as u64;
                match rx.recv_timeout(Duration::from_millis(wait)) {
                    Ok(alarm) => Some(alarm),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => {
                        accepting = false;
                        None
                    }
                }
            }
        };

        if let Some(alarm) = armed {
            let key = alarm_key(&alarm.task_id);
            log::debug!("armed reminder {key} for {} at {}", alarm.task_id, alarm.fire_at);
            if alarms.insert(key, alarm).is_some() {
                log::debug!("reminder {key} superseded");
            }
            publish(&alarms);
        }

        let now = now_ms();
        let mut due: Vec<(i32, Alarm)> = Vec::new();
        alarms.retain(|key, alarm| {
            if alarm.fire_at <= now {
                due.push((*key, alarm.clone()));
                false
            } else {
                true
            }
        });
        if due.is_empty() {
            continue;
        }
        publish(&alarms);
        due.sort_by_key(|(_, a)| a.fire_at);
        for (key, alarm) in due {
            log::info!("reminder fired for {}", alarm.task_id);
            notifier.notify(&Notification {
                key,
                task_id: alarm.task_id,
                title: NOTIFICATION_TITLE.to_string(),
                body: alarm.title,
                target: MAIN_VIEW,
            });
        }
    }
    log::debug!("reminder worker stopped");
}
