//! Per-user to-do list kept in step with a realtime document store, with
//! one-shot reminders.
//!
//! [`reconciler::TaskList`] is the core: it mirrors a user's collection from a
//! [`store::RemoteStore`], either live through a subscription or as a frozen
//! filtered snapshot, and routes add/edit/toggle/delete to the store.
//! [`reminder::ReminderScheduler`] raises notifications at wall-clock times
//! independently of any list.

pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod output;
pub mod reconciler;
pub mod reminder;
pub mod session;
pub mod store;
pub mod validate;
pub mod watch;

pub use error::{TodoError, WriteOp};
pub use model::Task;
pub use reconciler::{TaskList, ViewMode};
pub use reminder::{Notification, Notifier, ReminderHandle, ReminderScheduler};
pub use session::{IdentityProvider, LocalIdentity, Session};
pub use store::sqlite::SqliteStore;
pub use store::{Filter, RemoteStore, Snapshot, StoreEvent, Subscription};
