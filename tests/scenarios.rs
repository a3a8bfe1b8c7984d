use std::sync::mpsc;
use std::time::Duration;

use todosync::reminder::now_ms;
use todosync::{
    IdentityProvider, LocalIdentity, ReminderScheduler, RemoteStore, Session, SqliteStore,
    TaskList, TodoError, ViewMode,
};

fn signed_in(identity: &LocalIdentity) -> Session {
    identity
        .create_user("alice@example.com", "secret-pw")
        .unwrap()
}

#[test]
fn add_with_reminder_then_see_it_live() {
    let identity = LocalIdentity::new(todosync::db::open_memory().unwrap());
    let session = signed_in(&identity);
    let store = SqliteStore::open_memory().unwrap();

    let (tx, rx) = mpsc::channel();
    let scheduler = ReminderScheduler::start(tx).unwrap();
    let mut list = TaskList::new(store, session).with_reminders(scheduler.handle());
    list.load_all().unwrap();
    assert!(list.tasks().is_empty());

    let task = list
        .add_task("Buy milk", "2%", Some(now_ms() + 50))
        .unwrap();
    list.pump().unwrap();

    assert_eq!(list.tasks().len(), 1);
    let shown = &list.tasks()[0];
    assert_eq!(shown.id, task.id);
    assert_eq!(shown.title, "Buy milk");
    assert_eq!(shown.description, "2%");
    assert!(!shown.completed);

    drop(list);
    scheduler.join();

    let fired: Vec<_> = rx.try_iter().collect();
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].task_id, task.id);
    assert_eq!(fired[0].body, "Buy milk");
}

#[test]
fn filtered_views_freeze_until_reload() {
    let session = Session {
        user_id: "u1".into(),
        email: "u1@example.com".into(),
    };
    let store = SqliteStore::open_memory().unwrap();
    let mut list = TaskList::new(store, session);
    list.load_all().unwrap();

    for title in ["a", "b", "c"] {
        list.add_task(title, "", None).unwrap();
    }
    list.pump().unwrap();
    let by_title = |list: &TaskList<SqliteStore>, title: &str| {
        list.tasks().iter().find(|t| t.title == title).unwrap().clone()
    };
    let mut a = by_title(&list, "a");
    let mut b = by_title(&list, "b");
    assert!(list.toggle_completed(&mut a, true).unwrap());
    assert!(list.toggle_completed(&mut b, true).unwrap());

    list.load_filtered(true).unwrap();
    assert_eq!(list.mode(), ViewMode::Snapshot { completed: true });
    assert_eq!(list.tasks().len(), 2);
    assert!(list.tasks().iter().all(|t| t.completed));

    list.load_filtered(false).unwrap();
    assert_eq!(list.tasks().len(), 1);
    assert_eq!(list.tasks()[0].title, "c");

    // Frozen: a new task does not appear until the list is reloaded.
    list.add_task("d", "", None).unwrap();
    assert!(!list.wait(Duration::from_millis(20)).unwrap());
    assert_eq!(list.tasks().len(), 1);

    list.load_all().unwrap();
    assert_eq!(list.mode(), ViewMode::Live);
    assert_eq!(list.tasks().len(), 4);
}

#[test]
fn empty_title_writes_nothing() {
    let session = Session {
        user_id: "u1".into(),
        email: "u1@example.com".into(),
    };
    let store = SqliteStore::open_memory().unwrap();
    let mut list = TaskList::new(store, session);
    list.load_all().unwrap();

    let err = list.add_task("", "x", None).unwrap_err();
    assert!(matches!(err, TodoError::Validation(_)));
    assert_eq!(err.user_message(), "Title cannot be empty");

    list.pump().unwrap();
    assert!(list.tasks().is_empty());
    assert_eq!(list.store().len("u1").unwrap(), 0);
}

#[test]
fn deleted_task_is_gone_everywhere() {
    let session = Session {
        user_id: "u1".into(),
        email: "u1@example.com".into(),
    };
    let store = SqliteStore::open_memory().unwrap();
    let mut list = TaskList::new(store, session);
    list.load_all().unwrap();

    let keep = list.add_task("keep", "", None).unwrap();
    let gone = list.add_task("gone", "", None).unwrap();
    list.pump().unwrap();
    assert_eq!(list.tasks().len(), 2);

    list.delete_task(&gone).unwrap();
    assert!(list.get(&gone.id).is_none());
    list.pump().unwrap();
    assert!(list.get(&gone.id).is_none());
    assert!(list.get(&keep.id).is_some());
    assert!(list.store().get("u1", &gone.id).unwrap().is_none());
}

#[test]
fn users_only_see_their_own_tasks() {
    let store = SqliteStore::open_memory().unwrap();
    let alice = Session {
        user_id: "alice".into(),
        email: "alice@example.com".into(),
    };
    let bob = Session {
        user_id: "bob".into(),
        email: "bob@example.com".into(),
    };
    let mut alice_list = TaskList::new(store.clone(), alice);
    let mut bob_list = TaskList::new(store.clone(), bob);
    alice_list.load_all().unwrap();
    bob_list.load_all().unwrap();

    alice_list.add_task("alice's", "", None).unwrap();
    alice_list.pump().unwrap();
    bob_list.pump().unwrap();

    assert_eq!(alice_list.tasks().len(), 1);
    assert!(bob_list.tasks().is_empty());

    drop(alice_list);
    drop(bob_list);
    assert_eq!(store.subscriber_count(), 0);
    assert!(store.query_once("bob", &todosync::Filter::completed(false)).unwrap().is_empty());
}
