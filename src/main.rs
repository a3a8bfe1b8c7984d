mod cli;

use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use cli::{Cli, Command};
use todosync::config::Config;
use todosync::reminder::{fire_at_after, now_ms, Notification, ReminderScheduler};
use todosync::{
    output, IdentityProvider, LocalIdentity, Session, SqliteStore, Task, TaskList, TodoError,
};

fn setup_logging(config: &Config) {
    env_logger::Builder::new()
        .filter_level(config.log_level())
        .parse_default_env()
        .format_timestamp_secs()
        .init();
}

fn ensure_db_dir(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

fn print_notification(n: &Notification) {
    eprintln!("[{}] {}", n.title, n.body);
}

fn require_session(identity: &LocalIdentity) -> Result<Session> {
    match identity.current_user()? {
        Some(session) => Ok(session),
        None => Err(TodoError::NotSignedIn.into()),
    }
}

fn reminder_time(secs: u64) -> Result<i64> {
    match fire_at_after(now_ms(), secs) {
        Some(at) => Ok(at),
        None => Err(TodoError::Validation("Reminder delay is too large").into()),
    }
}

/// Load the live list and pick out one task by id.
fn find_task(list: &mut TaskList<SqliteStore>, id: &str) -> Result<Task> {
    list.load_all()?;
    match list.get(id) {
        Some(task) => Ok(task.clone()),
        None => bail!("task '{id}' not found"),
    }
}

fn run_watch(mut list: TaskList<SqliteStore>) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to set signal handler")?;

    let _watch = list.store().watch_external()?;
    list.load_all()?;
    print!("{}", output::format_task_list(list.tasks()));

    while running.load(Ordering::SeqCst) {
        match list.wait(Duration::from_millis(250)) {
            Ok(true) => {
                println!("--");
                print!("{}", output::format_task_list(list.tasks()));
            }
            Ok(false) => {}
            Err(e) => eprintln!("{}", e.user_message()),
        }
    }
    list.close();
    Ok(())
}

fn dispatch(cli: Cli, config: &Config) -> Result<()> {
    let db_path = config.db_path(cli.db);
    ensure_db_dir(&db_path)?;
    let db_path = db_path
        .to_str()
        .context("database path is not valid UTF-8")?
        .to_string();
    let identity = LocalIdentity::open(&db_path)?;

    match cli.command {
        Command::Register { email, password } => {
            let session = identity.create_user(&email, &password)?;
            eprintln!("Registered and signed in as {}", session.email);
        }

        Command::Login { email, password } => {
            let session = identity.sign_in(&email, &password)?;
            eprintln!("Signed in as {}", session.email);
        }

        Command::Logout => {
            identity.sign_out()?;
            eprintln!("Signed out");
        }

        Command::Whoami => match identity.current_user()? {
            Some(session) => println!("{}", session.email),
            None => return Err(TodoError::NotSignedIn.into()),
        },

        command => {
            let session = require_session(&identity)?;
            let store = SqliteStore::open(&db_path)?;
            let list = TaskList::new(store, session);
            dispatch_tasks(list, command, config)?;
        }
    }
    Ok(())
}

fn dispatch_tasks(mut list: TaskList<SqliteStore>, command: Command, config: &Config) -> Result<()> {
    match command {
        Command::Add {
            title,
            desc,
            remind_in,
            json,
        } => {
            let Some(secs) = remind_in else {
                let task = list.add_task(&title, &desc, None)?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&task)?);
                }
                eprintln!("Task added ({})", task.id);
                return Ok(());
            };
            let at = reminder_time(secs)?;
            let scheduler = ReminderScheduler::start(print_notification)?;
            let mut list = list.with_reminders(scheduler.handle());
            let task = list.add_task(&title, &desc, Some(at))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&task)?);
            }
            eprintln!("Task added ({}); reminder in {secs}s", task.id);
            drop(list);
            scheduler.join();
        }

        Command::Edit { id, title, desc } => {
            let mut task = find_task(&mut list, &id)?;
            let desc = desc.unwrap_or_else(|| task.description.clone());
            list.update_task(&mut task, &title, &desc)?;
            eprintln!("Task updated");
        }

        Command::Check { id } => {
            let mut task = find_task(&mut list, &id)?;
            if list.toggle_completed(&mut task, true)? {
                eprintln!("Marked '{}' as completed", task.title);
            } else {
                eprintln!("'{}' is already completed", task.title);
            }
        }

        Command::Uncheck { id } => {
            let mut task = find_task(&mut list, &id)?;
            if list.toggle_completed(&mut task, false)? {
                eprintln!("Marked '{}' as pending", task.title);
            } else {
                eprintln!("'{}' is already pending", task.title);
            }
        }

        Command::Rm { id } => {
            let task = find_task(&mut list, &id)?;
            list.delete_task(&task)?;
            eprintln!("Task deleted");
        }

        Command::Show { id, json } => {
            let task = find_task(&mut list, &id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&task)?);
            } else {
                print!("{}", output::format_task_detail(&task));
            }
        }

        Command::Remind { id, in_secs } => {
            let secs = in_secs.unwrap_or(config.reminder.default_delay_secs);
            let at = reminder_time(secs)?;
            let task = find_task(&mut list, &id)?;
            let scheduler = ReminderScheduler::start(print_notification)?;
            let list = list.with_reminders(scheduler.handle());
            list.set_task_reminder(&task, at);
            eprintln!("Reminder set for {secs}s from now");
            drop(list);
            scheduler.join();
        }

        Command::List {
            completed,
            pending,
            json,
        } => {
            if completed {
                list.load_filtered(true)?;
            } else if pending {
                list.load_filtered(false)?;
            } else {
                list.load_all()?;
            }
            if json {
                let listing = output::TaskListing {
                    view: output::view_name(list.mode()),
                    tasks: list.tasks(),
                };
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                print!("{}", output::format_task_list(list.tasks()));
            }
        }

        Command::Watch => run_watch(list)?,

        Command::Register { .. } | Command::Login { .. } | Command::Logout | Command::Whoami => {
            bail!("account commands do not operate on the task list")
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&config);

    match dispatch(cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<TodoError>() {
                Some(todo) => {
                    log::debug!("{todo}");
                    eprintln!("{}", todo.user_message());
                }
                None => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
