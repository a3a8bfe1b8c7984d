use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "todosync", about = "Per-user to-do list with reminders", version)]
pub struct Cli {
    /// Path to the SQLite database [default: ~/.todosync/todosync.db]
    #[arg(long, env = "TODOSYNC_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Path to the config file [default: ~/.todosync/config.toml]
    #[arg(long, env = "TODOSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an account and sign in
    Register {
        email: String,
        password: String,
    },

    /// Sign in
    Login {
        email: String,
        password: String,
    },

    /// Sign out
    Logout,

    /// Show the signed-in account
    Whoami,

    /// Add a task
    Add {
        /// Task title (must not be empty)
        title: String,
        /// Task description
        #[arg(default_value = "")]
        desc: String,
        /// Arm a reminder this many seconds from now and wait for it
        #[arg(long)]
        remind_in: Option<u64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change a task's title and description
    Edit {
        /// Task id
        id: String,
        /// New title
        title: String,
        /// New description (omit to keep the current one)
        desc: Option<String>,
    },

    /// Mark a task as completed
    Check {
        /// Task id
        id: String,
    },

    /// Mark a task as pending
    Uncheck {
        /// Task id
        id: String,
    },

    /// Delete a task
    Rm {
        /// Task id
        id: String,
    },

    /// Show task details
    Show {
        /// Task id
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Arm a reminder for a task and wait for it to fire
    Remind {
        /// Task id
        id: String,
        /// Seconds from now [default: reminder.default_delay_secs, 60]
        #[arg(long = "in")]
        in_secs: Option<u64>,
    },

    /// List tasks
    List {
        /// Only completed tasks
        #[arg(long, conflicts_with = "pending")]
        completed: bool,
        /// Only pending tasks
        #[arg(long)]
        pending: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Keep the list open and reprint it on every change
    Watch,
}
