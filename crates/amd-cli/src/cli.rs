use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "amdctl", version, about = "AssistantMD workflow host control CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding one or more vault directories.
    #[arg(long, global = true)]
    pub data_root: Option<PathBuf>,

    /// Directory holding settings.yaml/secrets.yaml and engine state.
    #[arg(long, global = true)]
    pub system_root: Option<PathBuf>,

    /// Emit machine-readable JSON instead of a human-readable summary.
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one workflow to completion and print its run record.
    Run {
        /// Vault directory name.
        vault: String,
        /// Workflow name (file stem under AssistantMD/Workflows).
        workflow: String,
        /// Chat session id, when invoked as part of a session.
        #[arg(long)]
        session: Option<String>,
    },
    /// Rescan every discovered vault's Workflows/ContextTemplates and
    /// report what parsed and what didn't.
    Rescan {
        /// Restrict the scan to a single vault.
        vault: Option<String>,
    },
    /// Run a context template and print the assembled chat-agent preamble.
    BuildContext {
        vault: String,
        template: String,
        #[arg(long)]
        session: Option<String>,
        /// The user's latest message, always included verbatim in the
        /// returned history window.
        #[arg(long, default_value = "")]
        message: String,
        /// One prior chat turn; repeat in order, oldest first. The CLI has
        /// no chat surface of its own (spec.md §6's "engine → host
        /// boundary") so this is the manual way to feed `chat_history`.
        #[arg(long = "history")]
        history: Vec<String>,
    },
    /// Reconcile the scheduler's job store and list jobs due right now.
    Due,
    /// Fire every job due right now on the bounded scheduler worker pool.
    RunDue,
    /// Refresh settings/secrets from disk.
    Reload,
}
