use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::process::ProcessSort;

#[derive(Parser, Debug)]
#[command(
    name = "claudewatch",
    version,
    about = "Inspect running Claude CLI processes and their session logs"
)]
pub struct Cli {
    /// Dashboard refresh interval in seconds.
    #[arg(long, global = true, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Include MCP helper processes.
    #[arg(long, global = true)]
    pub show_helpers: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print a one-shot table of running Claude processes.
    Processes {
        #[arg(long, value_enum, default_value_t = ProcessSort::Pid)]
        sort: ProcessSort,
        #[arg(long)]
        json: bool,
    },
    /// List session logs recorded for a working directory.
    Sessions {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Parse one session log and print its statistics and conversation.
    Inspect {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// List project directories that have session logs.
    Projects {
        #[arg(long)]
        json: bool,
    },
}
