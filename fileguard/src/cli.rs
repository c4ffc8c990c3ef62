use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "fileguard")]
#[command(version)]
#[command(about = "Blocks agent file operations on protected paths")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file (default: ~/.fileguard/settings.json)
    #[arg(long, global = true, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Handle one tool-call event from stdin (called by the host)
    Hook,

    /// Show how a tool call would be decided
    ///
    /// Examples:
    ///   fileguard explain bash "cat .env | grep KEY"
    ///   fileguard explain read ~/.ssh/id_rsa
    ///   fileguard explain --agent builder write Cargo.lock
    Explain {
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Evaluate as this agent
        #[arg(long)]
        agent: Option<String>,
        /// Working directory for relative paths (default: current directory)
        #[arg(long)]
        cwd: Option<PathBuf>,
        /// Tool name: read, write, edit, apply_patch, exec, bash
        tool: String,
        /// The command, file path, or patch text
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Check the protection config and agent overrides
    Validate {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
