// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "switchboard",
    about = "Multi-channel conversational gateway: routes Telegram, Feishu, Slack, and a web UI through a tool-calling agent",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file (default: ~/.switchboard/config.json)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the agent directly from the terminal, bypassing every channel adapter.
    ///
    /// With `--message`, runs a single turn and exits. Without it, reads lines
    /// from stdin as an interactive session until `exit`, `quit`, or EOF.
    Agent {
        /// A single message to send. If omitted, starts an interactive session.
        #[arg(long, short = 'm')]
        message: Option<String>,
    },

    /// Start the gateway: channel adapters, the agent core, cron, and the heartbeat.
    ///
    /// Runs until it receives Ctrl-C or SIGTERM, then shuts every subsystem
    /// down in reverse startup order.
    Gateway,

    /// Interactively scaffold a workspace and write a starter config.
    ///
    /// Writes `PROMPT.md`, `PERSONA.md`, `PULSE.md`, a `journal/` directory,
    /// and `~/.switchboard/config.json`. Safe to re-run; existing files are
    /// left untouched unless you confirm an overwrite.
    Onboard,

    /// Print the effective configuration, masking the provider API key.
    Status,

    /// Generate a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
}
