// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod cli;

use std::io::{self, BufRead, Write};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Agent { message } => run_agent(cli.config.as_deref(), message.as_deref()).await,
        Commands::Gateway => run_gateway(cli.config.as_deref()).await,
        Commands::Onboard => run_onboard(),
        Commands::Status => run_status(cli.config.as_deref()),
        Commands::Completions { shell } => {
            cli::print_completions(*shell);
            Ok(())
        }
    }
}

async fn run_gateway(config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let config = switchboard_config::load(config_path)?;
    let gateway = switchboard_gateway::Gateway::start(config)
        .await
        .context("starting gateway")?;
    gateway.run_until_shutdown().await
}

/// Single-shot if `message` is given, otherwise an interactive stdin loop
/// ending on `exit`, `quit`, or EOF.
async fn run_agent(config_path: Option<&std::path::Path>, message: Option<&str>) -> anyhow::Result<()> {
    let config = switchboard_config::load(config_path)?;
    let core = switchboard_gateway::build_agent_runner(&config)
        .await
        .context("building agent")?;

    if let Some(message) = message {
        let reply = core.runner.run("cli", message, vec![]).await;
        println!("{reply}");
        if let Some(mcp) = &core.mcp {
            mcp.shutdown_all().await;
        }
        return Ok(());
    }

    println!("switchboard agent — type 'exit' or 'quit' to leave, Ctrl-D also works.");
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush().ok();
        let mut line = String::new();
        let bytes_read = stdin.lock().read_line(&mut line)?;
        if bytes_read == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }
        let reply = core.runner.run("cli", line, vec![]).await;
        println!("{reply}");
    }

    if let Some(mcp) = &core.mcp {
        mcp.shutdown_all().await;
    }
    Ok(())
}

fn run_status(config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let config = switchboard_config::load(config_path)?;
    let mut masked = config.clone();
    masked.provider.api_key = masked.provider.api_key.as_deref().map(mask_secret);
    println!("{}", serde_json::to_string_pretty(&masked)?);
    if let Err(e) = config.validate() {
        println!("\nwarning: {e}");
    }
    Ok(())
}

fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let first: String = chars[..4].iter().collect();
    let last: String = chars[chars.len() - 4..].iter().collect();
    format!("{first}...{last}")
}

fn run_onboard() -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut read_line = |prompt: &str, default: &str| -> anyhow::Result<String> {
        print!("{prompt} [{default}]: ");
        io::stdout().flush().ok();
        let mut line = String::new();
        stdin.lock().read_line(&mut line)?;
        let line = line.trim();
        Ok(if line.is_empty() { default.to_string() } else { line.to_string() })
    };

    println!("Setting up a switchboard workspace.\n");

    let workspace = read_line("Workspace directory", ".")?;
    let workspace = std::path::PathBuf::from(workspace);
    std::fs::create_dir_all(&workspace).context("creating workspace directory")?;
    std::fs::create_dir_all(workspace.join("journal")).context("creating journal directory")?;
    std::fs::create_dir_all(workspace.join("skills")).context("creating skills directory")?;

    write_if_absent(
        &workspace.join("PROMPT.md"),
        "# System Prompt\n\nYou are a helpful assistant with access to local tools.\n",
    )?;
    write_if_absent(
        &workspace.join("PERSONA.md"),
        "# Persona\n\nRespond concisely and plainly.\n",
    )?;
    write_if_absent(
        &workspace.join("PULSE.md"),
        "",
    )?;
    write_if_absent(
        &workspace.join("journal").join("LONGTERM.md"),
        "# Long-term Memory\n",
    )?;

    let provider_type = read_line("Provider (openai/anthropic/deepseek/minimax)", "openai")?;
    let model = read_line("Model", "gpt-4o")?;
    let api_key = read_line("API key (blank to read from environment at runtime)", "")?;

    let mut config = switchboard_config::Config::default();
    config.provider.r#type = provider_type;
    config.agent.model = model;
    config.agent.workspace = workspace.to_string_lossy().to_string();
    if !api_key.is_empty() {
        config.provider.api_key = Some(api_key);
    }

    let config_path = switchboard_config::config_path();
    std::fs::create_dir_all(switchboard_config::config_dir()).context("creating config directory")?;
    if config_path.exists() {
        let overwrite = read_line(
            &format!("{} already exists. Overwrite?", config_path.display()),
            "n",
        )?;
        if !matches!(overwrite.to_lowercase().as_str(), "y" | "yes") {
            println!("Leaving existing config in place.");
            return Ok(());
        }
    }
    std::fs::write(&config_path, serde_json::to_string_pretty(&config)?)
        .with_context(|| format!("writing {}", config_path.display()))?;

    println!("\nWrote {}", config_path.display());
    println!("Run `switchboard status` to review it, or `switchboard agent` to try it out.");
    Ok(())
}

fn write_if_absent(path: &std::path::Path, contents: &str) -> anyhow::Result<()> {
    if path.exists() {
        return Ok(());
    }
    std::fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

