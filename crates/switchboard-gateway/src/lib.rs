// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Wires the configured channel adapters, the tool-calling agent core, and
//! the persistent scheduler into one running process.
pub mod heartbeat;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use switchboard_channels::{
    AdapterSink, ChannelAdapter, LongPollingAdapter, MessageBus, WebUIAdapter, WebhookAAdapter,
    WebhookBAdapter,
};
use switchboard_config::Config;
use switchboard_core::{
    load_persona_sections, load_skills, AgentRunner, ConversationStore, MemoryStore,
    OutboundMessage, TokenUsageJournal,
};
use switchboard_mcp::{MCPManager, MCPServerSpec};
use switchboard_model::Runtime;
use switchboard_scheduler::{CronHandler, CronJob, CronService};
use switchboard_tools::builtin::{ExecTool, ListDirTool, ReadFileTool, WriteFileTool};
use switchboard_tools::{Dispatcher, HookManager, ToolRegistry};

use crate::heartbeat::HeartbeatService;

/// How often the heartbeat re-reads `PULSE.md` and, if it has content,
/// hands it to the agent under the `"system"` session.
const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 1800;

/// Bridges a fired cron job back into the agent and, when the payload asks
/// for it, routes the reply out through the named channel.
struct CronBridge {
    runner: Arc<AgentRunner>,
    outbound: tokio::sync::mpsc::Sender<OutboundMessage>,
}

#[async_trait::async_trait]
impl CronHandler for CronBridge {
    async fn run_job(&self, job: &CronJob) -> anyhow::Result<String> {
        let reply = self.runner.run("system", &job.payload.message, vec![]).await;
        if job.payload.deliver && !job.payload.channel.is_empty() {
            let message = OutboundMessage {
                channel: job.payload.channel.clone(),
                chat_id: job.payload.to.clone(),
                text: reply.clone(),
                blocks: vec![],
            };
            if self.outbound.send(message).await.is_err() {
                tracing::warn!(job = %job.name, "outbound queue closed, dropping cron reply");
            }
        }
        Ok(reply)
    }
}

/// A fully assembled, running gateway. Construct with [`Gateway::start`]
/// and drive to completion with [`Gateway::run_until_shutdown`].
pub struct Gateway {
    mcp: Option<Arc<MCPManager>>,
    bus_stop: tokio::sync::oneshot::Sender<()>,
    adapters: Vec<Arc<dyn ChannelAdapter>>,
    cron: Arc<CronService>,
    heartbeat: Arc<HeartbeatService>,
    http_handle: tokio::task::JoinHandle<()>,
    pump_handle: tokio::task::JoinHandle<()>,
}

/// Everything [`build_agent_runner`] assembles: the runner itself plus the
/// MCP manager it talks through, kept alive for the caller to shut down.
pub struct AgentCore {
    pub runner: Arc<AgentRunner>,
    pub mcp: Option<Arc<MCPManager>>,
}

/// Builds the tool-calling agent core from configuration: provider runtime,
/// MCP servers, skills, persona, memory, local tools, and hooks. Shared by
/// the gateway (which adds channel adapters, cron, and a heartbeat on top)
/// and the single-shot/interactive `agent` CLI command, which needs nothing
/// more than this.
pub async fn build_agent_runner(config: &Config) -> anyhow::Result<AgentCore> {
    config.validate()?;
    let api_key = switchboard_config::resolve_api_key(config);
    let runtime = Arc::new(Runtime::new(
        config.provider.clone(),
        config.agent.model.clone(),
        api_key,
        config.agent.max_tokens,
        config.agent.temperature,
    ));

    let mcp_server_names: Vec<String> = config.mcp.servers.iter().map(|s| s.name.clone()).collect();
    let mcp = if config.mcp.servers.is_empty() {
        None
    } else {
        let mut manager = MCPManager::new();
        let specs = config
            .mcp
            .servers
            .iter()
            .map(|s| MCPServerSpec {
                name: s.name.clone(),
                command: s.command.clone(),
                args: s.args.clone(),
                env: s.env.clone(),
                cwd: s.cwd.clone(),
            })
            .collect();
        manager.start_all(specs).await;
        Some(Arc::new(manager))
    };

    let workspace = PathBuf::from(&config.agent.workspace);
    let skills = if config.skills.enabled {
        load_skills(&workspace.join(&config.skills.dir))
    } else {
        Vec::new()
    };
    let persona_sections = load_persona_sections(&workspace);
    let memory = MemoryStore::new(workspace.clone());

    let mut registry = ToolRegistry::new();
    registry.register(ExecTool {
        workspace: workspace.clone(),
        timeout: Duration::from_millis(config.tools.exec_timeout),
    });
    registry.register(ReadFileTool {
        workspace: workspace.clone(),
        restrict_to_workspace: config.tools.restrict_to_workspace,
    });
    registry.register(WriteFileTool {
        workspace: workspace.clone(),
        restrict_to_workspace: config.tools.restrict_to_workspace,
    });
    registry.register(ListDirTool {
        workspace: workspace.clone(),
        restrict_to_workspace: config.tools.restrict_to_workspace,
    });

    let hooks = HookManager::from_config(&config.hooks);
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry), mcp.clone(), hooks));

    let token_usage = Arc::new(TokenUsageJournal::new(
        resolve_usage_path(&config.token_tracking.path),
        config.token_tracking.enabled,
    ));

    let runner = Arc::new(AgentRunner::new(
        Arc::new(ConversationStore::new()),
        runtime,
        dispatcher,
        memory,
        skills,
        persona_sections,
        mcp_server_names,
        config.auto_compact.clone(),
        config.agent.max_tool_iterations,
        config.agent.max_tokens,
        token_usage,
    ));

    Ok(AgentCore { runner, mcp })
}

impl Gateway {
    /// Assembles every subsystem and brings it up in dependency order:
    /// MCP servers before the tool dispatcher that fronts them, the
    /// dispatcher before the agent that calls it, the agent before anything
    /// that calls into it (channel adapters, cron, heartbeat).
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        let AgentCore { runner, mcp } = build_agent_runner(&config).await?;
        let workspace = PathBuf::from(&config.agent.workspace);

        let bus = MessageBus::new();
        let mut adapters: Vec<Arc<dyn ChannelAdapter>> = Vec::new();
        let mut router = Router::new();

        let long_polling =
            LongPollingAdapter::new(config.channels.telegram.clone(), bus.inbound_sender());
        bus.register_sink("telegram", Arc::new(AdapterSink(long_polling.clone())));
        adapters.push(long_polling as Arc<dyn ChannelAdapter>);

        let webhook_a =
            WebhookAAdapter::new(config.channels.feishu.clone(), bus.inbound_sender());
        bus.register_sink("feishu", Arc::new(AdapterSink(webhook_a.clone())));
        router = router.merge(webhook_a.clone().router());
        adapters.push(webhook_a as Arc<dyn ChannelAdapter>);

        let webhook_b = WebhookBAdapter::new(config.channels.slack.clone(), bus.inbound_sender());
        bus.register_sink("slack", Arc::new(AdapterSink(webhook_b.clone())));
        router = router.merge(webhook_b.clone().router());
        adapters.push(webhook_b as Arc<dyn ChannelAdapter>);

        let webui = WebUIAdapter::new(config.channels.webui.clone(), bus.inbound_sender());
        bus.register_sink("webui", webui.clone());
        router = router.merge(webui.clone().router(workspace.join("static")));
        adapters.push(webui as Arc<dyn ChannelAdapter>);

        for adapter in &adapters {
            adapter
                .clone()
                .start()
                .await
                .with_context(|| format!("starting {} adapter", adapter.name()))?;
        }

        let listener =
            tokio::net::TcpListener::bind((config.gateway.host.as_str(), config.gateway.port))
                .await
                .with_context(|| {
                    format!("binding gateway to {}:{}", config.gateway.host, config.gateway.port)
                })?;
        let http_handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("gateway HTTP server exited: {e}");
            }
        });

        let (bus_stop_tx, bus_stop_rx) = tokio::sync::oneshot::channel();
        tokio::spawn(bus.clone().run_dispatcher(bus_stop_rx));

        let adapters_by_channel: std::collections::HashMap<String, Arc<dyn ChannelAdapter>> =
            adapters.iter().map(|a| (a.name().to_string(), a.clone())).collect();
        let pump_handle = spawn_inbound_pump(
            bus.clone(),
            runner.clone(),
            adapters_by_channel,
            config.agent.max_concurrency,
        );

        let cron = CronService::new(
            cron_store_path(),
            Arc::new(CronBridge { runner: runner.clone(), outbound: bus.outbound_sender() }),
        );
        cron.start().await.context("starting cron service")?;

        let heartbeat =
            HeartbeatService::new(workspace, DEFAULT_HEARTBEAT_INTERVAL_SECS, runner);
        heartbeat.start().await;

        Ok(Self {
            mcp,
            bus_stop: bus_stop_tx,
            adapters,
            cron,
            heartbeat,
            http_handle,
            pump_handle,
        })
    }

    /// Blocks until a shutdown signal arrives (Ctrl-C, or SIGTERM on Unix),
    /// then tears every subsystem down in the reverse of the order
    /// `start` brought it up.
    pub async fn run_until_shutdown(self) -> anyhow::Result<()> {
        wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received, stopping gateway");
        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(self) {
        self.heartbeat.stop().await;
        self.cron.stop().await;
        for adapter in &self.adapters {
            adapter.stop().await;
        }
        self.pump_handle.abort();
        self.http_handle.abort();
        let _ = self.bus_stop.send(());
        if let Some(mcp) = &self.mcp {
            mcp.shutdown_all().await;
        }
    }
}

/// Drains the inbound queue, bounding in-flight agent runs to
/// `max_concurrency` permits. Each message gets its own task so a slow
/// reply on one session never blocks another. Messages from a chat_id the
/// originating adapter doesn't allow are dropped before reaching the agent.
fn spawn_inbound_pump(
    bus: Arc<MessageBus>,
    runner: Arc<AgentRunner>,
    adapters_by_channel: std::collections::HashMap<String, Arc<dyn ChannelAdapter>>,
    max_concurrency: u32,
) -> tokio::task::JoinHandle<()> {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(max_concurrency.max(1) as usize));
    tokio::spawn(async move {
        let Some(mut inbound) = bus.take_inbound_receiver().await else {
            tracing::error!("inbound receiver already taken, pump cannot start");
            return;
        };
        while let Some(message) = inbound.recv().await {
            if let Some(adapter) = adapters_by_channel.get(&message.channel) {
                if !adapter.is_allowed(&message.chat_id) {
                    tracing::warn!(
                        channel = %message.channel,
                        chat_id = %message.chat_id,
                        "dropping inbound message from disallowed chat_id"
                    );
                    continue;
                }
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore is never closed while the pump runs");
            let runner = runner.clone();
            let outbound = bus.outbound_sender();
            tokio::spawn(async move {
                let _permit = permit;
                let session_key = message.session_key();
                let channel = message.channel.clone();
                let chat_id = message.chat_id.clone();
                let reply = runner.run(&session_key, &message.text, message.blocks).await;
                let out = OutboundMessage { channel, chat_id, text: reply, blocks: vec![] };
                if outbound.send(out).await.is_err() {
                    tracing::warn!(session = %session_key, "outbound queue closed, dropping reply");
                }
            });
        }
    })
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn cron_store_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".switchboard")
        .join("data")
        .join("cron")
        .join("jobs.json")
}

fn resolve_usage_path(configured: &str) -> PathBuf {
    let path = PathBuf::from(configured);
    if path.is_absolute() {
        return path;
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".switchboard")
        .join(configured)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_usage_path_keeps_absolute_paths() {
        let resolved = resolve_usage_path("/tmp/usage.jsonl");
        assert_eq!(resolved, PathBuf::from("/tmp/usage.jsonl"));
    }

    #[test]
    fn resolve_usage_path_anchors_relative_paths_under_home() {
        let resolved = resolve_usage_path("usage.jsonl");
        assert!(resolved.ends_with(".switchboard/usage.jsonl"));
    }

    #[test]
    fn cron_store_path_lives_under_switchboard_data_dir() {
        assert!(cron_store_path().ends_with(".switchboard/data/cron/jobs.json"));
    }
}
