//! `run`: start the engine over the in-process bus and ledger, assign a plan,
//! and serve until shutdown.

use anyhow::{Context, Result};
use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::plan::load_plan;
use crate::bus::MemoryBus;
use crate::config::AppConfig;
use crate::coordination::{install_signal_handlers, GracefulShutdown, ShutdownConfig};
use crate::coordinator::{Collaborators, Engine};
use crate::ledger::{AccountId, MemoryLedger, TokenTransfer};
use crate::liveness::{connect_liveness, heartbeat_loop, RegisterRequest};
use crate::simulation::{SimulatedAgent, SimulationConfig};

/// Treasury supply minted into the in-process ledger at startup.
const TREASURY_SUPPLY: i64 = 1_000_000;

#[derive(Debug, Clone, Default)]
pub struct RunOptions<'a> {
    pub plan: Option<&'a Path>,
    pub simulate: bool,
    pub duplicate_results: bool,
}

pub async fn run(config: AppConfig, options: RunOptions<'_>) -> Result<()> {
    let plan = load_plan(options.plan, &config)?;

    let shutdown = Arc::new(GracefulShutdown::new(ShutdownConfig::default()));
    install_signal_handlers(shutdown.clone());
    let cancel = shutdown.token();

    let bus = Arc::new(MemoryBus::new(
        config.publish.clone(),
        config.subscribe.clone(),
    ));
    let ledger = Arc::new(MemoryLedger::new());
    let token = config.coordinator.payment_token;
    let treasury = config.coordinator.treasury_account;
    ledger.create_token(token, treasury, TREASURY_SUPPLY).await;
    for agent in &config.agents {
        let account: AccountId = agent
            .account
            .parse()
            .with_context(|| format!("agent {} account", agent.id))?;
        ledger
            .associate_token(&cancel, token, account)
            .await
            .with_context(|| format!("associate {} with {}", token, account))?;
    }

    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    let session = connect_liveness(
        &cancel,
        &config.liveness,
        RegisterRequest {
            agent_name: config.coordinator.coordinator_id.clone(),
            agent_type: "coordinator".to_string(),
            capabilities: vec![
                "topics".to_string(),
                "payments".to_string(),
                "scheduling".to_string(),
            ],
            account_id: treasury.to_string(),
        },
    )
    .await;
    handles.push(tokio::spawn(heartbeat_loop(
        cancel.clone(),
        session.client,
        session.registration,
        config.liveness.heartbeat_interval(),
    )));

    let engine = Engine::new(
        config.coordinator.clone(),
        &config.agents,
        Collaborators {
            publisher: bus.clone(),
            subscriber: bus.clone(),
            transfer: ledger.clone(),
        },
    )?;
    handles.extend(engine.spawn(&cancel));

    if options.simulate {
        let mut sim = SimulationConfig::new(
            config.coordinator.task_topic,
            config.coordinator.status_topic,
        );
        sim.duplicate_results = options.duplicate_results;
        sim.pnl_reports = true;
        for agent in &config.agents {
            let agent = SimulatedAgent::new(agent.id.clone(), bus.clone(), bus.clone(), sim.clone());
            let agent_cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                if let Err(e) = agent.run(agent_cancel).await {
                    warn!(agent_id = %agent.id(), error = %e, "simulated agent stopped");
                }
            }));
        }
        info!(agents = config.agents.len(), "simulated agents started");
    }

    match engine.run_plan(&cancel, &plan).await {
        Ok(run) => info!(
            festival_id = %run.festival_id,
            assigned = run.assigned.len(),
            total = run.total,
            "plan dispatched; waiting for agents (Ctrl-C to stop)"
        ),
        Err(e) if e.is_cancelled() => info!("interrupted before the plan was dispatched"),
        Err(e) => error!(error = %e, "plan dispatch failed"),
    }

    shutdown.requested().await;
    if let Err(e) = shutdown
        .execute(async {
            join_all(handles).await;
        })
        .await
    {
        warn!(error = %e, "shutdown did not drain cleanly");
    }

    let mut states: Vec<_> = engine.task_states().await.into_iter().collect();
    states.sort_by(|a, b| a.0.cmp(&b.0));
    for (task_id, status) in states {
        info!(task_id = %task_id, status = %status, "final task state");
    }
    for agent in &config.agents {
        if let Ok(account) = agent.account.parse::<AccountId>() {
            info!(
                agent_id = %agent.id,
                account = %account,
                balance = ledger.balance(token, account).await,
                "final balance"
            );
        }
    }
    Ok(())
}
