//! CLI command implementations
//!
//! Every command writes a single JSON object to stdout. Lifecycle events are
//! logged as JSON lines alongside it.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::runtime::Runtime;

use crate::identity::{AllocationId, Checkpoint, NodeId, ShardId};
use crate::observability::{Logger, MetricsRegistry, Severity};
use crate::provider::{ProviderPriority, ProviderRegistry};
use crate::publication::{
    ClusterStateApplier, ClusterStateCoordinator, ClusterTransport, LinkBehavior,
    LoopbackTransport, StaticMembership,
};
use crate::shard_recovery::{
    AllocationTable, RecoveryError, RecoveryReestablishHandler, RecoveryResumer,
    RecoverySessionRegistry, ResumeFuture, ResumeToken, TransferPlan,
};
use crate::wire::ReestablishRecoveryRequest;

use super::args::Command;
use super::config::NodeConfig;
use super::errors::{CliError, CliResult};

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    if cli.quiet {
        Logger::set_min_severity(Severity::Warn);
    }
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Settings { config } => settings(config.as_deref()),
        Command::Simulate {
            config,
            nodes,
            acks,
            delay_ms,
            rounds,
        } => simulate(config.as_deref(), nodes, acks.unwrap_or(nodes), delay_ms, rounds),
        Command::Recover {
            config,
            total_bytes,
            interrupt_after,
        } => recover(config.as_deref(), total_bytes, interrupt_after),
    }
}

/// Print the effective settings
pub fn settings(config_path: Option<&Path>) -> CliResult<()> {
    let config = NodeConfig::load_or_default(config_path)?;
    write_response(settings_report(&config)?)
}

fn settings_report(config: &NodeConfig) -> CliResult<Value> {
    let snapshot = config.settings_store()?.current();
    Ok(json!({
        "node_id": config.node_id,
        "discovery": {
            "publish_timeout_ms": duration_ms(snapshot.publish_timeout()),
            "commit_timeout_ms": duration_ms(snapshot.commit_timeout()),
            "commit_timeout_explicit": config.discovery.commit_timeout_explicit(),
            "publish_diff_enabled": snapshot.publish_diff_enabled(),
            "initial_state_timeout_ms": duration_ms(snapshot.initial_state_timeout()),
        },
        "recovery": {
            "reestablish_timeout_ms": duration_ms(config.recovery.reestablish_timeout()),
            "chunk_size_bytes": config.recovery.chunk_size_bytes,
        },
    }))
}

fn duration_ms(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn runtime() -> CliResult<Runtime> {
    Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))
}

/// Publish `rounds` consecutive states to `nodes` in-process nodes, of which
/// only the first `acks` ever answer.
pub fn simulate(
    config_path: Option<&Path>,
    nodes: usize,
    acks: usize,
    delay_ms: u64,
    rounds: u32,
) -> CliResult<()> {
    let report = simulate_report(config_path, nodes, acks, delay_ms, rounds)?;
    write_response(report)
}

fn simulate_report(
    config_path: Option<&Path>,
    nodes: usize,
    acks: usize,
    delay_ms: u64,
    rounds: u32,
) -> CliResult<Value> {
    if nodes == 0 {
        return Err(CliError::invalid_argument("--nodes must be at least 1"));
    }
    if acks > nodes {
        return Err(CliError::invalid_argument(format!(
            "--acks ({}) exceeds --nodes ({})",
            acks, nodes
        )));
    }

    let config = NodeConfig::load_or_default(config_path)?;
    let store = Arc::new(config.settings_store()?);
    let snapshot = store.current();

    let loopback = Arc::new(LoopbackTransport::new());
    let node_ids: Vec<NodeId> = (0..nodes).map(|i| NodeId::new(format!("node-{}", i))).collect();
    for (i, node) in node_ids.iter().enumerate() {
        loopback.register(Arc::new(ClusterStateApplier::new(node.clone(), &snapshot)));
        if i >= acks {
            loopback.set_link(node, LinkBehavior::Unresponsive);
        } else if delay_ms > 0 {
            loopback.set_link(node, LinkBehavior::Delay(std::time::Duration::from_millis(delay_ms)));
        }
    }

    let transports: ProviderRegistry<dyn ClusterTransport> = ProviderRegistry::new("cluster_transport");
    transports
        .register("loopback", ProviderPriority::new(0, 1), loopback.clone())
        .map_err(|e| CliError::boot_failed(e.to_string()))?;
    let transport = transports
        .resolve()
        .map_err(|e| CliError::boot_failed(e.to_string()))?;

    let metrics = Arc::new(MetricsRegistry::new());
    let coordinator = ClusterStateCoordinator::new(
        transport,
        Arc::new(StaticMembership::new(node_ids)),
        store,
        metrics.clone(),
    );

    let rt = runtime()?;
    let results = rt.block_on(async {
        let mut results = Vec::new();
        for round in 0..rounds {
            let state = coordinator.current_state().next().with_entry("round", json!(round));
            let version = state.version().to_string();
            let result = match coordinator.publish(state).await {
                Ok(report) => json!({
                    "version": version,
                    "status": "committed",
                    "acked": report.acked.iter().map(NodeId::as_str).collect::<Vec<_>>(),
                    "committed": report.committed.iter().map(NodeId::as_str).collect::<Vec<_>>(),
                    "stale": report.stale.iter().map(NodeId::as_str).collect::<Vec<_>>(),
                }),
                Err(err) => json!({
                    "version": version,
                    "status": "failed",
                    "code": err.kind().as_str(),
                    "message": err.to_string(),
                }),
            };
            results.push(result);
        }
        results
    });

    Ok(json!({
        "transport": transports.active_name(),
        "rounds": results,
        "current_version": coordinator.current_version().to_string(),
        "metrics": metrics.snapshot(),
    }))
}

/// Resumes by checking the checkpoint lies within the transfer.
struct PlanResumer {
    plan: TransferPlan,
}

impl RecoveryResumer for PlanResumer {
    fn resume(&self, token: &ResumeToken) -> ResumeFuture {
        let valid = token.checkpoint.offset() <= self.plan.total_len();
        let recovery_id = token.recovery_id;
        Box::pin(async move {
            if valid {
                Ok(())
            } else {
                Err(RecoveryError::ResumeFailed {
                    recovery_id,
                    reason: "checkpoint beyond end of transfer".to_string(),
                })
            }
        })
    }
}

/// Copy a synthetic shard, drop the connection after `interrupt_after`
/// chunks, reestablish, and finish from the checkpoint.
pub fn recover(config_path: Option<&Path>, total_bytes: u64, interrupt_after: u64) -> CliResult<()> {
    let report = recover_report(config_path, total_bytes, interrupt_after)?;
    write_response(report)
}

fn recover_report(
    config_path: Option<&Path>,
    total_bytes: u64,
    interrupt_after: u64,
) -> CliResult<Value> {
    let config = NodeConfig::load_or_default(config_path)?;
    let plan = TransferPlan::from_config(total_bytes, &config.recovery)
        .map_err(|e| CliError::config_error(e.to_string()))?;
    let len = usize::try_from(total_bytes)
        .map_err(|_| CliError::invalid_argument("--total-bytes does not fit in memory"))?;
    let source: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();

    let metrics = Arc::new(MetricsRegistry::new());
    let registry = Arc::new(RecoverySessionRegistry::new(metrics.clone()));
    let allocations = Arc::new(AllocationTable::new());
    let shard = ShardId::new("simulated", 0);
    let allocation = AllocationId::generate();
    allocations.assign(shard.clone(), allocation.clone());

    let recovery_id = registry.start_session(
        shard.clone(),
        config.node_id(),
        NodeId::new("target"),
        allocation.clone(),
    );

    let mut received = Vec::with_capacity(len);
    let mut sent = 0;
    let interrupted_at = plan.copy_from(&source, Checkpoint::START, &mut received, |checkpoint| {
        sent += 1;
        registry.record_checkpoint(recovery_id, checkpoint).is_ok() && sent < interrupt_after
    });
    registry.mark_disconnected(recovery_id).map_err(simulation_failed)?;

    let handler = RecoveryReestablishHandler::new(
        registry.clone(),
        allocations,
        Arc::new(PlanResumer { plan }),
        config.recovery.reestablish_timeout(),
    );
    let request = ReestablishRecoveryRequest::new(recovery_id, shard.clone(), allocation.clone());

    let rt = runtime()?;
    let token = rt.block_on(handler.handle(request.clone())).map_err(simulation_failed)?;

    received.truncate(clamp_len(token.checkpoint, len));
    plan.copy_from(&source, token.checkpoint, &mut received, |checkpoint| {
        registry.record_checkpoint(recovery_id, checkpoint).is_ok()
    });
    registry.complete_session(recovery_id).map_err(simulation_failed)?;

    let after_completion = rt.block_on(handler.handle(request));

    Ok(json!({
        "recovery_id": recovery_id.value(),
        "total_bytes": total_bytes,
        "chunk_size_bytes": plan.chunk_size(),
        "interrupted_at": interrupted_at.offset(),
        "resumed_from": token.checkpoint.offset(),
        "identical": received == source,
        "reestablish_after_completion": after_completion
            .err()
            .map(|e| e.kind().as_str()),
        "metrics": metrics.snapshot(),
    }))
}

fn clamp_len(checkpoint: Checkpoint, len: usize) -> usize {
    usize::try_from(checkpoint.offset()).map_or(len, |offset| offset.min(len))
}

fn simulation_failed(err: RecoveryError) -> CliError {
    CliError::simulation_failed(err.to_string())
}

/// Write a success response to stdout
fn write_response(data: Value) -> CliResult<()> {
    let response = json!({
        "status": "ok",
        "data": data
    });

    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_report_defaults() {
        let report = settings_report(&NodeConfig::default()).unwrap();
        assert_eq!(report["discovery"]["publish_timeout_ms"], 30_000);
        assert_eq!(report["discovery"]["commit_timeout_ms"], 30_000);
        assert_eq!(report["discovery"]["publish_diff_enabled"], true);
        assert_eq!(report["recovery"]["chunk_size_bytes"], 524_288);
    }

    #[test]
    fn test_simulate_rejects_more_acks_than_nodes() {
        let err = simulate_report(None, 3, 4, 0, 1).unwrap_err();
        assert_eq!(err.code_str(), "MESH_CLI_INVALID_ARGUMENT");
    }

    #[test]
    fn test_simulate_commits_on_every_node() {
        let report = simulate_report(None, 3, 3, 0, 2).unwrap();
        assert_eq!(report["transport"], "loopback");
        assert_eq!(report["current_version"], "2");
        assert_eq!(report["rounds"][1]["status"], "committed");
        assert_eq!(report["rounds"][1]["committed"].as_array().unwrap().len(), 3);
        assert_eq!(report["metrics"]["publications_committed"], 2);
    }

    #[test]
    fn test_recover_resumes_and_matches_source() {
        let report = recover_report(None, 2 * 1024 * 1024, 2).unwrap();
        assert_eq!(report["interrupted_at"], 1_048_576);
        assert_eq!(report["resumed_from"], 1_048_576);
        assert_eq!(report["identical"], true);
        assert_eq!(report["reestablish_after_completion"], "MESH_NOT_FOUND");
        assert_eq!(report["metrics"]["recoveries_completed"], 1);
    }
}
