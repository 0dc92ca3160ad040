use std::collections::HashMap;
use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use swarmguard::audit::{AuditSink, FileAudit};
use swarmguard::config::SwarmConfig;
use swarmguard::context::SwarmDeps;
use swarmguard::kill_switch::KillSwitch;
use swarmguard::llm::{HttpInference, InferenceProvider, ModelTier, OfflineInference};
use swarmguard::safety_gate::{SafetyGate, StdinConfirmation};
use swarmguard::swarm::{SwarmOrchestrator, Task};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("SWARMGUARD_CONFIG")
        .unwrap_or_else(|_| "swarm_config.json".to_string());
    let config = Arc::new(SwarmConfig::load(std::path::Path::new(&config_path))?);

    // Tracing: stdout plus a plain-text log file.
    let file_appender = tracing_appender::rolling::never(".", &config.log_file);
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    let audit: Arc<dyn AuditSink> = Arc::new(FileAudit::new(&config.audit_file));
    let kill_switch = Arc::new(
        KillSwitch::new(config.kill_switch_flag_file.clone(), Arc::clone(&audit))
            .with_monitor_interval(config.monitor_interval())
            .with_thresholds(config.kill_switch_triggers().clone()),
    );

    let args: Vec<String> = std::env::args().skip(1).collect();

    // Kill switch subcommands work even while the swarm is halted.
    match args.first().map(String::as_str) {
        Some("status") => {
            println!("Armed: {}", kill_switch.is_armed());
            println!("Triggered: {}", kill_switch.is_triggered());
            if let Some(reason) = kill_switch.trigger_reason() {
                println!("Reason: {reason}");
            }
            if let Some(time) = kill_switch.trigger_time() {
                println!("Time: {time}");
            }
            return Ok(());
        }
        Some("reset") => {
            if kill_switch.reset() {
                println!("Kill switch RESET");
            } else {
                println!("Kill switch was not triggered");
            }
            return Ok(());
        }
        _ => {}
    }

    if kill_switch.is_triggered() {
        anyhow::bail!(
            "kill switch is triggered ({}); run `swarmguard reset` after review",
            kill_switch
                .trigger_reason()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );
    }

    let inference = build_inference(&config);
    let safety = Arc::new(SafetyGate::new(
        Arc::clone(&config),
        false,
        Box::new(StdinConfirmation),
        Arc::clone(&audit),
    ));

    let deps = SwarmDeps::new(
        Arc::clone(&config),
        inference,
        Arc::clone(&audit),
        Arc::clone(&kill_switch),
        safety,
    );

    kill_switch.arm();

    let mut orchestrator = SwarmOrchestrator::new(deps);

    let descriptions: Vec<String> = if args.is_empty() {
        vec![
            "Decompose the task of building a REST API for user management".to_string(),
            "Implement code for a hello world endpoint".to_string(),
            "Document the hello world endpoint".to_string(),
        ]
    } else {
        args
    };

    for (i, description) in descriptions.into_iter().enumerate() {
        orchestrator.add_task(Task::new(format!("task-{}", i + 1), description));
    }

    let completed = orchestrator.run_until_complete().await;

    let status = orchestrator.monitor_progress();
    println!(
        "\nCompleted {} tasks ({} failed):",
        status.completed_tasks, status.failed_tasks
    );
    for task in &completed {
        let kind = task
            .result
            .as_ref()
            .and_then(|r| serde_json::to_value(r).ok())
            .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        println!("  - {}: {kind}", task.id);
    }
    for task in orchestrator.failed() {
        println!(
            "  - {} FAILED: {}",
            task.id,
            task.error.as_deref().unwrap_or("unknown")
        );
    }

    kill_switch.disarm().await;
    Ok(())
}

/// HTTP inference when an API key is configured, canned replies otherwise.
fn build_inference(config: &SwarmConfig) -> Arc<dyn InferenceProvider> {
    let api_key = std::env::var("OPENROUTER_API_KEY")
        .or_else(|_| std::env::var("SWARMGUARD_API_KEY"))
        .ok();

    match api_key {
        Some(key) => {
            let mut routing = HashMap::new();
            for (tier_name, route) in &config.model_routing {
                let tier = match tier_name.as_str() {
                    "tier_1_reasoning" => ModelTier::Tier1Reasoning,
                    "tier_2_action" => ModelTier::Tier2Action,
                    other => {
                        tracing::warn!(tier = other, "Unknown model routing tier ignored");
                        continue;
                    }
                };
                routing.insert(tier, route.clone());
            }
            Arc::new(HttpInference::new(secrecy::SecretString::from(key), routing))
        }
        None => {
            tracing::warn!("No API key configured, using offline inference");
            Arc::new(OfflineInference::new())
        }
    }
}
