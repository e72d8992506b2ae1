//! `loopguard replay` — Run a recorded transcript through the controller.

use loopguard_agent::{GuardedLoop, LoopController, LoopOutcome, Transcript, drain_events};
use loopguard_config::AppConfig;
use loopguard_convergence::ConvergenceAnalysis;
use loopguard_core::{EventBus, LoopEvent};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Everything a replay produced.
pub struct ReplayReport {
    pub outcome: LoopOutcome,
    pub events: Vec<LoopEvent>,
    pub analysis: ConvergenceAnalysis,
}

pub async fn run(file: PathBuf, json: bool, critic: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let content = std::fs::read_to_string(&file)
        .map_err(|e| format!("Failed to read {}: {e}", file.display()))?;
    let transcript = Transcript::from_json(&content)?;

    if !json {
        println!(
            "🔁 Replaying {} iteration(s) from {}\n",
            transcript.len(),
            file.display()
        );
    }

    let report = replay(&config, transcript, critic).await?;

    if json {
        for event in &report.events {
            println!("{}", serde_json::to_string(event)?);
        }
        let analysis = serde_json::json!({ "type": "analysis", "analysis": report.analysis });
        println!("{analysis}");
    } else {
        print_report(&report);
    }

    Ok(())
}

/// Replay `transcript` under the budget and convergence settings in `config`.
pub async fn replay(
    config: &AppConfig,
    transcript: Transcript,
    use_critic: bool,
) -> Result<ReplayReport, Box<dyn std::error::Error>> {
    let budget = config.to_budget()?;
    let mut convergence = config.to_convergence_config()?;

    // `--critic` turns the critic on even when the config leaves it off.
    let oracle = if use_critic || config.critic.enabled {
        let mut critic_config = config.clone();
        critic_config.critic.enabled = true;
        let oracle = loopguard_providers::build_critic(&critic_config);
        if oracle.is_none() {
            warn!("Critic requested but could not be built, using lexical similarity");
        }
        oracle
    } else {
        None
    };

    if oracle.is_none() {
        convergence.use_critic_model = false;
    }

    let mut controller = LoopController::new(budget, convergence)?;
    if let Some(oracle) = oracle {
        controller = controller.with_oracle(oracle);
    }

    let bus = Arc::new(EventBus::default());
    let mut receiver = bus.subscribe();

    // Replayed iterations arrive back to back, so the stability window
    // would otherwise suppress every check after the first.
    let mut guarded = GuardedLoop::new(controller, bus).with_forced_convergence_checks(true);
    let outcome = guarded.run(&mut transcript.into_source()).await?;
    let events = drain_events(&mut receiver);
    let analysis = guarded.controller_mut().analysis().await;

    Ok(ReplayReport {
        outcome,
        events,
        analysis,
    })
}

fn print_report(report: &ReplayReport) {
    for event in &report.events {
        match event {
            LoopEvent::BudgetExceeded {
                reason,
                tool_calls_made,
                elapsed_ms,
            } => println!("  ⛔ budget_exceeded: {reason} ({tool_calls_made} tool calls, {elapsed_ms}ms)"),
            LoopEvent::Converged {
                reason,
                similarity_threshold,
                responses_analyzed,
            } => println!(
                "  ✅ converged: {reason} ({responses_analyzed} responses, threshold {similarity_threshold})"
            ),
            LoopEvent::Done { summary } => println!("  🏁 done: {summary}"),
        }
    }

    let usage = &report.outcome.usage;
    println!();
    println!("  Iterations:   {}", report.outcome.iterations);
    println!("  Tool calls:   {}", usage.tool_calls_made);
    println!(
        "  Tokens:       {} in / {} out",
        usage.input_tokens_used, usage.output_tokens_used
    );

    let analysis = &report.analysis;
    println!("  Analysis:     {}", analysis.status);
    if let (Some(signals), Some(score)) = (&analysis.signals, analysis.weighted_score) {
        println!(
            "  Signals:      similarity {:.2}, confidence {:.2}, stability {:.2}, quality {:.2}",
            signals.similarity, signals.confidence, signals.stability, signals.quality
        );
        println!("  Score:        {score:.2} (needs {:.2})", analysis.thresholds.min_weighted_score);
    }
    if analysis.oracle.is_degraded() {
        println!("  ⚠️  Critic degraded, lexical similarity was used");
    }
}
