//! `loopguard doctor` — Diagnose configuration health.

use loopguard_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 LoopGuard Doctor — Diagnostics");
    println!("=================================\n");

    let mut issues = 0;

    println!("  ✅ Rust binary running");

    let config_path = AppConfig::config_path();
    let config = if config_path.exists() {
        match AppConfig::load() {
            Ok(config) => {
                println!("  ✅ Config file valid");
                Some(config)
            }
            Err(e) => {
                println!("  ❌ Config file invalid: {e}");
                issues += 1;
                None
            }
        }
    } else {
        println!("  ⚠️  No config file — using defaults (run `loopguard onboard`)");
        issues += 1;
        AppConfig::load().ok()
    };

    if let Some(config) = config {
        match (config.to_budget(), config.to_convergence_config()) {
            (Ok(_), Ok(_)) => println!("  ✅ Budget and convergence settings in range"),
            (Err(e), _) | (_, Err(e)) => {
                println!("  ❌ {e}");
                issues += 1;
            }
        }

        if !config.critic.enabled {
            println!("  ✅ Critic disabled — lexical similarity only");
        } else if config.has_critic_key() || config.critic.api_url.is_some() {
            println!(
                "  ✅ Critic configured: {} via {}",
                config.critic.model, config.critic.provider
            );
        } else {
            println!("  ⚠️  Critic enabled but no API key — set LOOPGUARD_API_KEY");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
