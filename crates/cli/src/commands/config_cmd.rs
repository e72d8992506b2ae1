//! `loopguard config` — Configuration management commands.

use loopguard_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   ✅ Config parsed successfully");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    let budget = config.to_budget()?;
    let convergence = config.to_convergence_config()?;
    println!();
    println!(
        "   Budget:       {} tool calls, depth {}, {}s",
        budget.max_tool_calls,
        budget.max_depth,
        budget.time_budget.as_secs()
    );
    println!(
        "   Tokens:       {} in / {} out",
        budget.max_input_tokens, budget.max_output_tokens
    );
    println!(
        "   Convergence:  window {}, threshold {}, ratio {}",
        convergence.window_size, convergence.similarity_threshold, convergence.convergence_ratio
    );
    println!(
        "   Critic:       {}",
        if config.critic.enabled {
            format!("{} ({})", config.critic.model, config.critic.provider)
        } else {
            "disabled".into()
        }
    );

    Ok(())
}

/// Settings that load fine but probably don't do what the user wants.
fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();

    if config.critic.enabled && !config.has_critic_key() && config.critic.api_url.is_none() {
        warnings.push("Critic enabled but no API key (set LOOPGUARD_API_KEY)");
    }

    if config.critic.enabled && !config.convergence.use_critic_model {
        warnings.push("Critic enabled but convergence.use_critic_model = false; it will never be consulted");
    }

    if config.budget.convergence_threshold > 0.0
        && config.budget.convergence_threshold < config.convergence.similarity_threshold
    {
        warnings.push("budget.convergence_threshold is below convergence.similarity_threshold; the light check may stop loops first");
    }

    warnings
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    // Never echo secrets
    if config.critic.api_key.is_some() {
        config.critic.api_key = Some("[REDACTED]".into());
    }
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::config_path().display());
    Ok(())
}
