use std::path::Path;
use std::sync::Arc;

use ferrule_agent::{Orchestrator, OrchestratorConfig};
use ferrule_config::AppConfig;
use ferrule_core::provider::Provider as _;
use ferrule_providers::{RetryPolicy, build_from_config};
use ferrule_security::SecurityPolicy;
use tracing::{debug, info};

pub mod ask;
pub mod chat;
pub mod check;
pub mod config_cmd;
pub mod tools;

pub type CommandResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Load from `path` when given, else from the default location.
pub fn load_config(path: Option<&Path>) -> CommandResult<AppConfig> {
    let config = match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)?;
            config.apply_env_overrides(|key| std::env::var(key).ok())?;
            config
        }
        None => AppConfig::load()?,
    };
    debug!(
        provider = %config.default_provider,
        model = %config.default_model,
        has_api_key = config.has_api_key(),
        "Configuration loaded"
    );
    Ok(config)
}

pub fn security_policy(config: &AppConfig) -> Arc<SecurityPolicy> {
    Arc::new(SecurityPolicy::from_config(&config.security))
}

/// Wire provider, tools, retry policy and limits into one orchestrator.
pub fn build_orchestrator(config: &AppConfig) -> CommandResult<Orchestrator> {
    if !config.has_api_key() && config.default_provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    FERRULE_API_KEY, OPENROUTER_API_KEY or OPENAI_API_KEY");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("no API key found".into());
    }

    let router = build_from_config(config)?;
    let provider = router
        .default_provider()
        .ok_or("no default provider configured")?;
    let policy = security_policy(config);
    let registry = Arc::new(ferrule_tools::default_registry(policy.clone()));
    let settings = OrchestratorConfig::from_app_config(config);

    info!(
        provider = provider.name(),
        model = %settings.model,
        tools = registry.len(),
        workspace = %policy.workspace_dir().display(),
        max_iterations = settings.max_iterations,
        "Orchestrator ready"
    );

    Ok(Orchestrator::new(
        provider,
        registry,
        RetryPolicy::from_config(&config.retry),
        settings,
    ))
}
