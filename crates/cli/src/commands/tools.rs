//! `ferrule tools`

use ferrule_config::AppConfig;

use super::{CommandResult, security_policy};

pub fn run(config: &AppConfig) -> CommandResult {
    let registry = ferrule_tools::default_registry(security_policy(config));

    for definition in registry.definitions() {
        println!("{}", definition.name);
        println!("  {}", definition.description);
        let schema = serde_json::to_string_pretty(&definition.parameters)?;
        for line in schema.lines() {
            println!("    {line}");
        }
        println!();
    }
    Ok(())
}
