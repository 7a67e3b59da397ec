//! `ferrule ask`: one turn, one envelope.

use ferrule_config::AppConfig;

use super::{CommandResult, build_orchestrator};

pub async fn run(config: &AppConfig, message: String, json: bool) -> CommandResult {
    let orchestrator = build_orchestrator(config)?;
    let envelope = orchestrator.run(message, Vec::new()).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    } else if let Some(outcome) = &envelope.data {
        println!("{}", outcome.answer);
        if let Some(note) = &envelope.message {
            eprintln!("  [{note}]");
        }
    }

    match envelope.error {
        Some(error) => {
            if !json {
                eprintln!("  [Error {}] {}", error.code, error.message);
                for suggestion in &error.suggestions {
                    eprintln!("    - {suggestion}");
                }
            }
            Err(format!("request failed: {}", error.code).into())
        }
        None => Ok(()),
    }
}
