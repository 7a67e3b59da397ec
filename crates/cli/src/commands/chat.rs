//! `ferrule chat`: interactive session with in-memory history.

use std::io::Write;

use ferrule_config::AppConfig;
use ferrule_core::message::Message;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{CommandResult, build_orchestrator};

pub async fn run(config: &AppConfig) -> CommandResult {
    let orchestrator = build_orchestrator(config)?;

    println!();
    println!("  Ferrule interactive session");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", orchestrator.config().model);
    println!("  Tools:     {}", orchestrator.registry().names().join(", "));
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut history: Vec<Message> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }

        let envelope = orchestrator.run(input, history.clone()).await;
        match (&envelope.data, &envelope.error) {
            (Some(outcome), _) => {
                println!();
                for line in outcome.answer.lines() {
                    println!("  Assistant > {line}");
                }
                if let Some(note) = &envelope.message {
                    println!("  [{note}]");
                }
                println!();
                history.extend(outcome.transcript.iter().cloned());
            }
            (None, Some(error)) => {
                eprintln!("  [Error {}] {}", error.code, error.message);
                println!();
            }
            (None, None) => {}
        }
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}
