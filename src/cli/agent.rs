//! Agent command handler (interactive + single-message mode).

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Result;

use maru::bus::MessageBus;
use maru::config::Config;
use maru::providers::resolve_provider;

use super::common::create_agent;

/// Interactive or single-message agent mode.
///
/// Both modes go through `AgentLoop::process_direct`, so the message bus is
/// bypassed and the call blocks until the final answer is ready.
pub(crate) async fn cmd_agent(message: Option<String>, session: String) -> Result<()> {
    let config = Config::get();

    let bus = Arc::new(MessageBus::new());
    let agent = create_agent(config.clone(), bus).await?;

    if resolve_provider(&config).is_none() {
        eprintln!("Warning: No AI provider configured. Set MARU_PROVIDERS_OPENAI_API_KEY");
        eprintln!("or add your API key to {:?}", Config::path());
        eprintln!();
    }

    if let Some(msg) = message {
        // Single message mode
        match agent.process_direct(&msg, &session).await {
            Ok(response) => {
                println!("{}", response);
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        // Interactive mode
        println!("Maru Interactive Agent");
        println!("Type your message and press Enter. Type 'quit' or 'exit' to stop.");
        println!();

        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("> ");
            stdout.flush()?;

            let mut input = String::new();
            match stdin.lock().read_line(&mut input) {
                Ok(0) => {
                    // EOF
                    println!();
                    break;
                }
                Ok(_) => {
                    let input = input.trim();
                    if input.is_empty() {
                        continue;
                    }
                    if input == "quit" || input == "exit" {
                        println!("Goodbye!");
                        break;
                    }

                    match agent.process_direct(input, &session).await {
                        Ok(response) => {
                            println!();
                            println!("{}", response);
                            println!();
                        }
                        Err(e) => {
                            eprintln!("Error: {}", e);
                            eprintln!();
                        }
                    }
                }
                Err(e) => {
                    eprintln!("Error reading input: {}", e);
                    break;
                }
            }
        }
    }

    Ok(())
}
