//! Conductor Chat
//!
//! Line-oriented terminal front end for the Conductor. Type a message and
//! press enter; the response streams to stdout as it arrives.
//!
//! # Usage
//!
//! ```bash
//! conductor-chat
//!
//! # Different model, smaller context budget
//! CHAT_MODEL=mistral CHAT_CONTEXT_BUDGET=2048 conductor-chat
//!
//! # With verbose logging (stderr)
//! RUST_LOG=debug conductor-chat
//! ```
//!
//! # Commands
//!
//! - `/models`: List backend models
//! - `/model NAME`: Switch model
//! - `/analyze TYPE [TEXT]`: Analyze TEXT, or the last message
//! - `/budget N`: Set the context budget and trim
//! - `/stats`: Conversation analytics
//! - `/transcript`: Print the conversation as markdown
//! - `/stop`: Cancel the current response
//! - `/restart`: Cancel and clear the conversation
//! - `/quit`: Exit
//!
//! Ctrl-C cancels a response in progress, or exits when idle.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use chat_conductor::{
    load_config, BackendClient, ChatEvent, Conductor, ConductorError, OllamaBackend,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging (stderr, so stdout stays the transcript)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chat_conductor=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let config = load_config()?;
    info!(model = %config.model, budget = config.context_budget, "Starting Conductor Chat");

    let backend = OllamaBackend::new(config.backend.clone())?;
    if !backend.health_check().await {
        warn!(url = %config.backend.base_url(), "Backend is not reachable yet");
    }

    let (tx, mut rx) = mpsc::channel(config.event_buffer);
    let mut conductor = Conductor::new(backend, config, tx);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let generating = conductor.is_generating();

        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !handle_line(&mut conductor, line.trim()).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
            Some(_) = conductor.next_event(), if generating => {}
            _ = tokio::signal::ctrl_c() => {
                if !generating {
                    break;
                }
                conductor.cancel_generation().await;
            }
        }

        render(&mut rx);
    }

    conductor.shutdown().await;
    render(&mut rx);
    Ok(())
}

/// Handle one line of input; returns false to quit
async fn handle_line(conductor: &mut Conductor<OllamaBackend>, line: &str) -> bool {
    let (command, rest) = match line.split_once(' ') {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    let result = match command {
        "" => Ok(()),
        "/quit" | "/exit" => return false,
        "/stop" => {
            conductor.cancel_generation().await;
            Ok(())
        }
        "/restart" => {
            conductor.restart_chat().await;
            println!("[conversation cleared]");
            Ok(())
        }
        "/models" => conductor.list_models().await.map(|models| {
            for model in models {
                println!("  {model}");
            }
        }),
        "/model" if !rest.is_empty() => {
            conductor.set_model(rest);
            Ok(())
        }
        "/budget" => match rest.parse::<usize>() {
            Ok(budget) => conductor.trim(budget).map(|removed| {
                println!("[budget {budget}, removed {removed} messages]");
            }),
            Err(_) => {
                println!("usage: /budget N (N > 0)");
                Ok(())
            }
        },
        "/stats" => {
            let stats = conductor.conversation().analytics();
            println!(
                "messages: {} (user {}, assistant {}), estimated tokens: {}, context budget: {}, decode anomalies: {}",
                stats.total_messages,
                stats.user_messages,
                stats.assistant_messages,
                stats.estimated_tokens,
                stats.context_budget,
                conductor.decode_anomalies(),
            );
            Ok(())
        }
        "/transcript" => {
            println!("{}", conductor.conversation().to_markdown());
            Ok(())
        }
        "/analyze" if !rest.is_empty() => {
            let (analysis, text) = match rest.split_once(' ') {
                Some((analysis, text)) => (analysis, Some(text)),
                None => (rest, None),
            };
            conductor
                .request_analysis(analysis, text)
                .await
                .map(|_| print!("Assistant: "))
        }
        _ if command.starts_with('/') => {
            println!("unknown command: {command}");
            Ok(())
        }
        _ => conductor.send_message(line).await.map(|_| print!("Assistant: ")),
    };

    if let Err(e) = result {
        report(&e);
    }
    let _ = std::io::stdout().flush();
    true
}

fn report(e: &ConductorError) {
    match e {
        ConductorError::NothingToAnalyze
        | ConductorError::EmptyMessage
        | ConductorError::InvalidBudget => println!("[{e}]"),
        _ => error!(error = %e, "Command failed"),
    }
}

/// Print everything the Conductor has emitted so far
fn render(rx: &mut mpsc::Receiver<ChatEvent>) {
    let mut stdout = std::io::stdout();
    while let Ok(event) = rx.try_recv() {
        match event {
            ChatEvent::Fragment { text, .. } => {
                let _ = write!(stdout, "{text}");
            }
            ChatEvent::Completed { .. } => {
                let _ = writeln!(stdout);
            }
            ChatEvent::Failed { error, .. } => {
                let _ = writeln!(stdout);
                eprintln!("An error occurred: {error}");
            }
            ChatEvent::Cancelled { .. } => {
                let _ = writeln!(stdout, "\n[cancelled]");
            }
        }
    }
    let _ = stdout.flush();
}
