//! Interactive chat with the studio assistant.
//!
//! Run with:
//! ```bash
//! export STUDIO_FUNCTIONS_URL="https://your-project.example.com"
//! export STUDIO_FUNCTIONS_KEY="your-publishable-key"
//! cargo run --example chat
//! ```
//!
//! Ctrl-C cancels the answer being streamed.

use std::io::Write;

use inkstream::providers::FunctionsClient;
use inkstream::session::ChatSession;
use inkstream::Role;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let session = ChatSession::new(FunctionsClient::from_env()?);

    // Print the growing answer as fragments arrive.
    let mut updates = session.subscribe();
    tokio::spawn(async move {
        let (mut index, mut printed) = (0, 0);
        while updates.changed().await.is_ok() {
            let conversation = updates.borrow_and_update().clone();
            if conversation.len() != index {
                (index, printed) = (conversation.len(), 0);
            }
            if let Some(last) = conversation.last().filter(|m| m.role == Role::Assistant) {
                print!("{}", last.content.get(printed..).unwrap_or_default());
                let _ = std::io::stdout().flush();
                printed = last.content.len();
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Ask the studio anything (empty line to quit).");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            break;
        }

        let cancel = CancellationToken::new();
        let on_ctrl_c = cancel.clone();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_ctrl_c.cancel();
            }
        });

        match session.send(&line, &cancel).await {
            Ok(outcome) if outcome.is_cancelled() => println!("\n[cancelled]"),
            Ok(_) => println!(),
            Err(e) => eprintln!("\nError: {}", e),
        }
        watcher.abort();
    }

    Ok(())
}
