//! `nimbus chat` -- interactive terminal chat.

use std::io::{BufRead, Write};
use std::sync::Arc;

use nimbus_engine::Engine;

pub async fn run(
    config_path: Option<&str>,
    session: Option<String>,
    user: Option<String>,
) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let engine = Arc::new(Engine::new(config)?);

    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    println!("nimbus chat (session {session_id})");
    println!("Type a message, or \"exit\" to quit.\n");

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        print!("you> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message == "exit" || message == "quit" {
            break;
        }

        match engine
            .chat(Some(&session_id), user.as_deref(), message)
            .await
        {
            Ok(outcome) => {
                println!("{} ({})\n", outcome.message.content, outcome.model);
            }
            Err(e) => eprintln!("error: {e}\n"),
        }
    }

    Ok(())
}
