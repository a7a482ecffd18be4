//! `spurchat history` — Print a stored conversation straight from the store.

use spurchat_core::message::{ConversationId, Message};
use spurchat_gateway::chat_api::{HistoryResponse, MessageDto};
use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    session_id: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let store = spurchat_gateway::open_store(&config.store).await?;

    let id = ConversationId::from(session_id);
    let conversation = store.get_conversation(&id).await?;
    let messages = store.list_messages(&id).await?;

    if json {
        let body = HistoryResponse {
            history: messages.into_iter().map(MessageDto::from).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let Some(conversation) = conversation else {
        println!("No conversation with id {session_id}");
        return Ok(());
    };

    println!(
        "{} — started {} ({} messages)\n",
        conversation.title,
        conversation.created_at.format("%Y-%m-%d %H:%M UTC"),
        messages.len()
    );
    for message in &messages {
        print!("{}", render(message));
    }

    Ok(())
}

fn render(message: &Message) -> String {
    let mut out = String::new();
    let stamp = message.created_at.format("%H:%M:%S");
    for (i, line) in message.content.lines().enumerate() {
        if i == 0 {
            out.push_str(&format!("[{stamp}] {:>9} > {line}\n", message.role.as_str()));
        } else {
            out.push_str(&format!("{:>22}{line}\n", ""));
        }
    }
    if message.content.is_empty() {
        out.push_str(&format!("[{stamp}] {:>9} >\n", message.role.as_str()));
    }
    out
}
