//! `spurchat chat` — Terminal client for a running SpurChat server.
//!
//! Remembers the last session id in `~/.spurchat/session` so a restart picks
//! the conversation back up, and replays its history on start.

use spurchat_config::AppConfig;
use spurchat_core::message::Role;
use spurchat_gateway::chat_api::{ErrorResponse, HistoryResponse, MessageDto, SendMessageResponse};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// HTTP client for the chat endpoints.
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn send(
        &self,
        message: &str,
        session_id: Option<&str>,
    ) -> Result<SendMessageResponse, String> {
        let mut body = serde_json::json!({ "message": message });
        if let Some(id) = session_id {
            body["sessionId"] = serde_json::json!(id);
        }

        let response = self
            .http
            .post(format!("{}/chat/message", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Failed to reach server: {e}"))?;

        decode(response).await
    }

    pub async fn history(&self, session_id: &str) -> Result<Vec<MessageDto>, String> {
        let response = self
            .http
            .get(format!("{}/chat/{session_id}", self.base_url))
            .send()
            .await
            .map_err(|e| format!("Failed to reach server: {e}"))?;

        decode::<HistoryResponse>(response).await.map(|h| h.history)
    }
}

/// Success bodies decode as `T`; failures surface the server's `error` text.
async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, String> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| format!("Unexpected response: {e}"));
    }

    match response.json::<ErrorResponse>().await {
        Ok(body) => Err(body.error),
        Err(_) => Err(format!("Server returned {status}")),
    }
}

// --- Session file ---

pub fn session_file() -> PathBuf {
    AppConfig::config_dir().join("session")
}

pub fn load_session(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn save_session(path: &Path, session_id: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, session_id)
}

pub fn clear_session(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Default server URL from the gateway config. A wildcard bind address is
/// reached through loopback.
fn default_url(config: &AppConfig) -> String {
    let host = match config.gateway.host.as_str() {
        "0.0.0.0" | "::" => "127.0.0.1",
        host => host,
    };
    format!("http://{host}:{}", config.gateway.port)
}

fn print_assistant(text: &str) {
    for line in text.lines() {
        println!("  Assistant > {line}");
    }
    println!();
}

fn print_error(error: &str) {
    println!("  Assistant > ⚠️ Error: {error}");
    println!();
}

pub async fn run(
    config_path: Option<&Path>,
    message: Option<String>,
    new_session: bool,
    url: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let base_url = url.unwrap_or_else(|| default_url(&config));
    // Replies wait on the provider, so allow its full timeout plus slack.
    let client = ChatClient::new(&base_url, Duration::from_secs(config.request_timeout_secs + 10));

    let session_path = session_file();
    if new_session {
        clear_session(&session_path)?;
    }
    let mut session_id = load_session(&session_path);
    tracing::debug!(url = %base_url, session = ?session_id, "Chat client starting");

    if let Some(msg) = message {
        // Single message mode
        let reply = client.send(&msg, session_id.as_deref()).await?;
        save_session(&session_path, &reply.session_id)?;
        println!("{}", reply.reply);
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║        Spur Mart Support — SpurChat          ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Server:  {base_url}");
    println!("  Type your message and press Enter.");
    println!("  Type '/new' for a fresh conversation, 'exit' to quit.");
    println!();

    if let Some(id) = &session_id {
        match client.history(id).await {
            Ok(history) if !history.is_empty() => {
                println!("  (resuming session {id})");
                println!();
                for entry in history {
                    match entry.role {
                        Role::User => println!("  You > {}", entry.content),
                        _ => print_assistant(&entry.content),
                    }
                }
            }
            Ok(_) => {}
            Err(e) => print_error(&format!("Could not load history: {e}")),
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();

        match text {
            "" => continue,
            "exit" | "quit" => break,
            "/new" => {
                clear_session(&session_path)?;
                session_id = None;
                println!("  (started a new conversation)");
                println!();
                continue;
            }
            _ => {}
        }

        eprint!("  ...");
        let result = client.send(&line, session_id.as_deref()).await;
        eprint!("\r     \r");

        match result {
            Ok(reply) => {
                if session_id.as_deref() != Some(reply.session_id.as_str()) {
                    tracing::debug!(session = %reply.session_id, "Server assigned a new session");
                    save_session(&session_path, &reply.session_id)?;
                    session_id = Some(reply.session_id);
                }
                println!();
                print_assistant(&reply.reply);
            }
            Err(e) => print_error(&e),
        }
    }

    println!();
    println!("  Goodbye! 👋");
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use spurchat_chat::{ChatService, ContextAssembler, ReplyGenerator};
    use spurchat_config::GatewayConfig;
    use spurchat_core::error::ProviderError;
    use spurchat_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use spurchat_gateway::GatewayState;
    use spurchat_store::InMemoryStore;
    use std::sync::Arc;

    struct Canned;

    #[async_trait]
    impl Provider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                content: "Our hours are Monday to Friday, 9 to 5 EST.".into(),
                usage: None,
                model: request.model,
            })
        }
    }

    async fn spawn_server() -> String {
        let chat = ChatService::new(
            Arc::new(InMemoryStore::new()),
            ContextAssembler::default(),
            ReplyGenerator::new(Arc::new(Canned), "gpt-4o"),
        );
        let app = spurchat_gateway::build_router(
            GatewayState::new(Arc::new(chat)),
            &GatewayConfig::default(),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn session_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session");

        assert!(load_session(&path).is_none());
        save_session(&path, "abc-123").unwrap();
        assert_eq!(load_session(&path).as_deref(), Some("abc-123"));

        clear_session(&path).unwrap();
        assert!(load_session(&path).is_none());
        // Clearing twice is fine
        clear_session(&path).unwrap();
    }

    #[test]
    fn wildcard_host_uses_loopback() {
        let mut config = AppConfig::default();
        config.gateway.host = "0.0.0.0".into();
        config.gateway.port = 8080;
        assert_eq!(default_url(&config), "http://127.0.0.1:8080");
    }

    #[tokio::test]
    async fn client_sends_and_reads_history() {
        let client = ChatClient::new(spawn_server().await, Duration::from_secs(5));

        let first = client.send("What are your hours?", None).await.unwrap();
        assert!(first.reply.contains("9 to 5"));

        let second = client
            .send("Thanks!", Some(&first.session_id))
            .await
            .unwrap();
        assert_eq!(second.session_id, first.session_id);

        let history = client.history(&first.session_id).await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "What are your hours?");
    }

    #[tokio::test]
    async fn client_surfaces_server_error_text() {
        let client = ChatClient::new(spawn_server().await, Duration::from_secs(5));
        let err = client.send("   ", None).await.unwrap_err();
        assert_eq!(err, "Message cannot be empty");
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error() {
        let client = ChatClient::new("http://127.0.0.1:9", Duration::from_secs(2));
        let err = client.send("hello", None).await.unwrap_err();
        assert!(err.starts_with("Failed to reach server"));
    }
}
