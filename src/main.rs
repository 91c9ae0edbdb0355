//! Phoenix Chat inspector
//!
//! Reads conversations from the configured blob store and prints them as
//! JSON. Logs go to stderr so stdout stays machine-readable.

use phoenix_chat::{ChatConfig, ConversationStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: phoenix-chat <show|pending|delete> <key>";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "phoenix_chat=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(command), Some(key)) = (args.next(), args.next()) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let config = ChatConfig::from_env();
    if config.store_dir.is_none() {
        tracing::warn!(
            "{} not set; reading from an empty in-memory store",
            phoenix_chat::config::STORE_DIR_ENV
        );
    }
    let store = ConversationStore::from_config(&config);

    match command.as_str() {
        "show" => {
            let conversation = store.load(&key).await?;
            tracing::info!(
                key = %key,
                conversation_id = %conversation.id,
                messages = conversation.count(),
                "Loaded conversation"
            );
            println!("{}", serde_json::to_string_pretty(&conversation)?);
        }
        "pending" => {
            let conversation = store.load(&key).await?;
            let pending = conversation.pending_tool_calls();
            println!("{}", serde_json::to_string_pretty(&pending)?);
        }
        "delete" => store.delete(&key).await?,
        other => {
            eprintln!("unknown command: {other}\n{USAGE}");
            std::process::exit(2);
        }
    }

    Ok(())
}
