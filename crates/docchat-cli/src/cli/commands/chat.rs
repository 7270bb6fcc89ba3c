//! Chat and history commands.

use std::path::PathBuf;

use anyhow::Result;
use docchat_types::{ExportFormat, HistoryQuery, Sender};

use super::print_json;
use crate::cli::App;

pub async fn send(app: &App, chatbot_id: &str, message: &str) -> Result<()> {
    let reply = app.client.chatbots().chat(chatbot_id, message).await?;
    if app.json {
        return print_json(&reply);
    }
    println!("{}", reply.response);
    if !reply.sources.is_empty() {
        println!();
        println!("Sources: {}", reply.sources.join(", "));
    }
    tracing::debug!(
        model = %reply.model,
        processing_time_ms = reply.processing_time,
        "Chat reply"
    );
    Ok(())
}

pub async fn history(app: &App, chatbot_id: &str, query: &HistoryQuery) -> Result<()> {
    let page = app.client.chatbots().history(chatbot_id, query).await?;
    if app.json {
        return print_json(&page);
    }
    if page.messages.is_empty() {
        println!("No messages.");
        return Ok(());
    }
    for message in &page.messages {
        let who = match message.sender {
            Sender::User => "user",
            Sender::Bot => "bot",
        };
        println!(
            "[{}] {who}: {}",
            message.timestamp.format("%Y-%m-%d %H:%M"),
            message.text
        );
    }
    println!(
        "-- page {} of {} ({} messages)",
        page.page, page.total_pages, page.total
    );
    Ok(())
}

pub async fn export(
    app: &App,
    chatbot_id: &str,
    format: ExportFormat,
    dir: Option<PathBuf>,
) -> Result<()> {
    let dir = dir.unwrap_or_else(|| app.config.download_dir());
    let written = app
        .client
        .chatbots()
        .export_history(chatbot_id, format, &dir)
        .await?;
    println!("✓ Saved {}", written.display());
    Ok(())
}
