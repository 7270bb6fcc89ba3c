//! Document commands.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use anyhow::Result;
use docchat_core::api::{ProgressFn, UploadFile};

use super::print_json;
use crate::cli::App;

pub async fn list(app: &App, chatbot_id: &str) -> Result<()> {
    let documents = app.client.chatbots().documents(chatbot_id).await?;
    if app.json {
        return print_json(&documents);
    }
    if documents.is_empty() {
        println!("No documents.");
    }
    for doc in &documents {
        println!(
            "{}  {}  {} KB  {}  {} chunks",
            doc.id,
            doc.file_name,
            doc.file_size.div_ceil(1024),
            doc.status,
            doc.chunks_count
        );
    }
    Ok(())
}

pub async fn upload(app: &App, chatbot_id: &str, file: PathBuf) -> Result<()> {
    if !file.is_file() {
        anyhow::bail!("File not found: {}", file.display());
    }
    let upload = UploadFile::from_path(&file);
    let name = upload.file_name().to_string();

    let last = Arc::new(AtomicU8::new(u8::MAX));
    let label = name.clone();
    let progress: ProgressFn = Arc::new(move |pct| {
        // Chunks arrive far more often than the percentage changes.
        if last.swap(pct, Ordering::Relaxed) != pct {
            eprint!("\rUploading {label}... {pct:>3}%");
            let _ = io::stderr().flush();
        }
    });

    let result = app
        .client
        .chatbots()
        .upload_document(chatbot_id, upload, Some(progress))
        .await;
    eprintln!();
    let document = result?;

    if app.json {
        return print_json(&document);
    }
    println!("✓ Uploaded {} ({}), status: {}", name, document.id, document.status);
    Ok(())
}

pub async fn delete(app: &App, id: &str) -> Result<()> {
    app.client.chatbots().delete_document(id).await?;
    println!("✓ Deleted document {id}");
    Ok(())
}
