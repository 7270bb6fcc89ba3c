//! CLI command handlers.

pub mod auth;
pub mod chat;
pub mod chatbots;
pub mod config;
pub mod documents;
pub mod health;

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use serde::Serialize;

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("encode JSON output")?;
    println!("{json}");
    Ok(())
}

/// Reads one line from stdin after printing `label`.
fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    let input = input.trim().to_string();
    if input.is_empty() {
        anyhow::bail!("No input provided");
    }
    Ok(input)
}

fn password_or_prompt(password: Option<String>) -> Result<String> {
    match password {
        Some(password) => Ok(password),
        None => prompt("Password: "),
    }
}
