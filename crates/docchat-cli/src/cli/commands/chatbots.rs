//! Chatbot management commands.

use anyhow::Result;
use docchat_types::{AnalyticsPeriod, Chatbot, ChatbotForm, ChatbotPatch, SettingsPatch};

use super::print_json;
use crate::cli::App;

fn print_chatbot_line(bot: &Chatbot) {
    let state = if bot.is_active { "active" } else { "inactive" };
    println!("{}  {}  {state}", bot.id, bot.name);
}

pub async fn list(app: &App) -> Result<()> {
    let bots = app.client.chatbots().list().await?;
    if app.json {
        return print_json(&bots);
    }
    if bots.is_empty() {
        println!("No chatbots yet. Create one with `docchat chatbots create <name>`.");
    }
    for bot in &bots {
        print_chatbot_line(bot);
    }
    Ok(())
}

pub async fn show(app: &App, id: &str) -> Result<()> {
    let bot = app.client.chatbots().get(id).await?;
    if app.json {
        return print_json(&bot);
    }
    print_chatbot_line(&bot);
    if let Some(description) = &bot.description {
        println!("  {description}");
    }
    println!("  created {}", bot.created_at.format("%Y-%m-%d %H:%M"));
    if let Some(documents) = &bot.documents {
        println!("  {} document(s)", documents.len());
    }
    Ok(())
}

pub async fn create(app: &App, name: String, description: Option<String>) -> Result<()> {
    let bot = app
        .client
        .chatbots()
        .create(&ChatbotForm { name, description })
        .await?;
    if app.json {
        return print_json(&bot);
    }
    println!("✓ Created chatbot {} ({})", bot.name, bot.id);
    Ok(())
}

pub async fn update(
    app: &App,
    id: &str,
    name: Option<String>,
    description: Option<String>,
) -> Result<()> {
    if name.is_none() && description.is_none() {
        anyhow::bail!("Nothing to update: pass --name and/or --description");
    }
    let bot = app
        .client
        .chatbots()
        .update(id, &ChatbotPatch { name, description })
        .await?;
    println!("✓ Updated chatbot {}", bot.name);
    Ok(())
}

pub async fn delete(app: &App, id: &str) -> Result<()> {
    app.client.chatbots().delete(id).await?;
    println!("✓ Deleted chatbot {id}");
    Ok(())
}

pub async fn toggle(app: &App, id: &str) -> Result<()> {
    let bot = app.client.chatbots().toggle(id).await?;
    let state = if bot.is_active { "activated" } else { "deactivated" };
    println!("✓ {} {state}", bot.name);
    Ok(())
}

pub async fn clone(app: &App, id: &str, name: &str) -> Result<()> {
    let bot = app.client.chatbots().clone_chatbot(id, name).await?;
    println!("✓ Cloned into {} ({})", bot.name, bot.id);
    Ok(())
}

pub async fn embed(app: &App, id: &str) -> Result<()> {
    let code = app.client.chatbots().embed_code(id).await?;
    if app.json {
        return print_json(&code);
    }
    println!("Script:");
    println!("{}", code.embed_code);
    println!();
    println!("Iframe:");
    println!("{}", code.iframe_code);
    Ok(())
}

pub async fn settings(app: &App, id: &str) -> Result<()> {
    let settings = app.client.chatbots().settings(id).await?;
    print_json(&settings)
}

pub struct BehaviorOverrides {
    pub welcome_message: Option<String>,
    pub placeholder: Option<String>,
    pub max_messages: Option<u32>,
}

pub async fn configure(app: &App, id: &str, overrides: BehaviorOverrides) -> Result<()> {
    let BehaviorOverrides {
        welcome_message,
        placeholder,
        max_messages,
    } = overrides;
    if welcome_message.is_none() && placeholder.is_none() && max_messages.is_none() {
        anyhow::bail!("Nothing to update: pass --welcome-message, --placeholder or --max-messages");
    }

    let chatbots = app.client.chatbots();
    let mut behavior = chatbots.settings(id).await?.behavior;
    if let Some(welcome_message) = welcome_message {
        behavior.welcome_message = welcome_message;
    }
    if let Some(placeholder) = placeholder {
        behavior.placeholder = placeholder;
    }
    if let Some(max_messages) = max_messages {
        behavior.max_messages = max_messages;
    }

    let patch = SettingsPatch {
        behavior: Some(behavior),
        ..SettingsPatch::default()
    };
    chatbots.update_settings(id, &patch).await?;
    println!("✓ Settings saved");
    Ok(())
}

pub async fn analytics(app: &App, id: &str, period: AnalyticsPeriod) -> Result<()> {
    let analytics = app.client.chatbots().analytics(id, period).await?;
    if app.json {
        return print_json(&analytics);
    }
    println!("Last {period}:");
    println!("  messages      {}", analytics.total_messages);
    println!("  sessions      {}", analytics.total_sessions);
    println!("  avg. length   {:.1}", analytics.average_session_length);
    println!("  satisfaction  {:.1}", analytics.satisfaction_score);
    for question in &analytics.top_questions {
        println!("  {:>5}  {}", question.count, question.question);
    }
    Ok(())
}

pub async fn metrics(app: &App, id: &str) -> Result<()> {
    let metrics = app.client.chatbots().performance_metrics(id).await?;
    if app.json {
        return print_json(&metrics);
    }
    println!("  avg. response  {:.0} ms", metrics.average_response_time);
    println!("  messages       {}", metrics.total_messages);
    println!("  unique users   {}", metrics.unique_users);
    println!("  satisfaction   {:.1}", metrics.satisfaction_score);
    Ok(())
}

pub async fn test(app: &App, id: &str, message: &str) -> Result<()> {
    let result = app.client.chatbots().test_chatbot(id, message).await?;
    if app.json {
        return print_json(&result);
    }
    println!("{}", result.response);
    let verdict = if result.success { "ok" } else { "failed" };
    eprintln!("({verdict}, {:.0} ms)", result.processing_time);
    Ok(())
}
