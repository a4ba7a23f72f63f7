//! CLI commands built on the sync engine

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::auth;
use crate::config::Config;
use crate::engine::{OutgoingMessage, SyncEngine};
use crate::events::SyncEvent;
use crate::models::{format_timestamp, Call};
use crate::push::WsTransport;
use crate::reconcile;

fn engine() -> Result<SyncEngine> {
    let config = Config::load()?;
    let client = auth::client(&config)?;
    Ok(SyncEngine::new(Arc::new(client), config.engine_settings()?))
}

fn describe_call(call: &Call) -> String {
    format!(
        "#{} [{}] {} via {} | dept: {} | agent: {} | opened {}",
        call.id,
        call.status,
        call.contact.name,
        call.connection.account_name,
        call.department.as_ref().map_or("-", |d| d.name.as_str()),
        call.agent.as_ref().map_or("-", |a| a.name.as_str()),
        format_timestamp(call.started_at),
    )
}

/// One line per event for the `watch` output.
fn describe_event(event: &SyncEvent) -> String {
    match event {
        SyncEvent::Message(msg) => format!(
            "[{}] {} {} (call #{}, {}): {}",
            format_timestamp(msg.sent_at),
            if msg.sent { "to" } else { "from" },
            msg.contact.name,
            msg.call.id,
            msg.chat_type,
            msg.body.as_deref().unwrap_or("<media>"),
        ),
        SyncEvent::CallAgentChanged { previous, updated } => format!(
            "call #{} agent: {} -> {}",
            updated.id,
            previous.agent.as_ref().map_or("-", |a| a.name.as_str()),
            updated.agent.as_ref().map_or("-", |a| a.name.as_str()),
        ),
        SyncEvent::CallDepartmentChanged { previous, updated } => format!(
            "call #{} department: {} -> {}",
            updated.id,
            previous.department.as_ref().map_or("-", |d| d.name.as_str()),
            updated.department.as_ref().map_or("-", |d| d.name.as_str()),
        ),
        SyncEvent::CallStatusChanged { previous, updated } => format!(
            "call #{} status: {} -> {}",
            updated.id, previous.status, updated.status
        ),
        SyncEvent::NewCall(call) => format!("new call {}", describe_call(call)),
        SyncEvent::ConnectionOpened => "push connection opened".to_string(),
    }
}

/// Reload, then print every event until Ctrl+C.
pub async fn watch() -> Result<()> {
    let mut engine = engine()?;
    engine.load_all().await.context("Initial load failed")?;

    let mut events = engine.subscribe();
    engine.start(Arc::new(WsTransport));
    println!("Watching for events. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => println!("{:<24} {}", event.kind(), describe_event(&event)),
                Err(RecvError::Lagged(n)) => tracing::warn!("Dropped {} events", n),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
                break;
            }
        }
    }

    engine.stop().await;
    Ok(())
}

pub async fn list_calls(id: Option<i64>) -> Result<()> {
    let engine = engine()?;
    engine.load_all().await?;

    let calls = match id {
        Some(id) => vec![(*engine.get_call(id).await?).clone()],
        None => engine.fetch_calls(reconcile::window_query()).await?,
    };

    if calls.is_empty() {
        println!("No calls.");
    }
    for call in &calls {
        println!("{}", describe_call(call));
    }
    Ok(())
}

pub async fn send(to: String, text: String, connection_id: Option<i64>) -> Result<()> {
    let engine = engine()?;
    engine.load_all().await?;
    engine
        .send_message(OutgoingMessage {
            to,
            text,
            connection_id,
            ..Default::default()
        })
        .await?;
    println!("Message sent.");
    Ok(())
}

pub async fn transfer(call_id: i64, department_id: i64, agent_id: Option<i64>) -> Result<()> {
    engine()?
        .transfer_call(call_id, department_id, agent_id)
        .await?;
    println!("Call #{} transferred.", call_id);
    Ok(())
}

pub async fn close(call_id: i64, silent: bool) -> Result<()> {
    engine()?.close_call(call_id, silent).await?;
    println!("Call #{} closed.", call_id);
    Ok(())
}

pub async fn contact_info(phone: &str) -> Result<()> {
    let info = engine()?.fetch_contact_info(phone).await?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

pub async fn register_contact(phone: &str, name: &str) -> Result<()> {
    engine()?.register_contact_name(phone, name).await?;
    println!("Contact {} saved as {}.", phone, name);
    Ok(())
}

pub async fn media(message_id: i64, out: &Path) -> Result<()> {
    let media = engine()?.fetch_media(message_id).await?;
    std::fs::write(out, &media.bytes)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    println!(
        "Saved {} bytes ({}) to {}",
        media.bytes.len(),
        media.content_type,
        out.display()
    );
    Ok(())
}
