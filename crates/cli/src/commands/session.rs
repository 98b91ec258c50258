//! `stepwise session`: Inspect execution sessions.

use chrono::{Duration, Utc};
use stepwise_core::{ExecutionSession, SessionStatus};

use super::open_api;

pub async fn list() -> Result<(), Box<dyn std::error::Error>> {
    let api = open_api().await?;
    let mut sessions = api.list_sessions().await?;
    sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    if sessions.is_empty() {
        println!("No sessions recorded.");
        return Ok(());
    }
    for s in &sessions {
        let mode = format!("{:?}", s.mode).to_lowercase();
        println!(
            "  {:<36} {:<17} {:<10} {}",
            s.id,
            s.status.as_str(),
            mode,
            s.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

pub async fn show(id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let api = open_api().await?;
    let session = api.get_session(id).await?;
    print_session(&session);
    for entry in &session.logs {
        let step = entry
            .step_index
            .map(|i| format!(" [step {i}]"))
            .unwrap_or_default();
        let level = format!("{:?}", entry.level).to_uppercase();
        println!(
            "    {} {level:<5}{step} {}",
            entry.timestamp.format("%H:%M:%S%.3f"),
            entry.message
        );
    }
    Ok(())
}

pub async fn purge(older_than_days: i64) -> Result<(), Box<dyn std::error::Error>> {
    let api = open_api().await?;
    let cutoff = Utc::now() - Duration::days(older_than_days);
    let removed = api.purge_sessions(cutoff).await?;
    println!("🧹 Removed {removed} finished sessions");
    Ok(())
}

pub(crate) fn print_session(session: &ExecutionSession) {
    let marker = match session.status {
        SessionStatus::Succeeded => "✅",
        SessionStatus::Failed => "❌",
        SessionStatus::Cancelled => "⏹️ ",
        _ => "⏳",
    };
    println!("{marker} Session {}: {}", session.id, session.status);
    if let Some(summary) = &session.summary {
        println!("   {summary}");
    }
    if let Some(failure) = &session.failure {
        println!("   error: {}", failure.error);
        if let Some(i) = failure.step_index {
            println!("   at step {i} (loop {})", failure.loop_index + 1);
        }
        for attempt in &failure.trail {
            println!("   recovery #{} {}: {}", attempt.attempt, attempt.strategy, attempt.error);
        }
    }
}
