//! `stepwise macro`: Manage and replay macros.

use std::path::Path;
use stepwise_core::{MacroSettings, MacroStatus};

use super::{open_api, read_steps};
use crate::commands::session::print_session;

pub async fn list() -> Result<(), Box<dyn std::error::Error>> {
    let api = open_api().await?;
    let macros = api.list_macros().await?;

    if macros.is_empty() {
        println!("📋 No macros yet.");
        println!();
        println!("   Create one with:");
        println!("   stepwise macro create --name login --file login.json");
        return Ok(());
    }

    println!("📋 Macros ({}):", macros.len());
    println!("{:-<72}", "");
    for m in &macros {
        let status = match m.status {
            MacroStatus::Active => "✅",
            MacroStatus::Draft => "📝",
        };
        println!(
            "  {status} {:<36} {:<20} {} steps ×{} @{}",
            m.id,
            m.name,
            m.steps.len(),
            m.settings.loops,
            m.settings.speed
        );
    }
    Ok(())
}

pub async fn show(id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let api = open_api().await?;
    let m = api.get_macro(id).await?;

    println!("{} ({})", m.name, m.id);
    if !m.description.is_empty() {
        println!("  {}", m.description);
    }
    println!(
        "  status: {:?}, speed: {}, loops: {}, continue on error: {}",
        m.status, m.settings.speed, m.settings.loops, m.settings.continue_on_error
    );
    for (i, step) in m.steps.iter().enumerate() {
        println!("  {i:>3}. {step}");
    }
    Ok(())
}

pub async fn create(
    name: &str,
    description: &str,
    file: &Path,
    speed: Option<f64>,
    loops: Option<u32>,
    continue_on_error: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let steps = read_steps(file)?;
    let settings = MacroSettings {
        continue_on_error,
        ..MacroSettings::default().with_overrides(speed, loops)
    };

    let api = open_api().await?;
    let m = api.create_macro(name, description, steps, settings).await?;
    println!("✅ Created macro '{}' ({}) with {} steps", m.name, m.id, m.steps.len());
    Ok(())
}

pub async fn delete(id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let api = open_api().await?;
    api.delete_macro(id).await?;
    println!("✅ Deleted macro {id}");
    Ok(())
}

/// Replays in-process, so the command waits for the session to finish.
pub async fn run(
    id: &str,
    speed: Option<f64>,
    loops: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let api = open_api().await?;
    let session_id = api.execute_macro(id, speed, loops).await?;
    println!("▶️  Session {session_id} queued");

    let session = api.wait_for_session(&session_id).await?;
    print_session(&session);
    Ok(())
}
