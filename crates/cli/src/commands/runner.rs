//! `stepwise runner`: Start due schedules.

use tracing::info;

use super::open_api;

pub async fn tick() -> Result<(), Box<dyn std::error::Error>> {
    let api = open_api().await?;
    let report = api.tick().await?;

    println!(
        "⏱️  Tick: {} started, {} skipped, {} failed",
        report.started.len(),
        report.skipped.len(),
        report.failed.len()
    );
    for failure in &report.failed {
        println!("   ❌ {}: {}", failure.item_id, failure.reason);
    }

    // Sessions run in this process; let them finish before exiting.
    for started in &report.started {
        let session = api.wait_for_session(&started.session_id).await?;
        println!("   {} → {}", started.item_id, session.status);
    }
    Ok(())
}

pub async fn serve(interval: Option<u64>) -> Result<(), Box<dyn std::error::Error>> {
    let api = open_api().await?;
    let interval = interval.unwrap_or(api.config().runner.interval_secs);
    let state = api.start_runner(interval).await?;

    println!("⏱️  Runner started, ticking every {}s. Press Ctrl-C to stop.", state.interval_sec);
    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, stopping runner");

    api.stop_runner().await?;
    println!("Runner stopped.");
    Ok(())
}

pub async fn schedules() -> Result<(), Box<dyn std::error::Error>> {
    let api = open_api().await?;
    let items = api.list_schedules().await?;

    if items.is_empty() {
        println!("📋 No schedules. Add `[[schedules]]` entries to config.toml.");
        return Ok(());
    }
    println!("📋 Schedules ({}):", items.len());
    for item in &items {
        let enabled = if item.enabled { "✅" } else { "⏸️ " };
        let trigger = item.cron.as_deref().unwrap_or("once");
        let next = item
            .scheduled_for
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".into());
        println!("  {enabled} {:<24} {:<16} next: {next}", item.name, trigger);
    }
    Ok(())
}
