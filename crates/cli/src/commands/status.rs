//! `stepwise status`: Show system status.

use stepwise_config::AppConfig;

use super::open_api;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let api = open_api().await?;
    let status = api.status().await?;
    let config = api.config();

    println!("stepwise status");
    println!("===============");
    println!("  Config dir:   {}", AppConfig::config_dir().display());
    println!("  Store:        {}", status.store);
    if config.storage.backend == "sqlite" {
        println!("  Database:     {}", config.storage.resolved_path().display());
    }
    println!("  Macros:       {}", status.macros);
    println!("  Schedules:    {}", status.schedules);
    println!("  Queue depth:  {}", status.queue_depth);
    println!(
        "  Runner:       every {}s, last tick {}",
        status.runner.interval_sec,
        status
            .runner
            .last_tick
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".into())
    );

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file: run `stepwise init` first");
    }
    Ok(())
}
