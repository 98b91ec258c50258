//! `stepwise init`: Create the config directory and a default config file.

use stepwise_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("  Config file exists: {}", config_path.display());
        return Ok(());
    }

    let content = toml::to_string_pretty(&AppConfig::default())?;
    std::fs::write(&config_path, content)?;
    println!("✅ Wrote default config: {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  stepwise macro create --name login --file login.json");
    println!("  stepwise macro run <id>");
    Ok(())
}
