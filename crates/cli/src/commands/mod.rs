pub mod goal;
pub mod init;
pub mod macros;
pub mod mine;
pub mod runner;
pub mod session;
pub mod status;

use std::error::Error;
use std::path::Path;
use stepwise_api::AutomationApi;
use stepwise_config::AppConfig;
use stepwise_core::Step;

pub(crate) fn load_config() -> Result<AppConfig, Box<dyn Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Facade over the configured store with the dry-run tool registry.
pub(crate) async fn open_api() -> Result<AutomationApi, Box<dyn Error>> {
    Ok(AutomationApi::builder(load_config()?).build().await?)
}

/// Read a JSON array of steps.
pub(crate) fn read_steps(path: &Path) -> Result<Vec<Step>, Box<dyn Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let steps: Vec<Step> = serde_json::from_str(&content)
        .map_err(|e| format!("{} is not a JSON array of steps: {e}", path.display()))?;
    Ok(steps)
}
