pub mod audit;
pub mod build;
pub mod deploy;
pub mod doctor;
pub mod init;
pub mod logs;
pub mod run;
pub mod start;

use std::env::current_dir;
use std::sync::Arc;

use crate::config::{AppConfig, CliOverrides};

/// Resolve settings for the project in the working directory.
pub(crate) fn load_config(
    overrides: &CliOverrides,
) -> Result<Arc<AppConfig>, Box<dyn std::error::Error>> {
    let project_dir = current_dir()?;
    Ok(Arc::new(AppConfig::load(&project_dir, overrides)?))
}
