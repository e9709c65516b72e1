use crate::build::{BuildRunner, Deployer, stderr_excerpt};
use crate::config::CliOverrides;
use crate::output;

use super::load_config;

/// Full build, no deploy.
pub async fn run(overrides: &CliOverrides) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(overrides)?;
    output::section("Build");
    output::info("tool", config.project.build_tool);
    if let Some(profile) = &config.project.profile {
        output::info("profile", profile);
    }

    let runner = BuildRunner::new(config.clone());
    output::muted(&runner.command(false).display());
    let outcome = runner.run_build(false).await?;
    if outcome.success && !outcome.diagnostics.is_empty() {
        output::warning(&format!(
            "Build succeeded with {} line(s) on stderr",
            outcome.diagnostics.len()
        ));
        let (shown, rest) = stderr_excerpt(&outcome.diagnostics);
        for line in shown {
            output::muted(&format!("  {line}"));
        }
        if let Some(rest) = rest {
            output::muted(&format!("  {rest}"));
        }
    }

    match Deployer::new(config).find_artifact() {
        Ok(war) => output::info("artifact", war.display()),
        Err(e) => output::warning(&e.to_string()),
    }
    Ok(())
}
