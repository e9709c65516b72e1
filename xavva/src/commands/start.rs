use std::sync::Arc;

use crate::config::CliOverrides;
use crate::output;
use crate::server::ServerController;

use super::load_config;

/// Start Tomcat with whatever is already deployed.
pub async fn run(overrides: &CliOverrides) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(overrides)?;
    let server = Arc::new(ServerController::new(Arc::clone(&config)));

    output::section("Tomcat");
    server.kill_conflict().await?;
    let ready = server.start(false).await?;

    let url = config.base_url();
    tokio::spawn(async move {
        if ready.await.is_ok() {
            output::success(&format!("Tomcat ready at {}", output::brand_accent(&url)));
        }
    });

    output::muted("Press Ctrl+C to stop Tomcat");
    tokio::select! {
        _ = server.wait() => {
            output::warning("Tomcat stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            println!();
            output::step("Stopping Tomcat");
        }
    }
    server.stop().await;
    Ok(())
}
