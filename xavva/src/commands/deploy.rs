use std::sync::Arc;

use tokio::sync::mpsc;

use crate::browser::{BrowserControl, NoBrowser, SystemBrowser};
use crate::config::CliOverrides;
use crate::orchestrator::Orchestrator;
use crate::output;
use crate::watch::{ChangeWatcher, CycleRunner, watch_loop};

use super::load_config;

const EVENT_BUFFER: usize = 256;

pub async fn run(overrides: &CliOverrides, watch: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(overrides)?;
    // Headless runs (CI, piped output) never pop a browser.
    let browser: Arc<dyn BrowserControl> = if output::is_interactive() {
        Arc::new(SystemBrowser)
    } else {
        Arc::new(NoBrowser)
    };
    let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&config), browser));
    orchestrator.print_summary(watch).await;

    if watch {
        run_watching(orchestrator, config.project_dir.clone()).await
    } else {
        run_once(orchestrator).await
    }
}

/// Deploy, then keep Tomcat in the foreground until it exits or Ctrl+C.
async fn run_once(orchestrator: Arc<Orchestrator>) -> Result<(), Box<dyn std::error::Error>> {
    orchestrator.execute(false, false).await?;

    let server = Arc::clone(orchestrator.server());
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

/// Initial deploy, then rebuild on change until Ctrl+C. Cycle failures are
/// reported and the watcher keeps going.
async fn run_watching(
    orchestrator: Arc<Orchestrator>,
    project_dir: std::path::PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = project_dir.canonicalize().unwrap_or(project_dir);

    {
        let _guard = orchestrator.try_begin();
        if let Err(e) = orchestrator.execute(false, true).await {
            output::error(&e.to_string());
            output::muted("Fix the problem and save a file to retry");
        }
    }

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let _watcher = ChangeWatcher::new(root.clone(), tx).start()?;
    output::step("Watching for changes (Ctrl+C to stop)");

    tokio::select! {
        _ = watch_loop(Arc::clone(&orchestrator), root, rx) => {}
        _ = tokio::signal::ctrl_c() => {
            println!();
        }
    }

    output::step("Stopping Tomcat");
    orchestrator.server().stop().await;
    Ok(())
}
