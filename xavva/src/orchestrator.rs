//! Build → deploy → start sequencing, shared by one-shot and watch mode.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;

use crate::browser::BrowserControl;
use crate::build::{BuildError, BuildRunner, DeployError, Deployer};
use crate::config::{AppConfig, ConfigError};
use crate::health::{self, HEALTH_SETTLE_DELAY};
use crate::java;
use crate::output;
use crate::server::{ReadySignal, ServerController, ServerError};
use crate::watch::CycleRunner;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Single-slot "a cycle is running" flag.
#[derive(Debug, Clone, Default)]
pub struct CycleSlot(Arc<AtomicBool>);

impl CycleSlot {
    pub fn try_acquire(&self) -> Option<CycleGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard(Arc::clone(&self.0)))
    }

    #[cfg(test)]
    fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Frees the slot when dropped, whatever the cycle's outcome.
#[derive(Debug)]
pub struct CycleGuard(Arc<AtomicBool>);

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Orchestrator {
    config: Arc<AppConfig>,
    server: Arc<ServerController>,
    builder: BuildRunner,
    deployer: Deployer,
    browser: Arc<dyn BrowserControl>,
    slot: CycleSlot,
    opened: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(config: Arc<AppConfig>, browser: Arc<dyn BrowserControl>) -> Self {
        Self {
            server: Arc::new(ServerController::new(Arc::clone(&config))),
            builder: BuildRunner::new(Arc::clone(&config)),
            deployer: Deployer::new(Arc::clone(&config)),
            config,
            browser,
            slot: CycleSlot::default(),
            opened: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn server(&self) -> &Arc<ServerController> {
        &self.server
    }

    pub async fn print_summary(&self, watching: bool) {
        let config = &self.config;
        output::section("xavva");
        output::info("project", config.project_dir.display());
        output::info("build tool", config.project.build_tool);
        match &config.tomcat.path {
            Some(path) => output::info("tomcat", path.display()),
            None => output::info("tomcat", output::brand_warning("not configured")),
        }
        output::info("port", config.tomcat.port);
        if let Some(profile) = &config.project.profile {
            output::info("profile", profile);
        }
        output::info("watch", on_off(watching));
        output::info("debug", on_off(config.project.debug));

        let hot_reload = if watching || config.project.debug {
            match java::detect().await {
                Some(jvm) => format!("{} (Java {})", jvm.hot_reload_level(), jvm.version),
                None => "unavailable (no JVM found)".to_string(),
            }
        } else {
            "off".to_string()
        };
        output::info("hot reload", hot_reload);
        println!();
    }

    /// Run one cycle. `incremental` compiles and syncs into the running
    /// server; otherwise build, deploy and (re)start.
    pub async fn execute(&self, incremental: bool, watching: bool) -> Result<(), CycleError> {
        if incremental {
            self.hot_deploy(watching).await
        } else {
            self.full_deploy(watching).await
        }
    }

    async fn full_deploy(&self, watching: bool) -> Result<(), CycleError> {
        self.server.stop().await;
        self.server.kill_conflict().await?;

        if self.config.project.skip_build {
            output::muted("Skipping build");
        } else {
            self.builder.run_build(false).await?;
        }

        let deployer = self.deployer.clone();
        let artifact = tokio::task::spawn_blocking(move || deployer.deploy_to_webapps()).await??;
        tracing::info!(war = %artifact.path.display(), context = %artifact.context_path, "Deployed");
        output::success(&format!(
            "Deployed {} to /{}",
            artifact.file_name, artifact.context_path
        ));

        let ready = self.server.start(watching).await?;
        self.follow_readiness(ready, artifact.context_path);
        Ok(())
    }

    async fn hot_deploy(&self, watching: bool) -> Result<(), CycleError> {
        output::step("Change detected, recompiling");
        self.builder.run_build(true).await?;

        let deployer = self.deployer.clone();
        match tokio::task::spawn_blocking(move || deployer.sync_classes()).await?? {
            Some(app) => {
                output::success(&format!("Classes synced into /{app}"));
                self.browser.reload();
                Ok(())
            }
            None => {
                output::warning("No exploded app in webapps yet, running a full deploy");
                self.full_deploy(watching).await
            }
        }
    }

    /// After readiness and the settle delay, probe the app and report.
    fn follow_readiness(&self, ready: ReadySignal, context: String) {
        let url = self.config.app_url(&context);
        let server = Arc::clone(&self.server);
        let browser = Arc::clone(&self.browser);
        let opened = Arc::clone(&self.opened);
        tokio::spawn(async move {
            if ready.await.is_err() {
                tracing::info!("Server exited before becoming ready");
                return;
            }
            tokio::time::sleep(HEALTH_SETTLE_DELAY).await;
            match health::probe(&url).await {
                Ok(status) => {
                    output::success(&format!("App is up at {}", output::brand_accent(&url)));
                    output::info("status", status);
                    output::info("memory", server.memory_usage());
                    if !opened.swap(true, Ordering::SeqCst) {
                        browser.open(&url);
                    }
                }
                Err(e) => {
                    output::warning(&format!("Health check failed: {e}"));
                    output::muted("The server keeps running; the app may still be initialising");
                }
            }
        });
    }
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

#[async_trait]
impl CycleRunner for Orchestrator {
    fn try_begin(&self) -> Option<CycleGuard> {
        self.slot.try_acquire()
    }

    async fn incremental_cycle(&self, guard: CycleGuard) -> Result<(), CycleError> {
        let _guard = guard;
        self.execute(true, true).await
    }

    async fn sync_resource(&self, guard: CycleGuard, path: PathBuf) -> Result<(), CycleError> {
        let _guard = guard;
        let deployer = self.deployer.clone();
        let synced = tokio::task::spawn_blocking(move || deployer.sync_resource(&path)).await??;
        if let Some(sync) = synced {
            output::success(&format!("Synced {}", sync.target.display()));
            match sync.url {
                Some(url) => output::muted(&format!("  {url}")),
                None => output::muted("  not served directly"),
            }
            self.browser.reload();
        }
        Ok(())
    }
}
