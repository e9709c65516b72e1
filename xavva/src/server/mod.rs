//! Tomcat process control
//!
//! Handles:
//! - Freeing the HTTP port from a foreign listener
//! - Preparing the HotswapAgent and computing `CATALINA_OPTS`
//! - Spawning `catalina run` and pumping its output
//! - Readiness signalling, stop and memory reporting

mod hotswap;
mod logs;
mod options;
mod port;

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use xavva_core::LogView;

use crate::config::{AppConfig, ConfigError};
use crate::java;
use crate::output;
use crate::paths;
use crate::process::{Stream, spawn_line_reader};

use hotswap::{ensure_agent, find_class_dirs, write_properties};
use options::{AgentSetup, LaunchPlan, catalina_opts};
use port::listening_pids;

pub use hotswap::{AGENT_VERSION, agent_file_name, is_usable};

/// Time a killed port holder gets to release the socket.
const PORT_RELEASE_WAIT: Duration = Duration::from_millis(1000);
/// How long a stopped server's output may keep draining.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Tomcat launch script not found at {0}")]
    ScriptNotFound(std::path::PathBuf),

    #[error("Port {port} is still in use: {reason}")]
    PortConflict { port: u16, reason: String },

    #[error("Failed to start Tomcat: {0}")]
    Spawn(#[source] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Ready,
}

/// Resolves once when this start observes the startup marker. Errors if the
/// process exits first.
pub type ReadySignal = oneshot::Receiver<()>;

/// One spawned server. Never reused across starts.
struct ServerHandle {
    pid: Option<u32>,
    stop_tx: watch::Sender<bool>,
    monitor: JoinHandle<()>,
}

/// Owns the single Tomcat child process.
pub struct ServerController {
    config: Arc<AppConfig>,
    current: Mutex<Option<ServerHandle>>,
    state: watch::Sender<ServerState>,
}

impl ServerController {
    pub fn new(config: Arc<AppConfig>) -> Self {
        let (state, _) = watch::channel(ServerState::Stopped);
        Self {
            config,
            current: Mutex::new(None),
            state,
        }
    }

    #[cfg(test)]
    fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    fn log_view(&self) -> LogView {
        LogView {
            verbose: self.config.project.verbose,
            clean: self.config.project.clean_logs,
            quiet: self.config.project.quiet,
            grep: self.config.tomcat.grep.clone(),
        }
    }

    /// Kill whatever foreign process listens on the configured port.
    pub async fn kill_conflict(&self) -> Result<(), ServerError> {
        let port = self.config.tomcat.port;
        let own = std::process::id();
        let holders: Vec<u32> = listening_pids(port)
            .await
            .into_iter()
            .filter(|pid| *pid != own)
            .collect();
        if holders.is_empty() {
            return Ok(());
        }

        output::warning(&format!(
            "Port {port} is held by pid {}; terminating",
            join_pids(&holders)
        ));
        for pid in &holders {
            if !port::kill_pid(*pid) {
                tracing::warn!(pid, "Kill signal was not delivered");
            }
        }
        tokio::time::sleep(PORT_RELEASE_WAIT).await;

        let remaining: Vec<u32> = listening_pids(port)
            .await
            .into_iter()
            .filter(|pid| *pid != own)
            .collect();
        if remaining.is_empty() {
            Ok(())
        } else {
            Err(ServerError::PortConflict {
                port,
                reason: format!("pid {} survived termination", join_pids(&remaining)),
            })
        }
    }

    /// Download the agent and write its properties. Failures degrade to
    /// running without hot swap.
    async fn prepare_agent(&self) -> Option<AgentSetup> {
        let dir = match paths::agents_dir() {
            Ok(dir) => dir,
            Err(e) => {
                output::warning(&format!("Hot swap disabled: {e}"));
                return None;
            }
        };
        let jar = match ensure_agent(&dir).await {
            Ok(jar) => jar,
            Err(e) => {
                output::warning(&format!("Hot swap disabled: {e}"));
                return None;
            }
        };

        let enhanced_redefinition = java::detect()
            .await
            .is_some_and(|jvm| jvm.enhanced_redefinition);

        let project_dir = self.config.project_dir.clone();
        let tool = self.config.project.build_tool;
        let class_dirs = tokio::task::spawn_blocking(move || find_class_dirs(&project_dir, tool))
            .await
            .unwrap_or_default();
        let properties =
            match write_properties(&paths::state_dir(&self.config.project_dir), &class_dirs) {
                Ok(path) => path,
                Err(e) => {
                    output::warning(&format!("Hot swap disabled: {e}"));
                    return None;
                }
            };
        tracing::info!(jar = %jar.display(), enhanced_redefinition, dirs = class_dirs.len(), "HotswapAgent ready");

        Some(AgentSetup {
            jar,
            properties,
            enhanced_redefinition,
        })
    }

    /// Spawn `catalina run`. Any previous process is stopped first.
    pub async fn start(&self, watching: bool) -> Result<ReadySignal, ServerError> {
        self.stop().await;

        let home = self.config.tomcat.home()?.to_path_buf();
        let debug = self.config.project.debug;
        let agent = if debug || watching {
            self.prepare_agent().await
        } else {
            None
        };
        let opts = catalina_opts(agent.as_ref(), self.config.project.skip_scan);
        let inherited = std::env::var("CATALINA_OPTS").ok();
        let java_home = std::env::var("JAVA_HOME").ok();
        let plan = LaunchPlan::new(
            &home,
            debug,
            &opts,
            inherited.as_deref(),
            java_home.as_deref(),
        );
        if !plan.program.is_file() {
            return Err(ServerError::ScriptNotFound(plan.program));
        }

        let mut command = Command::new(&plan.program);
        command
            .args(&plan.args)
            .current_dir(&home)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &plan.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(ServerError::Spawn)?;
        let pid = child.id();
        tracing::info!(
            ?pid,
            program = %plan.program.display(),
            args = ?plan.args,
            catalina_opts = plan.env_value("CATALINA_OPTS").unwrap_or_default(),
            "Tomcat spawned"
        );
        self.state.send_replace(ServerState::Starting);

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, Stream::Stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, Stream::Stderr, line_tx.clone());
        }
        drop(line_tx);

        let (ready_tx, ready_rx) = oneshot::channel();
        let pump = logs::spawn_log_pump(line_rx, self.log_view(), ready_tx, self.state.clone());

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let state = self.state.clone();
        let monitor = tokio::spawn(async move {
            let stopped = tokio::select! {
                status = child.wait() => {
                    match status {
                        Ok(status) if !status.success() => {
                            output::warning(&format!("Tomcat exited with {status}"));
                        }
                        Ok(_) => tracing::info!("Tomcat exited"),
                        Err(e) => tracing::warn!(err = %e, "Failed waiting for Tomcat"),
                    }
                    false
                }
                _ = stop_rx.changed() => true,
            };
            if stopped {
                if let Err(e) = child.kill().await {
                    tracing::warn!(err = %e, "Failed to kill Tomcat");
                }
                tracing::info!(?pid, "Tomcat stopped");
            }

            let abort = pump.abort_handle();
            if tokio::time::timeout(DRAIN_TIMEOUT, pump).await.is_err() {
                abort.abort();
            }
            state.send_replace(ServerState::Stopped);
        });

        let previous = self
            .current
            .lock()
            .ok()
            .and_then(|mut current| current.replace(ServerHandle {
                pid,
                stop_tx,
                monitor,
            }));
        if let Some(previous) = previous {
            previous.monitor.abort();
        }

        Ok(ready_rx)
    }

    /// Terminate the tracked process. Safe to call when nothing runs.
    pub async fn stop(&self) {
        let handle = self.current.lock().ok().and_then(|mut current| current.take());
        let Some(handle) = handle else {
            return;
        };
        let _ = handle.stop_tx.send(true);
        if let Err(e) = handle.monitor.await
            && !e.is_cancelled()
        {
            tracing::warn!(err = %e, "Server monitor task failed");
        }
    }

    /// Resolves when the tracked process has exited.
    pub async fn wait(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == ServerState::Stopped).await;
    }

    /// Pid of the running server; `None` once it has exited, even on its own.
    pub fn pid(&self) -> Option<u32> {
        if *self.state.borrow() == ServerState::Stopped {
            return None;
        }
        self.current
            .lock()
            .ok()
            .and_then(|current| current.as_ref().and_then(|h| h.pid))
    }

    /// Resident memory of the server, e.g. "412 MB".
    pub fn memory_usage(&self) -> String {
        let bytes = self.pid().and_then(port::resident_memory).unwrap_or(0);
        format_megabytes(bytes)
    }
}

fn join_pids(pids: &[u32]) -> String {
    pids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_megabytes(bytes: u64) -> String {
    format!("{} MB", bytes / (1024 * 1024))
}
