//! Build runner - invokes Maven or Gradle and summarizes their output

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::process::Command;
use tokio::sync::mpsc;
use xavva_core::{LineClass, LogLevel, Rendered, Tone, classify};

use crate::config::{AppConfig, BuildTool};
use crate::output;
use crate::process::{Stream, spawn_line_reader};

/// Compiler error lines shown before the rest are hidden.
pub const ERROR_DISPLAY_CAP: usize = 15;

const PROGRESS_WIDTH: usize = 60;

/// Errors that can occur during build
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Build tool not found: {0}")]
    ToolNotFound(String),

    #[error("Build failed{}", .exit_code.map(|c| format!(" with exit code {c}")).unwrap_or_default())]
    Failed {
        exit_code: Option<i32>,
        diagnostics: Vec<String>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of a successful build
#[derive(Debug, Default)]
pub struct BuildOutcome {
    pub success: bool,
    /// stderr lines, kept only when they were not streamed.
    pub diagnostics: Vec<String>,
}

/// Program and arguments for one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl BuildCommand {
    pub fn new(
        tool: BuildTool,
        project_dir: &Path,
        profile: Option<&str>,
        incremental: bool,
    ) -> Self {
        let mut args: Vec<String> = match (tool, incremental) {
            (BuildTool::Maven, false) => vec!["clean", "package", "-DskipTests"],
            (BuildTool::Maven, true) => vec!["compile", "-DskipTests"],
            (BuildTool::Gradle, false) => vec!["clean", "build", "-x", "test"],
            (BuildTool::Gradle, true) => vec!["classes", "-x", "test"],
        }
        .into_iter()
        .map(String::from)
        .collect();

        if let Some(profile) = profile.filter(|p| !p.is_empty()) {
            match tool {
                BuildTool::Maven => args.extend(["-P".to_string(), profile.to_string()]),
                BuildTool::Gradle => args.push(format!("-Pprofile={profile}")),
            }
        }

        Self {
            program: Self::program(tool, project_dir),
            args,
        }
    }

    /// Project wrapper when present, else the tool from PATH.
    fn program(tool: BuildTool, project_dir: &Path) -> PathBuf {
        let (wrapper, global) = match tool {
            BuildTool::Maven => ("mvnw", "mvn"),
            BuildTool::Gradle => ("gradlew", "gradle"),
        };
        let wrappers: &[String] = &if cfg!(windows) {
            vec![format!("{wrapper}.cmd"), format!("{wrapper}.bat")]
        } else {
            vec![wrapper.to_string()]
        };
        for name in wrappers {
            let candidate = project_dir.join(name);
            if candidate.is_file() {
                return candidate;
            }
        }
        if cfg!(windows) {
            let ext = if tool == BuildTool::Maven { "cmd" } else { "bat" };
            PathBuf::from(format!("{global}.{ext}"))
        } else {
            PathBuf::from(global)
        }
    }

    pub fn display(&self) -> String {
        let program = self
            .program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{} {}", program, self.args.join(" "))
    }
}

/// What to do with one line of build output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildLine {
    Raw(String),
    Show(Rendered),
    /// Informational; becomes the spinner message.
    Progress(String),
    Skip,
}

/// Display policy and bookkeeping for one build's output.
#[derive(Debug, Default)]
pub struct BuildLog {
    verbose: bool,
    shown_errors: usize,
    hidden_errors: usize,
    diagnostics: Vec<String>,
}

impl BuildLog {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            ..Default::default()
        }
    }

    pub fn line(&mut self, stream: Stream, line: &str) -> BuildLine {
        if self.verbose {
            return BuildLine::Raw(line.to_string());
        }
        if stream == Stream::Stderr {
            self.diagnostics.push(line.to_string());
        }

        let class = classify(line);
        match &class {
            LineClass::Noise => BuildLine::Skip,
            LineClass::Level {
                level: LogLevel::Info,
                message,
            } => BuildLine::Progress(truncate(message, PROGRESS_WIDTH)),
            LineClass::Other => BuildLine::Progress(truncate(line.trim(), PROGRESS_WIDTH)),
            LineClass::Startup { .. } => BuildLine::Skip,
            _ => match class.render() {
                Some(rendered) if rendered.tone == Tone::Error => {
                    if self.shown_errors >= ERROR_DISPLAY_CAP {
                        self.hidden_errors += 1;
                        BuildLine::Skip
                    } else {
                        self.shown_errors += 1;
                        BuildLine::Show(rendered)
                    }
                }
                Some(rendered) => BuildLine::Show(rendered),
                None => BuildLine::Skip,
            },
        }
    }

    pub fn hidden_notice(&self) -> Option<String> {
        (self.hidden_errors > 0).then(|| format!("{} additional errors hidden", self.hidden_errors))
    }

    pub fn into_diagnostics(self) -> Vec<String> {
        self.diagnostics
    }
}

/// The stderr lines worth echoing, with a notice counting the rest.
pub fn stderr_excerpt(diagnostics: &[String]) -> (&[String], Option<String>) {
    let shown = &diagnostics[..diagnostics.len().min(ERROR_DISPLAY_CAP)];
    let hidden = diagnostics.len() - shown.len();
    (
        shown,
        (hidden > 0).then(|| format!("{hidden} more stderr lines not shown")),
    )
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let cut: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

/// Runs the configured build tool in the project directory.
#[derive(Clone)]
pub struct BuildRunner {
    config: Arc<AppConfig>,
}

impl BuildRunner {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }

    pub fn command(&self, incremental: bool) -> BuildCommand {
        BuildCommand::new(
            self.config.project.build_tool,
            &self.config.project_dir,
            self.config.project.profile.as_deref(),
            incremental,
        )
    }

    pub async fn run_build(&self, incremental: bool) -> Result<BuildOutcome, BuildError> {
        let command = self.command(incremental);
        let verbose = self.config.project.verbose;
        tracing::info!(command = %command.display(), incremental, "Starting build");

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&self.config.project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    BuildError::ToolNotFound(command.program.display().to_string())
                } else {
                    BuildError::Io(e)
                }
            })?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, Stream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, Stream::Stderr, tx.clone());
        }
        drop(tx);

        let label = if incremental { "Compiling" } else { "Building" };
        let spinner = (!verbose).then(|| {
            output::Spinner::start(format!("{label} with {}", self.config.project.build_tool))
        });
        let started = Instant::now();
        let mut log = BuildLog::new(verbose);

        while let Some((stream, line)) = rx.recv().await {
            match log.line(stream, &line) {
                BuildLine::Raw(text) => println!("{text}"),
                BuildLine::Show(rendered) => match &spinner {
                    Some(spinner) => spinner.suspend(|| output::rendered(&rendered)),
                    None => output::rendered(&rendered),
                },
                BuildLine::Progress(text) => {
                    if let Some(spinner) = &spinner {
                        spinner.set_message(format!("{label}: {text}"));
                    }
                }
                BuildLine::Skip => {}
            }
        }

        let status = child.wait().await?;
        let elapsed = started.elapsed().as_secs_f32();
        let notice = log.hidden_notice();
        let diagnostics = log.into_diagnostics();

        if status.success() {
            if let Some(spinner) = spinner {
                spinner.succeed(&format!("{label} finished in {elapsed:.1}s"));
            }
            if let Some(notice) = notice {
                output::muted(&notice);
            }
            return Ok(BuildOutcome {
                success: true,
                diagnostics,
            });
        }

        if let Some(spinner) = spinner {
            spinner.fail(&format!("{label} failed after {elapsed:.1}s"));
        }
        if let Some(notice) = notice {
            output::muted(&notice);
        }
        let (shown, rest) = stderr_excerpt(&diagnostics);
        for line in shown {
            output::muted(line);
        }
        if let Some(rest) = rest {
            output::muted(&rest);
        }
        Err(BuildError::Failed {
            exit_code: status.code(),
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(cmd: &BuildCommand) -> Vec<&str> {
        cmd.args.iter().map(String::as_str).collect()
    }

    #[test]
    fn maven_full_and_incremental_commands() {
        let dir = TempDir::new().unwrap();
        let full = BuildCommand::new(BuildTool::Maven, dir.path(), None, false);
        assert_eq!(args(&full), vec!["clean", "package", "-DskipTests"]);
        let inc = BuildCommand::new(BuildTool::Maven, dir.path(), Some("dev"), true);
        assert_eq!(args(&inc), vec!["compile", "-DskipTests", "-P", "dev"]);
    }

    #[test]
    fn gradle_full_and_incremental_commands() {
        let dir = TempDir::new().unwrap();
        let full = BuildCommand::new(BuildTool::Gradle, dir.path(), Some("qa"), false);
        assert_eq!(
            args(&full),
            vec!["clean", "build", "-x", "test", "-Pprofile=qa"]
        );
        let inc = BuildCommand::new(BuildTool::Gradle, dir.path(), None, true);
        assert_eq!(args(&inc), vec!["classes", "-x", "test"]);
    }

    #[test]
    fn full_build_always_cleans_incremental_never_does() {
        let dir = TempDir::new().unwrap();
        for tool in [BuildTool::Maven, BuildTool::Gradle] {
            assert!(BuildCommand::new(tool, dir.path(), None, false).args.contains(&"clean".to_string()));
            assert!(!BuildCommand::new(tool, dir.path(), None, true).args.contains(&"clean".to_string()));
        }
    }

    #[cfg(unix)]
    #[test]
    fn project_wrapper_is_preferred() {
        let dir = TempDir::new().unwrap();
        let cmd = BuildCommand::new(BuildTool::Maven, dir.path(), None, false);
        assert_eq!(cmd.program, PathBuf::from("mvn"));

        std::fs::write(dir.path().join("mvnw"), "#!/bin/sh\n").unwrap();
        let cmd = BuildCommand::new(BuildTool::Maven, dir.path(), None, false);
        assert_eq!(cmd.program, dir.path().join("mvnw"));
        assert_eq!(cmd.display(), "mvnw clean package -DskipTests");
    }

    #[test]
    fn verbose_log_streams_everything_and_keeps_nothing() {
        let mut log = BuildLog::new(true);
        assert_eq!(
            log.line(Stream::Stderr, "[INFO] Scanning for projects..."),
            BuildLine::Raw("[INFO] Scanning for projects...".to_string())
        );
        assert!(log.into_diagnostics().is_empty());
    }

    #[test]
    fn noise_is_skipped_and_info_becomes_progress() {
        let mut log = BuildLog::new(false);
        assert_eq!(
            log.line(Stream::Stdout, "[INFO] Scanning for projects..."),
            BuildLine::Skip
        );
        assert_eq!(
            log.line(Stream::Stdout, "[INFO] Compiling 12 source files to /app/target/classes"),
            BuildLine::Progress("Compiling 12 source files to /app/target/classes".to_string())
        );
        assert_eq!(log.line(Stream::Stdout, "[INFO] Total time:  3.2 s"), BuildLine::Skip);
    }

    #[test]
    fn stderr_excerpt_counts_hidden_lines() {
        let lines: Vec<String> = (0..18).map(|i| format!("warning {i}")).collect();
        let (shown, rest) = stderr_excerpt(&lines);
        assert_eq!(shown.len(), ERROR_DISPLAY_CAP);
        assert_eq!(shown[0], "warning 0");
        assert_eq!(rest.as_deref(), Some("3 more stderr lines not shown"));

        let (shown, rest) = stderr_excerpt(&lines[..2]);
        assert_eq!(shown.len(), 2);
        assert_eq!(rest, None);
    }

    #[test]
    fn compiler_errors_are_capped() {
        let mut log = BuildLog::new(false);
        let mut shown = 0;
        for i in 0..20 {
            let line = format!("[ERROR] /app/src/Foo.java:[{i},1] cannot find symbol");
            if matches!(log.line(Stream::Stdout, &line), BuildLine::Show(_)) {
                shown += 1;
            }
        }
        assert_eq!(shown, ERROR_DISPLAY_CAP);
        assert_eq!(
            log.hidden_notice().as_deref(),
            Some("5 additional errors hidden")
        );
    }

    #[test]
    fn stderr_is_retained_as_diagnostics() {
        let mut log = BuildLog::new(false);
        log.line(Stream::Stderr, "Error: JAVA_HOME is not defined correctly.");
        log.line(Stream::Stdout, "[INFO] BUILD FAILURE");
        assert_eq!(
            log.into_diagnostics(),
            vec!["Error: JAVA_HOME is not defined correctly.".to_string()]
        );
    }

    #[test]
    fn long_progress_is_truncated() {
        let text = "x".repeat(100);
        let out = truncate(&text, 10);
        assert_eq!(out.chars().count(), 10);
        assert!(out.ends_with('…'));
    }

    #[test]
    fn failed_error_mentions_exit_code() {
        let err = BuildError::Failed {
            exit_code: Some(1),
            diagnostics: vec![],
        };
        assert_eq!(err.to_string(), "Build failed with exit code 1");
    }
}
