//! CLI Integration Tests
//!
//! Runs the xavva binary against throwaway projects and Tomcat directories.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| manifest_dir.to_path_buf())
}

fn apply_coverage_env(cmd: &mut Command) {
    let Some(profile) = std::env::var_os("LLVM_PROFILE_FILE") else {
        return;
    };
    let profile = PathBuf::from(profile);
    if profile.is_absolute() {
        return;
    }
    let absolute = workspace_root().join(profile);
    if let Some(parent) = absolute.parent() {
        let _ = fs::create_dir_all(parent);
    }
    cmd.env("LLVM_PROFILE_FILE", absolute);
}

/// Helper to run xavva CLI commands with an isolated home directory
fn run_xavva_with_env(args: &[&str], cwd: &Path, home: &Path) -> std::process::Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_xavva"));
    cmd.args(args)
        .current_dir(cwd)
        .env("HOME", home)
        .env("XAVVA_HOME", home.join(".xavva"))
        .env_remove("CATALINA_HOME")
        .env_remove("RUST_LOG")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    apply_coverage_env(&mut cmd);
    cmd.output().expect("Failed to run xavva command")
}

/// Helper to run xavva CLI commands
fn run_xavva(args: &[&str], cwd: &Path) -> std::process::Output {
    let home = TempDir::new().unwrap();
    run_xavva_with_env(args, cwd, home.path())
}

fn stdout_str(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr_str(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_help_lists_commands() {
    let temp = TempDir::new().unwrap();
    let output = run_xavva(&["--help"], temp.path());
    assert!(output.status.success());

    let stdout = stdout_str(&output);
    for command in ["deploy", "build", "start", "dev", "doctor", "logs", "run", "audit", "init"] {
        assert!(stdout.contains(command), "missing {command} in:\n{stdout}");
    }
}

#[test]
fn test_version_flag() {
    let temp = TempDir::new().unwrap();
    let output = run_xavva(&["--version"], temp.path());
    assert!(output.status.success());
    assert_eq!(stdout_str(&output).trim(), env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_init_creates_config_and_refuses_overwrite() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("pom.xml"), "<project/>").unwrap();
    fs::write(temp.path().join(".gitignore"), "target/\n").unwrap();

    let output = run_xavva(&["init"], temp.path());
    assert!(
        output.status.success(),
        "init failed: {}",
        stderr_str(&output)
    );
    let config = fs::read_to_string(temp.path().join("xavva.toml")).unwrap();
    assert!(config.contains("build_tool = \"maven\""));
    assert!(
        fs::read_to_string(temp.path().join(".gitignore"))
            .unwrap()
            .contains(".xavva/")
    );

    let output = run_xavva(&["init"], temp.path());
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr_str(&output).contains("--force"));

    let output = run_xavva(&["init", "--force"], temp.path());
    assert!(output.status.success());
}

#[test]
fn test_deploy_without_war_fails() {
    let project = TempDir::new().unwrap();
    let tomcat = TempDir::new().unwrap();
    fs::create_dir_all(tomcat.path().join("webapps")).unwrap();
    fs::create_dir_all(tomcat.path().join("bin")).unwrap();
    let tomcat_path = tomcat.path().to_string_lossy().to_string();

    let output = run_xavva(
        &["deploy", "--no-build", "--port", "59999", "-p", &tomcat_path],
        project.path(),
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(
        stderr_str(&output).contains("No .war file found"),
        "unexpected stderr: {}",
        stderr_str(&output)
    );
    assert!(
        fs::read_dir(tomcat.path().join("webapps"))
            .unwrap()
            .next()
            .is_none()
    );
}

#[test]
fn test_run_without_class_or_history_fails() {
    let temp = TempDir::new().unwrap();
    let output = run_xavva(&["run"], temp.path());
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr_str(&output).contains("No class given"));
}

#[test]
fn test_doctor_reports_without_tomcat() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("src/main/java");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("App.java"), b"\xEF\xBB\xBFclass App {}").unwrap();

    let output = run_xavva(&["doctor"], temp.path());
    assert!(output.status.success(), "doctor failed: {}", stderr_str(&output));
    let stdout = stdout_str(&output);
    assert!(stdout.contains("Tomcat"));
    assert!(stdout.contains("App.java"));
    assert!(fs::read(src.join("App.java")).unwrap().starts_with(b"\xEF\xBB\xBF"));

    let output = run_xavva(&["doctor", "--fix"], temp.path());
    assert!(output.status.success());
    assert_eq!(fs::read(src.join("App.java")).unwrap(), b"class App {}");
}
