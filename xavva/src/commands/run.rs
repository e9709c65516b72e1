//! `xavva run` / `xavva debug`: launch a class with a `main` method on the
//! project classpath.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use ignore::WalkBuilder;
use regex::Regex;
use tokio::process::Command;

use crate::config::{AppConfig, BuildTool, CliOverrides, ConfigError};
use crate::java;
use crate::output;
use crate::paths;

use super::load_config;

pub const HISTORY_FILE: &str = "history.json";
pub const CLASSPATH_FILE: &str = "classpath.txt";
pub const HISTORY_LIMIT: usize = 10;
pub const JDWP_AGENT: &str = "-agentlib:jdwp=transport=dt_socket,server=y,suspend=y,address=5005";

const SOURCE_ROOTS: &[&str] = &["src/main/java", "src/test/java", "src"];
const LOCAL_OUTPUTS: &[&str] = &[
    "target/classes",
    "target/test-classes",
    "build/classes/java/main",
    "build/classes/java/test",
];

static PACKAGE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*package\s+([\w.]+)\s*;").ok());

pub async fn run(
    overrides: &CliOverrides,
    class: Option<&str>,
    debug: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(overrides)?;
    let project_dir = &config.project_dir;
    let state = paths::state_dir(project_dir);

    let class_name = match class.map(str::trim).filter(|c| !c.is_empty()) {
        Some(query) if query.contains('.') && !query.ends_with(".java") => query.to_string(),
        Some(query) => resolve_class(project_dir, query)?,
        None => load_history(&state).into_iter().next().ok_or_else(|| {
            ConfigError::Validation(format!(
                "No class given and no run history. Usage: xavva {} <Class>",
                if debug { "debug" } else { "run" }
            ))
        })?,
    };
    save_history(&state, &class_name)?;

    output::section(&format!(
        "{} {}",
        if debug { "Debugging" } else { "Running" },
        output::brand_accent(&class_name)
    ));

    let dependencies = dependency_classpath(&config).await?;
    let classpath = join_classpath(&local_classpath(project_dir), &dependencies);

    let mut args = vec!["-classpath".to_string(), classpath];
    if debug {
        args.push(JDWP_AGENT.to_string());
        output::warning("Waiting for a debugger on port 5005");
        output::muted("  Attach with \"Remote JVM Debug\" in IntelliJ or \"attach\" in VS Code");
    }
    args.push(class_name.clone());

    let status = Command::new(java::java_binary())
        .args(&args)
        .current_dir(project_dir)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await?;
    tracing::info!(%status, class = %class_name, "JVM exited");
    output::muted(&format!("Session ended ({status})"));
    Ok(())
}

/// Fully-qualified name of the class whose file matches `query`.
///
/// Exact file names win over substring matches; more than one distinct
/// class is ambiguous.
pub fn resolve_class(project_dir: &Path, query: &str) -> Result<String, ConfigError> {
    let simple = query.strip_suffix(".java").unwrap_or(query);
    let sources = java_sources(project_dir);

    let exact: Vec<&PathBuf> = sources
        .iter()
        .filter(|p| p.file_stem().is_some_and(|s| s == simple))
        .collect();
    let matched = if exact.is_empty() {
        sources
            .iter()
            .filter(|p| {
                p.file_stem()
                    .is_some_and(|s| s.to_string_lossy().contains(simple))
            })
            .collect()
    } else {
        exact
    };

    let mut classes: Vec<String> = matched.into_iter().map(|p| qualified_name(p)).collect();
    classes.sort();
    classes.dedup();

    match classes.len() {
        0 => Err(ConfigError::ClassNotFound(simple.to_string())),
        1 => Ok(classes.remove(0)),
        _ => Err(ConfigError::AmbiguousClass {
            query: simple.to_string(),
            candidates: classes,
        }),
    }
}

fn java_sources(project_dir: &Path) -> Vec<PathBuf> {
    let mut seen = std::collections::BTreeSet::new();
    for root in SOURCE_ROOTS {
        let dir = project_dir.join(root);
        if !dir.is_dir() {
            continue;
        }
        let walker = WalkBuilder::new(&dir)
            .standard_filters(false)
            .follow_links(false)
            .build();
        for entry in walker.flatten() {
            let path = entry.path();
            if entry.file_type().is_some_and(|t| t.is_file())
                && path.extension().is_some_and(|ext| ext == "java")
            {
                seen.insert(path.to_path_buf());
            }
        }
    }
    seen.into_iter().collect()
}

/// `package` declaration plus file stem.
fn qualified_name(source: &Path) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let package = fs::read_to_string(source).ok().and_then(|text| {
        PACKAGE_RE
            .as_ref()?
            .captures(&text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    });
    match package {
        Some(package) => format!("{package}.{stem}"),
        None => stem,
    }
}

/// Recently run classes, most recent first.
pub fn load_history(state_dir: &Path) -> Vec<String> {
    fs::read_to_string(state_dir.join(HISTORY_FILE))
        .ok()
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or_default()
}

pub fn push_history(history: Vec<String>, class: &str) -> Vec<String> {
    std::iter::once(class.to_string())
        .chain(history.into_iter().filter(|c| c != class))
        .take(HISTORY_LIMIT)
        .collect()
}

pub fn save_history(state_dir: &Path, class: &str) -> Result<(), ConfigError> {
    let history = push_history(load_history(state_dir), class);
    let path = state_dir.join(HISTORY_FILE);
    fs::create_dir_all(state_dir).map_err(|e| ConfigError::FileWrite(path.clone(), e))?;
    let json = serde_json::to_string_pretty(&history)?;
    fs::write(&path, json).map_err(|e| ConfigError::FileWrite(path, e))
}

fn local_classpath(project_dir: &Path) -> Vec<PathBuf> {
    LOCAL_OUTPUTS
        .iter()
        .map(|dir| project_dir.join(dir))
        .filter(|dir| dir.is_dir())
        .chain(std::iter::once(project_dir.to_path_buf()))
        .collect()
}

pub fn classpath_separator() -> &'static str {
    if cfg!(windows) { ";" } else { ":" }
}

pub fn join_classpath(local: &[PathBuf], dependencies: &str) -> String {
    let mut parts: Vec<String> = local.iter().map(|p| p.display().to_string()).collect();
    let dependencies = dependencies.trim();
    if !dependencies.is_empty() {
        parts.push(dependencies.to_string());
    }
    parts.join(classpath_separator())
}

/// Maven dependency classpath, generated once into `.xavva/classpath.txt`.
async fn dependency_classpath(config: &AppConfig) -> Result<String, Box<dyn std::error::Error>> {
    let state = paths::state_dir(&config.project_dir);
    let cache = state.join(CLASSPATH_FILE);
    if let Ok(cached) = fs::read_to_string(&cache) {
        return Ok(cached.trim().to_string());
    }
    if config.project.build_tool == BuildTool::Gradle {
        output::muted("Gradle dependencies are not added to the classpath");
        return Ok(String::new());
    }

    fs::create_dir_all(&state)?;
    let spinner = output::Spinner::start("Resolving dependency classpath");
    let program = if cfg!(windows) { "mvn.cmd" } else { "mvn" };
    let result = Command::new(program)
        .arg("-q")
        .arg("dependency:build-classpath")
        .arg(format!("-Dmdep.outputFile={}", cache.display()))
        .current_dir(&config.project_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match result {
        Ok(status) if status.success() => spinner.clear(),
        Ok(status) => spinner.fail(&format!("mvn dependency:build-classpath exited with {status}")),
        Err(e) => spinner.fail(&format!("Could not run mvn: {e}")),
    }
    Ok(fs::read_to_string(&cache)
        .map(|text| text.trim().to_string())
        .unwrap_or_default())
}
