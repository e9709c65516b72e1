//! HotswapAgent download and per-project configuration.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ignore::WalkBuilder;
use thiserror::Error;
use xavva_core::PathFilter;

use crate::build::HOTSWAP_PROPERTIES;
use crate::config::BuildTool;

pub const AGENT_VERSION: &str = "2.0.3";
pub const AGENT_URL: &str = "https://github.com/HotswapProjects/HotswapAgent/releases/download/RELEASE-2.0.3/hotswap-agent-2.0.3.jar";

/// Anything smaller is an interrupted download or an error page.
const MIN_AGENT_BYTES: u64 = 1000;
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum HotswapError {
    #[error("Agent download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("Agent download returned HTTP {0}")]
    Status(u16),

    #[error("Agent download was truncated ({0} bytes)")]
    Truncated(usize),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub fn agent_file_name() -> String {
    format!("hotswap-agent-{AGENT_VERSION}.jar")
}

pub fn is_usable(jar: &Path) -> bool {
    fs::metadata(jar).is_ok_and(|m| m.is_file() && m.len() > MIN_AGENT_BYTES)
}

/// The cached agent jar, downloading it into `dir` on first use.
pub async fn ensure_agent(dir: &Path) -> Result<PathBuf, HotswapError> {
    let jar = dir.join(agent_file_name());
    if is_usable(&jar) {
        return Ok(jar);
    }

    tokio::fs::create_dir_all(dir).await?;
    tracing::info!(url = AGENT_URL, dest = %jar.display(), "Downloading HotswapAgent");

    let client = reqwest::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .build()?;
    let response = client.get(AGENT_URL).send().await?;
    if !response.status().is_success() {
        return Err(HotswapError::Status(response.status().as_u16()));
    }
    let bytes = response.bytes().await?;
    if (bytes.len() as u64) <= MIN_AGENT_BYTES {
        return Err(HotswapError::Truncated(bytes.len()));
    }

    let partial = jar.with_extension("jar.part");
    tokio::fs::write(&partial, &bytes).await?;
    tokio::fs::rename(&partial, &jar).await?;
    Ok(jar)
}

/// Compiled class directories the agent should watch.
///
/// Maven modules contribute `target/classes`, Gradle modules
/// `build/classes/java/main`. Falls back to the root module's directory.
pub fn find_class_dirs(project_dir: &Path, tool: BuildTool) -> Vec<PathBuf> {
    let filter = PathFilter::class_output_scan();
    let mut builder = WalkBuilder::new(project_dir);
    builder
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(move |entry| {
            entry.depth() == 0
                || (entry.file_type().is_some_and(|t| t.is_dir())
                    && !filter.is_excluded_name(&entry.file_name().to_string_lossy()))
        });

    let mut found: Vec<PathBuf> = Vec::new();
    for entry in builder.build().flatten() {
        let path = entry.path();
        if found.iter().any(|f| path.starts_with(f)) {
            continue;
        }
        if is_class_dir(path, tool) {
            found.push(path.to_path_buf());
        }
    }

    if found.is_empty() {
        let default = match tool {
            BuildTool::Maven => project_dir.join("target").join("classes"),
            BuildTool::Gradle => project_dir.join("build").join("classes").join("java").join("main"),
        };
        found.push(default);
    }
    found.sort();
    found
}

fn is_class_dir(path: &Path, tool: BuildTool) -> bool {
    let tail: Vec<String> = path
        .components()
        .rev()
        .take(3)
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let tail: Vec<&str> = tail.iter().map(String::as_str).collect();
    match tool {
        BuildTool::Maven => tail.starts_with(&["classes", "target"]),
        BuildTool::Gradle => tail.starts_with(&["main", "java", "classes"]),
    }
}

pub fn properties_content(class_dirs: &[PathBuf]) -> String {
    let extra = class_dirs
        .iter()
        .map(|p| p.display().to_string().replace('\\', "/"))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "autoHotswap=true\nautoHotswap.delay=3000\nwatchResources=false\nextraClasspath={extra}\nLOGGER=info\n"
    )
}

/// Regenerate `.xavva/hotswap-agent.properties` and return its path.
pub fn write_properties(state_dir: &Path, class_dirs: &[PathBuf]) -> io::Result<PathBuf> {
    fs::create_dir_all(state_dir)?;
    let path = state_dir.join(HOTSWAP_PROPERTIES);
    fs::write(&path, properties_content(class_dirs))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn small_cached_file_counts_as_missing() {
        let dir = TempDir::new().unwrap();
        let jar = dir.path().join(agent_file_name());
        assert!(!is_usable(&jar));
        fs::write(&jar, vec![0u8; 1000]).unwrap();
        assert!(!is_usable(&jar));
        fs::write(&jar, vec![0u8; 1001]).unwrap();
        assert!(is_usable(&jar));
    }

    #[tokio::test]
    async fn cached_agent_is_reused_without_download() {
        let dir = TempDir::new().unwrap();
        let jar = dir.path().join(agent_file_name());
        fs::write(&jar, vec![1u8; 4096]).unwrap();
        assert_eq!(ensure_agent(dir.path()).await.unwrap(), jar);
    }

    #[test]
    fn finds_maven_module_class_dirs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        for p in [
            "target/classes/com/acme",
            "core/target/classes/com/acme",
            "src/main/java/target/classes",
            "node_modules/x/target/classes",
            ".idea/target/classes",
        ] {
            fs::create_dir_all(root.join(p)).unwrap();
        }
        assert_eq!(
            find_class_dirs(root, BuildTool::Maven),
            vec![
                root.join("core/target/classes"),
                root.join("target/classes")
            ]
        );
    }

    #[test]
    fn finds_gradle_class_dirs() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("build/classes/java/main/com")).unwrap();
        fs::create_dir_all(dir.path().join("build/classes/java/test")).unwrap();
        assert_eq!(
            find_class_dirs(dir.path(), BuildTool::Gradle),
            vec![dir.path().join("build/classes/java/main")]
        );
    }

    #[test]
    fn falls_back_to_default_class_dir() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            find_class_dirs(dir.path(), BuildTool::Maven),
            vec![dir.path().join("target").join("classes")]
        );
    }

    #[test]
    fn properties_use_forward_slashes_and_commas() {
        let content = properties_content(&[
            PathBuf::from("C:\\work\\shop\\target\\classes"),
            PathBuf::from("/work/core/target/classes"),
        ]);
        assert_eq!(
            content,
            "autoHotswap=true\nautoHotswap.delay=3000\nwatchResources=false\nextraClasspath=C:/work/shop/target/classes,/work/core/target/classes\nLOGGER=info\n"
        );
    }

    #[test]
    fn write_properties_creates_state_dir() {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join(".xavva");
        let path = write_properties(&state, &[PathBuf::from("/x/target/classes")]).unwrap();
        assert_eq!(path, state.join(HOTSWAP_PROPERTIES));
        assert!(fs::read_to_string(path).unwrap().contains("extraClasspath=/x/target/classes"));
    }
}
