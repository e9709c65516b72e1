//! JVM discovery.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;

use regex::Regex;
use tokio::process::Command;

static VERSION_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"version\s+"([^"]+)""#).ok());

/// What `java -version` tells us about the JVM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JvmInfo {
    pub version: String,
    /// DCEVM-style enhanced class redefinition is available.
    pub enhanced_redefinition: bool,
}

impl JvmInfo {
    pub fn parse(output: &str) -> Self {
        let version = VERSION_RE
            .as_ref()
            .and_then(|re| re.captures(output))
            .map(|caps| caps[1].to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let lower = output.to_lowercase();
        let enhanced_redefinition = ["dcevm", "jbr", "trava", "jetbrains"]
            .iter()
            .any(|marker| lower.contains(marker));
        Self {
            version,
            enhanced_redefinition,
        }
    }

    pub fn hot_reload_level(&self) -> &'static str {
        if self.enhanced_redefinition {
            "full (DCEVM)"
        } else {
            "method bodies only"
        }
    }
}

/// `$JAVA_HOME/bin/java`, or `java` from PATH.
pub fn java_binary() -> PathBuf {
    let exe = if cfg!(windows) { "java.exe" } else { "java" };
    match std::env::var_os("JAVA_HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home).join("bin").join(exe),
        _ => PathBuf::from(exe),
    }
}

/// Run `java -version`; `None` when no JVM can be started.
pub async fn detect() -> Option<JvmInfo> {
    let output = Command::new(java_binary())
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;
    // The banner goes to stderr on every JDK we know of.
    let mut text = String::from_utf8_lossy(&output.stderr).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stdout));
    tracing::info!(status = ?output.status, "java -version");
    Some(JvmInfo::parse(&text))
}
