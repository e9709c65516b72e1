use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::error::{ConfigError, Result};

pub const CONFIG_FILE: &str = "xavva.toml";
/// Older projects keep their settings in JSON with camelCase keys.
pub const LEGACY_CONFIG_FILE: &str = "xavva.json";

/// Template written by `xavva init`.
pub const CONFIG_TEMPLATE: &str = r#"# xavva configuration
# Command line flags take precedence over these values.

[tomcat]
# Tomcat installation directory. Falls back to CATALINA_HOME.
# path = "/opt/apache-tomcat-10.1"
port = 8080
webapps = "webapps"
# Only show server log lines containing this text.
# grep = ""

[project]
# Context path. Defaults to the WAR file name.
# app_name = "my-app"
build_tool = "maven"
# profile = "dev"
skip_build = false
# Skip Tomcat's TLD and annotation jar scanning for faster startups.
skip_scan = true
clean_logs = false
quiet = false
debug = false
"#;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BuildTool {
    #[default]
    Maven,
    Gradle,
}

impl BuildTool {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildTool::Maven => "maven",
            BuildTool::Gradle => "gradle",
        }
    }

    /// Guess from the build descriptor present in `dir`.
    pub fn detect(dir: &Path) -> Option<Self> {
        if dir.join("pom.xml").is_file() {
            Some(BuildTool::Maven)
        } else if dir.join("build.gradle").is_file() || dir.join("build.gradle.kts").is_file() {
            Some(BuildTool::Gradle)
        } else {
            None
        }
    }
}

impl std::fmt::Display for BuildTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root of xavva.toml (or the legacy xavva.json)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct XavvaToml {
    #[serde(default)]
    pub tomcat: TomcatSection,

    #[serde(default)]
    pub project: ProjectSection,
}

/// [tomcat] section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomcatSection {
    pub path: Option<PathBuf>,
    pub port: Option<u16>,
    pub webapps: Option<String>,
    pub grep: Option<String>,
}

/// [project] section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProjectSection {
    #[serde(alias = "appName")]
    pub app_name: Option<String>,

    #[serde(alias = "buildTool")]
    pub build_tool: Option<BuildTool>,

    pub profile: Option<String>,

    #[serde(alias = "skipBuild")]
    pub skip_build: Option<bool>,

    #[serde(alias = "skipScan")]
    pub skip_scan: Option<bool>,

    #[serde(alias = "cleanLogs")]
    pub clean_logs: Option<bool>,

    pub quiet: Option<bool>,
    pub verbose: Option<bool>,
    pub debug: Option<bool>,
}

impl XavvaToml {
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn parse_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load xavva.toml, falling back to xavva.json. `None` when neither exists.
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> Result<Option<Self>> {
        let dir = dir.as_ref();

        let toml_path = dir.join(CONFIG_FILE);
        if toml_path.is_file() {
            let content =
                fs::read_to_string(&toml_path).map_err(|e| ConfigError::FileRead(toml_path, e))?;
            return Self::parse(&content).map(Some);
        }

        let json_path = dir.join(LEGACY_CONFIG_FILE);
        if json_path.is_file() {
            let content =
                fs::read_to_string(&json_path).map_err(|e| ConfigError::FileRead(json_path, e))?;
            return Self::parse_json(&content).map(Some);
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_empty_file() {
        assert_eq!(XavvaToml::parse("").unwrap(), XavvaToml::default());
    }

    #[test]
    fn test_parse_full_file() {
        let config = XavvaToml::parse(
            r#"
[tomcat]
path = "/opt/tomcat"
port = 8181
webapps = "apps"
grep = "orders"

[project]
app_name = "shop"
build_tool = "gradle"
profile = "dev"
skip_build = true
skip_scan = false
clean_logs = true
quiet = true
debug = true
"#,
        )
        .unwrap();
        assert_eq!(config.tomcat.path, Some(PathBuf::from("/opt/tomcat")));
        assert_eq!(config.tomcat.port, Some(8181));
        assert_eq!(config.tomcat.webapps.as_deref(), Some("apps"));
        assert_eq!(config.project.app_name.as_deref(), Some("shop"));
        assert_eq!(config.project.build_tool, Some(BuildTool::Gradle));
        assert_eq!(config.project.skip_scan, Some(false));
        assert_eq!(config.project.debug, Some(true));
    }

    #[test]
    fn test_template_parses() {
        let config = XavvaToml::parse(CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.tomcat.port, Some(8080));
        assert_eq!(config.project.build_tool, Some(BuildTool::Maven));
        assert_eq!(config.project.skip_scan, Some(true));
    }

    #[test]
    fn test_unknown_build_tool_is_rejected() {
        let err = XavvaToml::parse("[project]\nbuild_tool = \"ant\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn test_legacy_json_accepts_camel_case() {
        let config = XavvaToml::parse_json(
            r#"{"tomcat": {"path": "C:\\tomcat", "port": 8080},
                "project": {"appName": "shop", "buildTool": "maven", "skipScan": false, "cleanLogs": true}}"#,
        )
        .unwrap();
        assert_eq!(config.project.app_name.as_deref(), Some("shop"));
        assert_eq!(config.project.skip_scan, Some(false));
        assert_eq!(config.project.clean_logs, Some(true));
    }

    #[test]
    fn test_load_prefers_toml_over_json() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[tomcat]\nport = 9000\n").unwrap();
        fs::write(
            dir.path().join(LEGACY_CONFIG_FILE),
            r#"{"tomcat": {"port": 9001}}"#,
        )
        .unwrap();
        let config = XavvaToml::load_from_dir(dir.path()).unwrap().unwrap();
        assert_eq!(config.tomcat.port, Some(9000));
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(XavvaToml::load_from_dir(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_detect_build_tool() {
        let dir = TempDir::new().unwrap();
        assert_eq!(BuildTool::detect(dir.path()), None);
        fs::write(dir.path().join("build.gradle.kts"), "").unwrap();
        assert_eq!(BuildTool::detect(dir.path()), Some(BuildTool::Gradle));
        fs::write(dir.path().join("pom.xml"), "<project/>").unwrap();
        assert_eq!(BuildTool::detect(dir.path()), Some(BuildTool::Maven));
    }
}
