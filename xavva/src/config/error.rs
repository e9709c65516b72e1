use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read file {0}: {1}")]
    FileRead(PathBuf, std::io::Error),

    #[error("Failed to write file {0}: {1}")]
    FileWrite(PathBuf, std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(
        "Tomcat path not set. Pass --path, set [tomcat].path in xavva.toml or export CATALINA_HOME"
    )]
    TomcatNotConfigured,

    #[error("Tomcat not found at {0}")]
    TomcatNotFound(PathBuf),

    #[error("Several apps are deployed ({}); pick one with --name", .0.join(", "))]
    AmbiguousApp(Vec<String>),

    #[error("No deployed app found in {0}; run a full deploy first or pass --name")]
    AppNotFound(PathBuf),

    #[error("Class {0} not found in src/main/java, src/test/java or src")]
    ClassNotFound(String),

    #[error("Several classes match {query}: {}", .candidates.join(", "))]
    AmbiguousClass {
        query: String,
        candidates: Vec<String>,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
