use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use xavva_core::PathFilter;

use crate::config::{AppConfig, CliOverrides};
use crate::java;
use crate::output;
use crate::paths;
use crate::process::command_exists;
use crate::server;

use super::load_config;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub async fn run(overrides: &CliOverrides, fix: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(overrides)?;

    output::section("Java");
    match std::env::var("JAVA_HOME") {
        Ok(home) if !home.trim().is_empty() => output::info("JAVA_HOME", home),
        _ => output::info("JAVA_HOME", output::brand_warning("not set, using java from PATH")),
    }
    match java::detect().await {
        Some(jvm) => {
            output::info("version", &jvm.version);
            output::info("hot reload", jvm.hot_reload_level());
            if !jvm.enhanced_redefinition {
                output::muted(
                    "  A DCEVM or JetBrains Runtime JDK allows adding methods and fields without a restart",
                );
            }
        }
        None => output::info("version", output::brand_error("java not found")),
    }

    output::section("Tomcat");
    report_tomcat(&config);

    output::section("Tools");
    for tool in ["mvn", "gradle", "git"] {
        let found = command_exists(tool).await;
        output::info(
            tool,
            if found {
                output::brand_success("found")
            } else {
                output::brand_muted("not found")
            },
        );
    }
    let agent = paths::agents_dir().map(|dir| dir.join(server::agent_file_name()));
    match agent {
        Ok(jar) if server::is_usable(&jar) => {
            output::info("hotswap", format!("{} cached", server::AGENT_VERSION));
        }
        _ => output::info("hotswap", "downloaded on first watch or debug run"),
    }

    output::section("Sources");
    let src = config.project_dir.join("src");
    let root = if src.is_dir() {
        src
    } else {
        config.project_dir.clone()
    };
    let with_bom = find_bom_files(&root);
    if with_bom.is_empty() {
        output::success("No UTF-8 BOM in .java files");
        return Ok(());
    }

    output::warning(&format!(
        "{} .java file(s) start with a UTF-8 BOM, which javac rejects as an illegal character",
        with_bom.len()
    ));
    for path in &with_bom {
        let shown = path.strip_prefix(&config.project_dir).unwrap_or(path);
        output::muted(&format!("  {}", shown.display()));
    }
    if fix {
        let mut fixed = 0;
        for path in &with_bom {
            if strip_bom(path)? {
                fixed += 1;
            }
        }
        output::success(&format!("Removed the BOM from {fixed} file(s)"));
    } else {
        output::muted("Run `xavva doctor --fix` to strip it");
    }
    Ok(())
}

fn report_tomcat(config: &AppConfig) {
    match config.tomcat.home() {
        Ok(home) => {
            output::info("path", home.display());
            let script = if cfg!(windows) {
                "catalina.bat"
            } else {
                "catalina.sh"
            };
            let launcher = home.join("bin").join(script);
            if launcher.is_file() {
                output::info("launcher", launcher.display());
            } else {
                output::info("launcher", output::brand_error(format!("{script} missing")));
            }
            match config.tomcat.webapps_dir() {
                Ok(webapps) if webapps.is_dir() => output::info("webapps", webapps.display()),
                _ => output::info("webapps", output::brand_warning("missing")),
            }
        }
        Err(e) => output::info("path", output::brand_error(e.to_string())),
    }
    output::info("port", config.tomcat.port);
}

pub fn has_bom(bytes: &[u8]) -> bool {
    bytes.starts_with(UTF8_BOM)
}

/// `.java` files under `root` beginning with a UTF-8 byte order mark.
pub fn find_bom_files(root: &Path) -> Vec<PathBuf> {
    let filter = PathFilter::artifact_scan();
    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(move |entry| {
            entry.depth() == 0
                || !entry.file_type().is_some_and(|t| t.is_dir())
                || !filter.is_excluded_name(&entry.file_name().to_string_lossy())
        });

    let mut found: Vec<PathBuf> = builder
        .build()
        .flatten()
        .filter(|e| e.file_type().is_some_and(|t| t.is_file()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "java"))
        .filter(|e| fs::read(e.path()).is_ok_and(|bytes| has_bom(&bytes)))
        .map(|e| e.into_path())
        .collect();
    found.sort();
    found
}

/// Rewrite `path` without its BOM. Returns whether anything changed.
pub fn strip_bom(path: &Path) -> io::Result<bool> {
    let bytes = fs::read(path)?;
    match bytes.strip_prefix(UTF8_BOM) {
        Some(rest) => {
            fs::write(path, rest)?;
            Ok(true)
        }
        None => Ok(false),
    }
}
