use std::env::current_dir;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{BuildTool, CONFIG_FILE, CONFIG_TEMPLATE, ConfigError};
use crate::output;
use crate::paths::STATE_DIR;

pub fn run(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let project_dir = current_dir()?;
    let tomcat = std::env::var_os("CATALINA_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);

    let outcome = init_project(&project_dir, force, tomcat.as_deref())?;
    output::success(&format!("Created {}", outcome.config.display()));
    output::info("build tool", outcome.build_tool);
    if outcome.gitignore_updated {
        output::step(&format!("Added {STATE_DIR}/ to .gitignore"));
    }
    if tomcat.is_none() {
        output::muted("Set [tomcat].path in xavva.toml or export CATALINA_HOME");
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
pub struct InitOutcome {
    pub config: PathBuf,
    pub build_tool: BuildTool,
    pub gitignore_updated: bool,
}

/// The commented template with the detected tool and Tomcat filled in.
pub fn render_template(tool: BuildTool, tomcat: Option<&Path>) -> String {
    let mut text = CONFIG_TEMPLATE.replace(
        "build_tool = \"maven\"",
        &format!("build_tool = \"{}\"", tool.as_str()),
    );
    if let Some(tomcat) = tomcat {
        let path = tomcat.display().to_string().replace('\\', "/");
        text = text.replace(
            "# path = \"/opt/apache-tomcat-10.1\"",
            &format!("path = \"{path}\""),
        );
    }
    text
}

pub fn init_project(
    project_dir: &Path,
    force: bool,
    tomcat: Option<&Path>,
) -> Result<InitOutcome, ConfigError> {
    let config = project_dir.join(CONFIG_FILE);
    if config.exists() && !force {
        return Err(ConfigError::Validation(format!(
            "{CONFIG_FILE} already exists. Use --force to overwrite."
        )));
    }

    let build_tool = BuildTool::detect(project_dir).unwrap_or_default();
    fs::write(&config, render_template(build_tool, tomcat))
        .map_err(|e| ConfigError::FileWrite(config.clone(), e))?;

    let gitignore_updated = ignore_state_dir(project_dir)?;
    Ok(InitOutcome {
        config,
        build_tool,
        gitignore_updated,
    })
}

/// Append `.xavva/` to an existing `.gitignore` that lacks it.
fn ignore_state_dir(project_dir: &Path) -> Result<bool, ConfigError> {
    let path = project_dir.join(".gitignore");
    let Ok(current) = fs::read_to_string(&path) else {
        return Ok(false);
    };
    let entry = format!("{STATE_DIR}/");
    let present = current
        .lines()
        .map(str::trim)
        .any(|line| line == entry || line == STATE_DIR || line == format!("/{entry}"));
    if present {
        return Ok(false);
    }

    let mut updated = current;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(&entry);
    updated.push('\n');
    fs::write(&path, updated).map_err(|e| ConfigError::FileWrite(path, e))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::XavvaToml;
    use tempfile::TempDir;

    #[test]
    fn writes_parseable_template_with_detected_tool() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("build.gradle.kts"), "").unwrap();

        let outcome = init_project(dir.path(), false, Some(Path::new("/opt/tomcat"))).unwrap();
        assert_eq!(outcome.build_tool, BuildTool::Gradle);
        assert!(!outcome.gitignore_updated);

        let parsed = XavvaToml::load_from_dir(dir.path()).unwrap().unwrap();
        assert_eq!(parsed.project.build_tool, Some(BuildTool::Gradle));
        assert_eq!(parsed.tomcat.path, Some(PathBuf::from("/opt/tomcat")));
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "# mine\n").unwrap();
        assert!(matches!(
            init_project(dir.path(), false, None),
            Err(ConfigError::Validation(_))
        ));
        assert_eq!(
            fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap(),
            "# mine\n"
        );

        init_project(dir.path(), true, None).unwrap();
        assert!(
            fs::read_to_string(dir.path().join(CONFIG_FILE))
                .unwrap()
                .contains("[project]")
        );
    }

    #[test]
    fn appends_state_dir_to_gitignore_once() {
        let dir = TempDir::new().unwrap();
        let gitignore = dir.path().join(".gitignore");
        fs::write(&gitignore, "target/").unwrap();

        assert!(init_project(dir.path(), false, None).unwrap().gitignore_updated);
        assert_eq!(fs::read_to_string(&gitignore).unwrap(), "target/\n.xavva/\n");

        assert!(!init_project(dir.path(), true, None).unwrap().gitignore_updated);
        assert_eq!(fs::read_to_string(&gitignore).unwrap(), "target/\n.xavva/\n");
    }
}
