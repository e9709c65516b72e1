use std::path::{Component, Path, PathBuf};

use super::error::{ConfigError, Result};
use super::xavva_toml::{BuildTool, XavvaToml};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_WEBAPPS: &str = "webapps";

/// Values taken from the command line. Boolean flags can only switch a
/// setting on; an absent flag defers to the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub tomcat_path: Option<PathBuf>,
    pub build_tool: Option<BuildTool>,
    pub app_name: Option<String>,
    pub port: Option<u16>,
    pub profile: Option<String>,
    pub grep: Option<String>,
    pub skip_build: bool,
    /// `--scan` turns jar scanning back on.
    pub scan: bool,
    pub clean_logs: bool,
    pub quiet: bool,
    pub verbose: bool,
    pub debug: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TomcatSettings {
    pub path: Option<PathBuf>,
    pub port: u16,
    pub webapps: String,
    pub grep: Option<String>,
}

impl TomcatSettings {
    /// The Tomcat installation directory, which must exist.
    pub fn home(&self) -> Result<&Path> {
        let path = self.path.as_deref().ok_or(ConfigError::TomcatNotConfigured)?;
        if !path.is_dir() {
            return Err(ConfigError::TomcatNotFound(path.to_path_buf()));
        }
        Ok(path)
    }

    pub fn webapps_dir(&self) -> Result<PathBuf> {
        Ok(self.home()?.join(&self.webapps))
    }

    /// Compiled JSP cache of one context.
    pub fn jsp_work_dir(&self, context: &str) -> Result<PathBuf> {
        Ok(self
            .home()?
            .join("work")
            .join("Catalina")
            .join("localhost")
            .join(context))
    }

    pub fn logs_dir(&self) -> Result<PathBuf> {
        Ok(self.home()?.join("logs"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSettings {
    pub app_name: Option<String>,
    pub build_tool: BuildTool,
    pub profile: Option<String>,
    pub skip_build: bool,
    pub skip_scan: bool,
    pub clean_logs: bool,
    pub quiet: bool,
    pub verbose: bool,
    pub debug: bool,
}

impl ProjectSettings {
    /// Context path from the configured name, `.war` suffix removed.
    pub fn context_name(&self) -> Result<Option<String>> {
        let Some(name) = self.app_name.as_deref() else {
            return Ok(None);
        };
        let name = name.strip_suffix(".war").unwrap_or(name);
        validate_context_name(name)?;
        Ok(Some(name.to_string()))
    }
}

/// A context name must be one plain directory under `webapps/`.
pub fn validate_context_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    let mut components = Path::new(trimmed).components();
    let single_normal = matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none();
    if trimmed.is_empty() || trimmed.contains(['/', '\\']) || !single_normal {
        return Err(ConfigError::Validation(format!(
            "Invalid app name '{name}': expected a single folder name under webapps"
        )));
    }
    Ok(())
}

/// Fully resolved settings, read-only after startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub project_dir: PathBuf,
    pub tomcat: TomcatSettings,
    pub project: ProjectSettings,
}

impl AppConfig {
    /// Load the config file from `project_dir` and merge it with the CLI.
    pub fn load(project_dir: &Path, cli: &CliOverrides) -> Result<Self> {
        let file = XavvaToml::load_from_dir(project_dir)?;
        let catalina_home = std::env::var_os("CATALINA_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let config = Self::resolve(project_dir, file.unwrap_or_default(), cli, catalina_home);
        config.project.context_name()?;
        Ok(config)
    }

    /// Precedence: CLI flag, then config file, then default.
    pub fn resolve(
        project_dir: &Path,
        file: XavvaToml,
        cli: &CliOverrides,
        catalina_home: Option<PathBuf>,
    ) -> Self {
        let XavvaToml { tomcat, project } = file;

        let tomcat = TomcatSettings {
            path: cli.tomcat_path.clone().or(tomcat.path).or(catalina_home),
            port: cli.port.or(tomcat.port).unwrap_or(DEFAULT_PORT),
            webapps: tomcat
                .webapps
                .filter(|w| !w.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_WEBAPPS.to_string()),
            grep: cli
                .grep
                .clone()
                .or(tomcat.grep)
                .filter(|g| !g.trim().is_empty()),
        };

        let build_tool = cli
            .build_tool
            .or(project.build_tool)
            .or_else(|| BuildTool::detect(project_dir))
            .unwrap_or_default();

        let project = ProjectSettings {
            app_name: cli
                .app_name
                .clone()
                .or(project.app_name)
                .filter(|n| !n.trim().is_empty()),
            build_tool,
            profile: cli
                .profile
                .clone()
                .or(project.profile)
                .filter(|p| !p.trim().is_empty()),
            skip_build: cli.skip_build || project.skip_build.unwrap_or(false),
            skip_scan: !cli.scan && project.skip_scan.unwrap_or(true),
            clean_logs: cli.clean_logs || project.clean_logs.unwrap_or(false),
            quiet: cli.quiet || project.quiet.unwrap_or(false),
            verbose: cli.verbose || project.verbose.unwrap_or(false),
            debug: cli.debug || project.debug.unwrap_or(false),
        };

        Self {
            project_dir: project_dir.to_path_buf(),
            tomcat,
            project,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.tomcat.port)
    }

    pub fn app_url(&self, context: &str) -> String {
        format!("{}/{}/", self.base_url(), context)
    }
}
