use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::commands;
use crate::config::{BuildTool, CliOverrides};

/// Xavva - build, deploy and hot-reload Java web apps on Tomcat
#[derive(Parser)]
#[command(name = "xavva")]
#[command(version, disable_version_flag = true)]
#[command(about = "Xavva - build, deploy and hot-reload Java web apps on Tomcat")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Show version
    #[arg(long, global = true)]
    pub version: bool,

    /// Stream every build and server line unmodified
    #[arg(short = 'V', long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub project: ProjectArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Flags shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct ProjectArgs {
    /// Tomcat installation directory (defaults to CATALINA_HOME)
    #[arg(short = 'p', long = "path", value_name = "TOMCAT", global = true)]
    pub tomcat_path: Option<PathBuf>,

    /// Build tool
    #[arg(short = 't', long = "tool", value_enum, global = true)]
    pub tool: Option<BuildTool>,

    /// Application name (context path)
    #[arg(short = 'n', long = "name", value_name = "APP", global = true)]
    pub name: Option<String>,

    /// Tomcat HTTP port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Skip the build and deploy the existing artifact
    #[arg(short = 's', long = "no-build", global = true)]
    pub no_build: bool,

    /// Let Tomcat scan jars for TLDs and annotations
    #[arg(long, global = true)]
    pub scan: bool,

    /// Summarize build and server logs
    #[arg(short = 'c', long, global = true)]
    pub clean: bool,

    /// Hide informational lines
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Enable JPDA debugging and the hot-swap agent
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Watch sources and redeploy incrementally
    #[arg(short = 'w', long, global = true)]
    pub watch: bool,

    /// Build profile
    #[arg(short = 'P', long, value_name = "NAME", global = true)]
    pub profile: Option<String>,

    /// Only show server lines containing this text
    #[arg(short = 'G', long, value_name = "TEXT", global = true)]
    pub grep: Option<String>,
}

impl ProjectArgs {
    pub fn overrides(&self, verbose: bool) -> CliOverrides {
        CliOverrides {
            tomcat_path: self.tomcat_path.clone(),
            build_tool: self.tool,
            app_name: self.name.clone(),
            port: self.port,
            profile: self.profile.clone(),
            grep: self.grep.clone(),
            skip_build: self.no_build,
            scan: self.scan,
            clean_logs: self.clean,
            quiet: self.quiet,
            verbose,
            debug: self.debug,
        }
    }

    /// `dev` turns on watching, debugging and compact logs.
    pub fn for_dev(mut self) -> Self {
        self.watch = true;
        self.debug = true;
        self.clean = true;
        self.quiet = true;
        self
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Build, deploy and start Tomcat (default)
    Deploy,
    /// Run the build only
    Build,
    /// Start Tomcat with whatever is deployed
    Start,
    /// Watch mode with debugging, hot reload and compact logs
    Dev,
    /// Check the local Java, Tomcat and build tool setup
    Doctor {
        /// Strip UTF-8 byte order marks from Java sources
        #[arg(long)]
        fix: bool,
    },
    /// Follow Tomcat's catalina.out
    Logs,
    /// Compile and run a class with a main method
    Run {
        /// Simple or fully-qualified class name (defaults to the last one run)
        #[arg(value_name = "CLASS")]
        class: Option<String>,
    },
    /// Like run, but suspended until a debugger attaches on port 5005
    Debug {
        /// Simple or fully-qualified class name (defaults to the last one run)
        #[arg(value_name = "CLASS")]
        class: Option<String>,
    },
    /// Look up known vulnerabilities for the bundled jars
    Audit,
    /// Create xavva.toml in the current directory
    Init {
        /// Overwrite an existing xavva.toml
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        if self.version {
            println!("{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }

        let verbose = self.verbose;
        let command = self.command.unwrap_or(Commands::Deploy);
        let project = match command {
            Commands::Dev => self.project.for_dev(),
            _ => self.project,
        };
        let watch = project.watch;
        let overrides = project.overrides(verbose);

        match command {
            Commands::Init { force } => commands::init::run(force),
            Commands::Deploy | Commands::Dev => {
                let rt = tokio::runtime::Runtime::new()?;
                rt.block_on(commands::deploy::run(&overrides, watch))
            }
            Commands::Build => {
                let rt = tokio::runtime::Runtime::new()?;
                rt.block_on(commands::build::run(&overrides))
            }
            Commands::Start => {
                let rt = tokio::runtime::Runtime::new()?;
                rt.block_on(commands::start::run(&overrides))
            }
            Commands::Doctor { fix } => {
                let rt = tokio::runtime::Runtime::new()?;
                rt.block_on(commands::doctor::run(&overrides, fix))
            }
            Commands::Logs => {
                let rt = tokio::runtime::Runtime::new()?;
                rt.block_on(commands::logs::run(&overrides))
            }
            Commands::Run { class } => {
                let rt = tokio::runtime::Runtime::new()?;
                rt.block_on(commands::run::run(&overrides, class.as_deref(), false))
            }
            Commands::Debug { class } => {
                let rt = tokio::runtime::Runtime::new()?;
                rt.block_on(commands::run::run(&overrides, class.as_deref(), true))
            }
            Commands::Audit => {
                let rt = tokio::runtime::Runtime::new()?;
                rt.block_on(commands::audit::run(&overrides))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn no_subcommand_means_deploy() {
        let cli = Cli::try_parse_from(["xavva"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.command.unwrap_or(Commands::Deploy), Commands::Deploy);
    }

    #[test]
    fn short_flags_parse_before_and_after_subcommand() {
        let cli = Cli::try_parse_from([
            "xavva", "-p", "/opt/tomcat", "deploy", "-t", "gradle", "-n", "shop", "-P", "dev",
        ])
        .unwrap();
        assert_eq!(cli.command, Some(Commands::Deploy));
        assert_eq!(
            cli.project.tomcat_path.as_deref(),
            Some(std::path::Path::new("/opt/tomcat"))
        );
        assert_eq!(cli.project.tool, Some(BuildTool::Gradle));
        assert_eq!(cli.project.name.as_deref(), Some("shop"));
        assert_eq!(cli.project.profile.as_deref(), Some("dev"));
    }

    #[test]
    fn boolean_flags_parse() {
        let cli =
            Cli::try_parse_from(["xavva", "-s", "-c", "-q", "-d", "-w", "--scan", "-V"]).unwrap();
        let p = &cli.project;
        assert!(p.no_build && p.clean && p.quiet && p.debug && p.watch && p.scan);
        assert!(cli.verbose);
    }

    #[test]
    fn grep_and_port_parse() {
        let cli = Cli::try_parse_from(["xavva", "start", "--port", "9090", "-G", "orders"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Start));
        assert_eq!(cli.project.port, Some(9090));
        assert_eq!(cli.project.grep.as_deref(), Some("orders"));
    }

    #[test]
    fn dev_implies_watch_debug_clean_quiet() {
        let project = ProjectArgs::default().for_dev();
        assert!(project.watch && project.debug && project.clean && project.quiet);
        let overrides = project.overrides(false);
        assert!(overrides.debug && overrides.clean_logs && overrides.quiet);
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let res = Cli::try_parse_from(["xavva", "-t", "ant"]);
        assert!(res.is_err());
    }

    #[test]
    fn run_and_debug_take_optional_class() {
        let cli = Cli::try_parse_from(["xavva", "run", "Main"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Run {
                class: Some("Main".to_string())
            })
        );
        let cli = Cli::try_parse_from(["xavva", "debug"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Debug { class: None }));
    }

    #[test]
    fn doctor_fix_and_init_force_parse() {
        let cli = Cli::try_parse_from(["xavva", "doctor", "--fix"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Doctor { fix: true }));
        let cli = Cli::try_parse_from(["xavva", "init", "--force"]).unwrap();
        assert_eq!(cli.command, Some(Commands::Init { force: true }));
    }

    #[test]
    fn version_flag_is_long_only() {
        let cli = Cli::try_parse_from(["xavva", "--version"]).unwrap();
        assert!(cli.version);
        assert!(Cli::try_parse_from(["xavva", "-v"]).is_err());
    }
}
