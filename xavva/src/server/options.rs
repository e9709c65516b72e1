//! Catalina launch options and environment.

use std::path::{Path, PathBuf};

pub const JPDA_ADDRESS: &str = "5005";
pub const JPDA_TRANSPORT: &str = "dt_socket";

/// Packages opened to the hot-swap agent.
pub const ADD_OPENS: &[&str] = &[
    "java.base/jdk.internal.loader",
    "java.base/java.lang",
    "java.base/java.io",
    "java.base/java.net",
    "java.base/java.util",
    "java.base/java.util.concurrent",
    "java.base/java.security",
    "java.base/jdk.internal.reflect",
    "java.base/java.lang.reflect",
    "java.base/sun.nio.ch",
    "java.base/java.util.jar",
    "java.desktop/java.beans",
];

/// System properties that stop Tomcat from scanning jars on startup.
pub const JAR_SCAN_SKIP: &[&str] = &[
    "-Dtomcat.util.scan.StandardJarScanFilter.jarsToSkip=*.jar",
    "-Dtomcat.util.scan.StandardJarScanFilter.jarsToScan=",
    "-Dorg.apache.catalina.startup.ContextConfig.jarsToSkip=*.jar",
    "-Dorg.apache.catalina.startup.TldConfig.jarsToSkip=*.jar",
    "-Dorg.apache.tomcat.util.scan.StandardJarScanFilter.jarsToSkip=*.jar",
    "-Dorg.apache.catalina.startup.ContextConfig.jarsToScan=",
];

/// Hot-swap agent ready to be attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSetup {
    pub jar: PathBuf,
    pub properties: PathBuf,
    pub enhanced_redefinition: bool,
}

/// JVM options added to `CATALINA_OPTS`.
pub fn catalina_opts(agent: Option<&AgentSetup>, skip_scan: bool) -> Vec<String> {
    let mut opts = Vec::new();
    if let Some(agent) = agent {
        opts.push(format!("-javaagent:{}", agent.jar.display()));
        if agent.enhanced_redefinition {
            opts.push("-XX:+AllowEnhancedClassRedefinition".to_string());
        }
        opts.extend(
            ADD_OPENS
                .iter()
                .map(|module| format!("--add-opens={module}=ALL-UNNAMED")),
        );
        opts.push(format!(
            "-Dhotswap-agent.properties.path={}",
            agent.properties.display()
        ));
    }
    if skip_scan {
        opts.extend(JAR_SCAN_SKIP.iter().map(|s| s.to_string()));
    }
    opts
}

/// Everything needed to spawn catalina.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl LaunchPlan {
    pub fn new(
        tomcat_home: &Path,
        debug: bool,
        opts: &[String],
        inherited_opts: Option<&str>,
        java_home: Option<&str>,
    ) -> Self {
        let script = if cfg!(windows) {
            "catalina.bat"
        } else {
            "catalina.sh"
        };
        let program = tomcat_home.join("bin").join(script);

        let args = if debug {
            vec!["jpda".to_string(), "run".to_string()]
        } else {
            vec!["run".to_string()]
        };

        let mut catalina_opts: Vec<&str> = Vec::new();
        if let Some(inherited) = inherited_opts.map(str::trim).filter(|s| !s.is_empty()) {
            catalina_opts.push(inherited);
        }
        catalina_opts.extend(opts.iter().map(String::as_str));

        let mut env = vec![
            (
                "CATALINA_HOME".to_string(),
                tomcat_home.display().to_string(),
            ),
            ("CATALINA_OPTS".to_string(), catalina_opts.join(" ")),
        ];
        if let Some(java_home) = java_home.filter(|s| !s.is_empty()) {
            env.push(("JAVA_HOME".to_string(), java_home.to_string()));
            env.push(("JRE_HOME".to_string(), java_home.to_string()));
        }
        if debug {
            env.push(("JPDA_ADDRESS".to_string(), JPDA_ADDRESS.to_string()));
            env.push(("JPDA_TRANSPORT".to_string(), JPDA_TRANSPORT.to_string()));
        }

        Self { program, args, env }
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}
