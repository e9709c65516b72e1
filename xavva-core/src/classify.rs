//! Log line classification for build tool and Tomcat output.
//!
//! Classification is a prioritized rule table: each [`Rule`] pairs a pattern
//! with a constructor, rules are tried in order and the first one that
//! produces a [`LineClass`] wins. Rendering produces plain data
//! ([`Rendered`]); mapping tones to terminal colors is the caller's job.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Substring that marks a completed Tomcat startup.
pub const STARTUP_MARKER: &str = "Server startup in";

/// Substrings of lines that carry no information for a developer.
pub const SYSTEM_NOISE: &[&str] = &[
    "Using CATALINA_",
    "Using JRE_HOME",
    "Using CLASSPATH",
    "NOTE: Picked up JDK_JAVA_OPTIONS",
    "Command line argument",
    "VersionLoggerListener",
    "Scanning for projects...",
    "Building ",
    "--- ",
    "+++ ",
    "DEBUG: ",
    "org.apache.catalina.core.AprLifecycleListener",
    "org.apache.coyote.AbstractProtocol.init",
    "org.apache.catalina.startup.Catalina.load",
    "org.apache.jasper.servlet.TldScanner.scanJars",
    "Listening for transport dt_socket",
    "org.apache.catalina.startup.ExpandWar.expand",
    "org.apache.catalina.startup.ContextConfig.configureStart",
    "SLF4J: ",
    "org.glassfish.jersey.internal.Errors.logErrors",
    "contains empty path annotation",
    "org.apache.catalina.core.StandardContext.setPath",
    "milliseconds",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn from_label(label: &str) -> Self {
        match label {
            "WARN" | "WARNING" => LogLevel::Warn,
            "ERROR" | "SEVERE" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// What a single output line means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass {
    /// Tomcat finished starting; `millis` is absent when the number is unreadable.
    Startup { millis: Option<u64> },
    /// Suppressed entirely.
    Noise,
    /// `[ERROR] /path/Foo.java:[12,5] message`
    CompilerError {
        file: String,
        line: u32,
        column: u32,
        message: String,
    },
    /// A leveled log line with the logger prefix removed.
    Level { level: LogLevel, message: String },
    /// Part of a stack trace. `framework` frames are rendered dimmed.
    StackFrame { text: String, framework: bool },
    /// Nothing recognizable.
    Other,
}

type Classifier = fn(&Captures<'_>, &str) -> Option<LineClass>;

/// One entry of the classification table.
pub struct Rule {
    pub name: &'static str,
    pattern: Regex,
    classify: Classifier,
}

impl Rule {
    fn new(name: &'static str, pattern: &str, classify: Classifier) -> Option<Self> {
        Some(Self {
            name,
            pattern: Regex::new(pattern).ok()?,
            classify,
        })
    }

    /// Apply this rule alone; `None` when it does not match or declines.
    pub fn apply(&self, line: &str) -> Option<LineClass> {
        let caps = self.pattern.captures(line)?;
        (self.classify)(&caps, line)
    }
}

static LOGGER_PREFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?:org\.apache|com\.sun|java\.\S*?)\.[A-Za-z0-9.]+\s").ok());

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    let noise = SYSTEM_NOISE
        .iter()
        .map(|s| regex::escape(s))
        .collect::<Vec<_>>()
        .join("|");

    [
        Rule::new("startup", r"Server startup in\s*\[?([\d,.]*)\]?", |caps, _| {
            let digits: String = caps
                .get(1)
                .map(|m| m.as_str().chars().filter(char::is_ascii_digit).collect())
                .unwrap_or_default();
            Some(LineClass::Startup {
                millis: digits.parse().ok(),
            })
        }),
        Rule::new(
            "bare_level",
            r"^\s*\[(?:INFO|WARN|WARNING|ERROR)\]\s*$",
            |_, _| Some(LineClass::Noise),
        ),
        Rule::new(
            "build_summary",
            r"^\s*\[\w+\]\s+(?:Total time:|Finished at:|Final Memory:|-{5,})",
            |_, _| Some(LineClass::Noise),
        ),
        Rule::new("system_noise", &noise, |_, _| Some(LineClass::Noise)),
        Rule::new(
            "compiler_error",
            r"^\s*\[ERROR\]\s+(.*\.java):\[(\d+),(\d+)\]\s+(.*)$",
            |caps, _| {
                Some(LineClass::CompilerError {
                    file: caps[1].to_string(),
                    line: caps[2].parse().ok()?,
                    column: caps[3].parse().ok()?,
                    message: caps[4].trim().to_string(),
                })
            },
        ),
        Rule::new(
            "bracket_level",
            r"^\s*\[(INFO|WARNING|WARN|SEVERE|ERROR)\]\s+(.*)$",
            |caps, _| Some(level_line(&caps[1], &caps[2])),
        ),
        Rule::new(
            "tomcat_level",
            r"^\S+\s+\S+\s+(INFO|WARNING|WARN|SEVERE|ERROR)\s+\[[^\]]*\]\s+\S+\s+(.*)$",
            |caps, _| Some(level_line(&caps[1], &caps[2])),
        ),
        Rule::new(
            "stack_frame",
            r"^\s*(?:at\s|Caused by|\.\.\.\s\d+)|Exception",
            |_, line| {
                let text = line.trim().to_string();
                let framework = ["org.apache", "java.base", "sun.reflect"]
                    .iter()
                    .any(|p| text.contains(p));
                Some(LineClass::StackFrame { text, framework })
            },
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
});

fn level_line(label: &str, message: &str) -> LineClass {
    let message = match LOGGER_PREFIX.as_ref() {
        Some(prefix) => prefix.replace(message, ""),
        None => message.into(),
    };
    let message = message.trim();
    if message.is_empty() || message == "]" || message.contains("Compilation failure") {
        return LineClass::Noise;
    }
    LineClass::Level {
        level: LogLevel::from_label(label),
        message: message.to_string(),
    }
}

/// The classification table, in evaluation order.
pub fn rules() -> &'static [Rule] {
    &RULES
}

/// Classify one line by the first matching rule.
pub fn classify(line: &str) -> LineClass {
    RULES
        .iter()
        .find_map(|rule| rule.apply(line))
        .unwrap_or(LineClass::Other)
}

pub fn is_system_noise(line: &str) -> bool {
    SYSTEM_NOISE.iter().any(|n| line.contains(n))
}

/// Lines that survive quiet mode and grep filtering.
pub fn is_essential(line: &str) -> bool {
    let trimmed = line.trim_start();
    line.contains("SEVERE")
        || line.contains("ERROR")
        || line.contains("Exception")
        || line.contains("Caused by")
        || line.contains(STARTUP_MARKER)
        || trimmed.starts_with("at ")
        || trimmed.starts_with("... ")
}

/// Lines that indicate the server is in trouble.
pub fn is_severe(line: &str) -> bool {
    line.contains("SEVERE") || line.contains("Exception")
}

/// A short hint for common javac failures.
pub fn compiler_hint(message: &str) -> Option<&'static str> {
    if message.contains("unmappable character") || message.contains("encoding") {
        Some("Encoding mismatch: the file uses a different charset than the build is configured for.")
    } else if message.contains("illegal character") {
        Some("Invisible or invalid character: check the top of the file for a BOM or stray bytes.")
    } else if message.contains("cannot find symbol") {
        Some("Symbol not found: check the import or whether the dependency is declared.")
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Success,
    Muted,
    Info,
    Warning,
    Error,
}

/// A console-independent rendering of a classified line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub tone: Tone,
    pub text: String,
    /// Second line shown under `text`, e.g. the compiler message.
    pub detail: Option<String>,
    pub hint: Option<&'static str>,
}

impl Rendered {
    fn line(tone: Tone, text: impl Into<String>) -> Self {
        Self {
            tone,
            text: text.into(),
            detail: None,
            hint: None,
        }
    }
}

impl LineClass {
    /// Render for clean output; `None` means the line is not shown.
    pub fn render(&self) -> Option<Rendered> {
        match self {
            LineClass::Startup { millis } => {
                let elapsed = millis.map_or_else(|| "???".to_string(), |ms| ms.to_string());
                Some(Rendered::line(
                    Tone::Success,
                    format!("Tomcat ready in {elapsed} ms"),
                ))
            }
            LineClass::CompilerError {
                file,
                line,
                message,
                ..
            } => {
                let name = file.rsplit(['/', '\\']).next().unwrap_or(file);
                Some(Rendered {
                    tone: Tone::Error,
                    text: format!("ERROR in {name}:{line}"),
                    detail: Some(message.clone()),
                    hint: compiler_hint(message),
                })
            }
            LineClass::Level { level, message } => Some(match level {
                LogLevel::Info => Rendered::line(Tone::Muted, format!("ℹ {message}")),
                LogLevel::Warn => Rendered::line(Tone::Warning, format!("⚠ {message}")),
                LogLevel::Error => Rendered::line(Tone::Error, format!("✘ {message}")),
            }),
            LineClass::StackFrame { text, framework } => Some(Rendered::line(
                if *framework { Tone::Muted } else { Tone::Warning },
                format!("   {text}"),
            )),
            LineClass::Noise | LineClass::Other => None,
        }
    }
}

/// What to do with one line of server output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutput {
    Raw(String),
    Styled(Rendered),
    Hidden,
}

/// Display policy for the Tomcat log stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogView {
    pub verbose: bool,
    pub clean: bool,
    pub quiet: bool,
    pub grep: Option<String>,
}

impl LogView {
    pub fn decide(&self, line: &str) -> LineOutput {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("Listening for transport") {
            return LineOutput::Hidden;
        }
        if self.verbose || !self.clean {
            return LineOutput::Raw(trimmed.to_string());
        }

        let startup = trimmed.contains(STARTUP_MARKER);
        let essential = is_essential(trimmed);
        if !startup && is_system_noise(trimmed) {
            return LineOutput::Hidden;
        }
        if self.quiet && !essential && trimmed.contains("INFO") {
            return LineOutput::Hidden;
        }
        if let Some(grep) = self.grep.as_deref().filter(|g| !g.is_empty())
            && !essential
            && !trimmed.to_lowercase().contains(&grep.to_lowercase())
        {
            return LineOutput::Hidden;
        }

        match classify(trimmed).render() {
            Some(rendered) => LineOutput::Styled(rendered),
            None => LineOutput::Hidden,
        }
    }
}
