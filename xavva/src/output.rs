use std::fmt::Display;
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use xavva_core::{Rendered, Tone};

static VERBOSE: AtomicBool = AtomicBool::new(false);

pub fn brand_accent<D: Display>(value: D) -> console::StyledObject<D> {
    style(value).magenta()
}

pub fn brand_secondary<D: Display>(value: D) -> console::StyledObject<D> {
    style(value).cyan()
}

pub fn brand_fg<D: Display>(value: D) -> console::StyledObject<D> {
    style(value)
}

pub fn brand_muted<D: Display>(value: D) -> console::StyledObject<D> {
    style(value).dim()
}

pub fn brand_success<D: Display>(value: D) -> console::StyledObject<D> {
    style(value).green()
}

pub fn brand_warning<D: Display>(value: D) -> console::StyledObject<D> {
    style(value).yellow()
}

pub fn brand_error<D: Display>(value: D) -> console::StyledObject<D> {
    style(value).red()
}

pub fn set_verbose(verbose: bool) {
    VERBOSE.store(verbose, Ordering::Relaxed);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

pub fn is_interactive() -> bool {
    std::io::stdout().is_terminal() && std::io::stderr().is_terminal()
}

pub fn section(title: &str) {
    println!();
    println!("{}", brand_accent(title).bold());
}

pub fn step(message: &str) {
    println!("{} {}", brand_secondary("•").bold(), brand_fg(message));
}

pub fn success(message: &str) {
    println!("{} {}", brand_success("✓").bold(), brand_fg(message));
}

pub fn warning(message: &str) {
    println!("{} {}", brand_warning("!").bold(), brand_fg(message));
}

pub fn error(message: &str) {
    println!("{} {}", brand_error("✗").bold(), brand_fg(message));
}

pub fn error_stderr(message: &str) {
    eprintln!("{} {}", brand_error("✗").bold(), brand_fg(message));
}

pub fn muted(message: &str) {
    println!("{}", brand_muted(message));
}

/// `  label  value` row used by summaries and `doctor`.
pub fn info(label: &str, value: impl Display) {
    println!("  {:<12} {}", brand_muted(label), value);
}

/// Print a classified log line.
pub fn rendered(line: &Rendered) {
    let text = match line.tone {
        Tone::Success => brand_success(&line.text).bold().to_string(),
        Tone::Muted => brand_muted(&line.text).to_string(),
        Tone::Info => brand_secondary(&line.text).to_string(),
        Tone::Warning => brand_warning(&line.text).to_string(),
        Tone::Error => brand_error(&line.text).bold().to_string(),
    };
    println!("  {text}");
    if let Some(detail) = &line.detail {
        println!("    {}", brand_fg(detail));
    }
    if let Some(hint) = line.hint {
        println!("    {} {}", brand_warning("hint:"), brand_muted(hint));
    }
}

/// A steady-ticking spinner, hidden when output is not a terminal.
pub struct Spinner {
    bar: ProgressBar,
}

impl Spinner {
    pub fn start(message: impl Into<String>) -> Self {
        let bar = if is_interactive() {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        if let Ok(spinner_style) =
            ProgressStyle::default_spinner().template("{spinner:.cyan} {msg} [{elapsed}]")
        {
            bar.set_style(spinner_style);
        }
        bar.set_message(message.into());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.bar.set_message(message.into());
    }

    /// Print a line above the spinner without tearing it.
    pub fn println(&self, line: impl AsRef<str>) {
        if self.bar.is_hidden() {
            println!("{}", line.as_ref());
        } else {
            self.bar.println(line.as_ref());
        }
    }

    /// Run `f` with the spinner hidden, for printing whole lines.
    pub fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        self.bar.suspend(f)
    }

    pub fn succeed(self, message: &str) {
        self.bar.finish_and_clear();
        success(message);
    }

    pub fn fail(self, message: &str) {
        self.bar.finish_and_clear();
        error(message);
    }

    pub fn clear(self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_round_trip() {
        set_verbose(false);
        assert!(!is_verbose());

        set_verbose(true);
        assert!(is_verbose());
        set_verbose(false);
    }

    #[test]
    fn spinner_hides_itself_without_a_terminal() {
        let spinner = Spinner::start("Building");
        assert_eq!(spinner.bar.is_hidden(), !is_interactive());
        spinner.clear();
    }
}
