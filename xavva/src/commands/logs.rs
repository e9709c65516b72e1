use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use xavva_core::{LineSplitter, is_severe};

use crate::config::CliOverrides;
use crate::output;

use super::load_config;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const LOG_FILE: &str = "catalina.out";

/// Follow `catalina.out` from its current end until Ctrl+C.
pub async fn run(overrides: &CliOverrides) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(overrides)?;
    let path = config.tomcat.logs_dir()?.join(LOG_FILE);
    if !path.is_file() {
        return Err(format!("{} does not exist yet; start Tomcat first", path.display()).into());
    }

    let grep = config.tomcat.grep.clone();
    output::section("Logs");
    output::step(&format!(
        "Following {} (Ctrl+C to stop)",
        output::brand_accent(path.display())
    ));
    if let Some(grep) = &grep {
        output::info("filter", grep);
    }

    let mut tail = Tail::at_end(&path).await?;
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let poll = tail.poll().await?;
                if poll.restarted {
                    output::muted("Log file was truncated or rotated, reading from the start");
                }
                for line in poll.lines {
                    if matches_grep(&line, grep.as_deref()) {
                        println!("{}", colorize(&line));
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                return Ok(());
            }
        }
    }
}

pub fn matches_grep(line: &str, grep: Option<&str>) -> bool {
    match grep.filter(|g| !g.is_empty()) {
        Some(grep) => line.to_lowercase().contains(&grep.to_lowercase()),
        None => true,
    }
}

fn colorize(line: &str) -> String {
    if is_severe(line) || line.contains("ERROR") {
        output::brand_error(line).to_string()
    } else if line.contains("WARN") {
        output::brand_warning(line).to_string()
    } else if line.trim_start().starts_with("at ") {
        output::brand_muted(line).to_string()
    } else {
        line.to_string()
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Poll {
    pub lines: Vec<String>,
    /// The file shrank since the last poll.
    pub restarted: bool,
}

/// Incremental reader over a growing file.
pub struct Tail {
    path: PathBuf,
    offset: u64,
    splitter: LineSplitter,
}

impl Tail {
    pub async fn at_end(path: &Path) -> std::io::Result<Self> {
        let offset = tokio::fs::metadata(path).await?.len();
        Ok(Self {
            path: path.to_path_buf(),
            offset,
            splitter: LineSplitter::new(),
        })
    }

    pub async fn poll(&mut self) -> std::io::Result<Poll> {
        let mut poll = Poll::default();
        let len = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(poll),
            Err(e) => return Err(e),
        };
        if len < self.offset {
            self.offset = 0;
            self.splitter = LineSplitter::new();
            poll.restarted = true;
        }
        if len == self.offset {
            return Ok(poll);
        }

        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut buf = Vec::new();
        let read = file.read_to_end(&mut buf).await?;
        self.offset += read as u64;
        poll.lines = self.splitter.push(&buf);
        Ok(poll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn append(path: &Path, text: &str) {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[test]
    fn grep_is_case_insensitive() {
        assert!(matches_grep("INFO OrderService started", Some("orderservice")));
        assert!(!matches_grep("INFO Cart", Some("order")));
        assert!(matches_grep("anything", None));
        assert!(matches_grep("anything", Some("")));
    }

    #[tokio::test]
    async fn tail_starts_at_end_and_follows_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalina.out");
        std::fs::write(&path, "old line\n").unwrap();

        let mut tail = Tail::at_end(&path).await.unwrap();
        assert!(tail.poll().await.unwrap().lines.is_empty());

        append(&path, "first\nsecond par");
        assert_eq!(tail.poll().await.unwrap().lines, vec!["first"]);
        append(&path, "tial\n");
        assert_eq!(tail.poll().await.unwrap().lines, vec!["second partial"]);
    }

    #[tokio::test]
    async fn truncation_restarts_from_the_beginning() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalina.out");
        std::fs::write(&path, "a long line before rotation\n").unwrap();
        let mut tail = Tail::at_end(&path).await.unwrap();

        std::fs::write(&path, "fresh\n").unwrap();
        let poll = tail.poll().await.unwrap();
        assert!(poll.restarted);
        assert_eq!(poll.lines, vec!["fresh"]);
    }

    #[tokio::test]
    async fn missing_file_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalina.out");
        std::fs::write(&path, "").unwrap();
        let mut tail = Tail::at_end(&path).await.unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(tail.poll().await.unwrap(), Poll::default());
    }
}
