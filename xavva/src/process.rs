//! Subprocess helpers shared by the build runner and the server controller.

use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use xavva_core::LineSplitter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Read `reader` to the end, sending each complete line tagged with `stream`.
pub fn spawn_line_reader<R>(
    reader: R,
    stream: Stream,
    tx: mpsc::UnboundedSender<(Stream, String)>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = reader;
        let mut splitter = LineSplitter::new();
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    for line in splitter.push(&buf[..n]) {
                        if tx.send((stream, line)).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(err = %e, ?stream, "output read failed");
                    break;
                }
            }
        }
        if let Some(line) = splitter.finish() {
            let _ = tx.send((stream, line));
        }
    })
}

/// Whether `name --version` runs successfully.
pub async fn command_exists(name: &str) -> bool {
    tokio::process::Command::new(name)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}
