//! Finding and terminating whatever already listens on the HTTP port.

use std::collections::BTreeSet;
use std::process::Stdio;

use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::process::Command;

/// Pids printed by `lsof -t`, one per line.
pub fn parse_lsof_pids(output: &str) -> Vec<u32> {
    let pids: BTreeSet<u32> = output
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect();
    pids.into_iter().collect()
}

/// Pids of TCP sockets listening on `port` in `netstat -ano` output.
pub fn parse_netstat_pids(output: &str, port: u16) -> Vec<u32> {
    let suffix = format!(":{port}");
    let pids: BTreeSet<u32> = output
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 5 || !cols[0].eq_ignore_ascii_case("TCP") {
                return None;
            }
            if !cols[1].ends_with(&suffix) || !cols[3].eq_ignore_ascii_case("LISTENING") {
                return None;
            }
            cols[4].parse().ok()
        })
        .filter(|pid| *pid != 0)
        .collect();
    pids.into_iter().collect()
}

/// Processes listening on `port`. Probe failures mean "nobody".
pub async fn listening_pids(port: u16) -> Vec<u32> {
    let (program, args): (&str, Vec<String>) = if cfg!(windows) {
        ("netstat", vec!["-ano".to_string()])
    } else {
        (
            "lsof",
            vec![
                "-nP".to_string(),
                format!("-iTCP:{port}"),
                "-sTCP:LISTEN".to_string(),
                "-t".to_string(),
            ],
        )
    };

    let output = match Command::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!(program, err = %e, "Port probe unavailable");
            return Vec::new();
        }
    };
    let text = String::from_utf8_lossy(&output.stdout);
    if cfg!(windows) {
        parse_netstat_pids(&text, port)
    } else {
        parse_lsof_pids(&text)
    }
}

/// Kill `pid` unless it is this process. Returns whether it is gone.
pub fn kill_pid(pid: u32) -> bool {
    if pid == std::process::id() {
        return false;
    }
    let mut sys = System::new();
    let target = Pid::from_u32(pid);
    sys.refresh_processes(ProcessesToUpdate::Some(&[target]), false);
    match sys.process(target) {
        Some(process) => {
            tracing::info!(pid, name = ?process.name(), "Killing port holder");
            process.kill()
        }
        None => true,
    }
}

/// Resident memory of `pid` in bytes.
pub fn resident_memory(pid: u32) -> Option<u64> {
    let mut sys = System::new();
    let target = Pid::from_u32(pid);
    sys.refresh_processes(ProcessesToUpdate::Some(&[target]), false);
    sys.process(target).map(|p| p.memory())
}
