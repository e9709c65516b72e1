//! Opening and refreshing the deployed app in the user's browser.

use std::process::Stdio;

use tokio::process::Command;

/// What the orchestrator may ask of a browser.
pub trait BrowserControl: Send + Sync {
    /// Open `url` in the default browser.
    fn open(&self, url: &str);

    /// Refresh the active tab after a hot update, where supported.
    fn reload(&self);
}

/// The opener command for the current platform.
pub fn open_command(url: &str) -> (&'static str, Vec<String>) {
    if cfg!(target_os = "macos") {
        ("open", vec![url.to_string()])
    } else if cfg!(windows) {
        (
            "cmd",
            vec![
                "/c".to_string(),
                "start".to_string(),
                String::new(),
                url.to_string(),
            ],
        )
    } else {
        ("xdg-open", vec![url.to_string()])
    }
}

fn spawn_detached(program: &str, args: &[String]) {
    let result = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    match result {
        Ok(mut child) => {
            tokio::spawn(async move {
                let _ = child.wait().await;
            });
        }
        Err(e) => tracing::warn!(program, err = %e, "Could not launch browser helper"),
    }
}

/// Uses the platform opener. Reload sends F5 to the foreground window on
/// Windows and does nothing elsewhere.
pub struct SystemBrowser;

impl BrowserControl for SystemBrowser {
    fn open(&self, url: &str) {
        let (program, args) = open_command(url);
        tracing::info!(program, url, "Opening browser");
        spawn_detached(program, &args);
    }

    fn reload(&self) {
        if cfg!(windows) {
            spawn_detached(
                "powershell",
                &[
                    "-NoProfile".to_string(),
                    "-Command".to_string(),
                    "(New-Object -ComObject WScript.Shell).SendKeys('{F5}')".to_string(),
                ],
            );
        }
    }
}

/// Never touches a browser.
pub struct NoBrowser;

impl BrowserControl for NoBrowser {
    fn open(&self, _url: &str) {}

    fn reload(&self) {}
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records requests for orchestration tests.
    #[derive(Default)]
    pub(crate) struct RecordingBrowser {
        pub opened: Mutex<Vec<String>>,
        pub reloads: Mutex<usize>,
    }

    impl BrowserControl for RecordingBrowser {
        fn open(&self, url: &str) {
            self.opened.lock().unwrap().push(url.to_string());
        }

        fn reload(&self) {
            *self.reloads.lock().unwrap() += 1;
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn linux_uses_xdg_open() {
        let (program, args) = open_command("http://localhost:8080/shop/");
        assert_eq!(program, "xdg-open");
        assert_eq!(args, vec!["http://localhost:8080/shop/"]);
    }

    #[test]
    fn recording_browser_counts_requests() {
        let browser = RecordingBrowser::default();
        browser.open("http://localhost:8080/a/");
        browser.reload();
        browser.reload();
        assert_eq!(browser.opened.lock().unwrap().len(), 1);
        assert_eq!(*browser.reloads.lock().unwrap(), 2);
        NoBrowser.open("http://ignored/");
        NoBrowser.reload();
    }
}
