//! Tomcat output pump: readiness detection plus filtered display.

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use xavva_core::{LineOutput, LogView, ReadinessTracker};

use crate::output::{self, Spinner};
use crate::process::Stream;

use super::ServerState;

/// Whether a "starting" spinner should cover the startup noise.
pub fn wants_spinner(view: &LogView) -> bool {
    (view.clean || view.quiet) && !view.verbose
}

fn print_line(spinner: Option<&Spinner>, out: LineOutput) {
    match out {
        LineOutput::Hidden => {}
        LineOutput::Raw(text) => match spinner {
            Some(spinner) => spinner.println(text),
            None => println!("{text}"),
        },
        LineOutput::Styled(rendered) => match spinner {
            Some(spinner) => spinner.suspend(|| output::rendered(&rendered)),
            None => output::rendered(&rendered),
        },
    }
}

/// Consume server output until every reader hangs up.
///
/// `ready` fires on the first startup line of this run only.
pub fn spawn_log_pump(
    mut rx: mpsc::UnboundedReceiver<(Stream, String)>,
    view: LogView,
    ready: oneshot::Sender<()>,
    state: watch::Sender<ServerState>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tracker = ReadinessTracker::new();
        let mut ready = Some(ready);
        let mut spinner = wants_spinner(&view).then(|| Spinner::start("Starting Tomcat"));

        while let Some((_stream, line)) = rx.recv().await {
            let seen = tracker.observe(&line);
            if seen.ready {
                state.send_replace(ServerState::Ready);
                if let Some(tx) = ready.take() {
                    let _ = tx.send(());
                }
            }
            if let Some(ok) = seen.settle
                && let Some(spinner) = spinner.take()
            {
                if ok {
                    spinner.clear();
                } else {
                    spinner.fail("Tomcat reported an error during startup");
                }
            }
            print_line(spinner.as_ref(), view.decide(&line));
        }

        if let Some(spinner) = spinner {
            spinner.clear();
        }
        tracing::info!(ready = tracker.is_ready(), "Server output closed");
    })
}
