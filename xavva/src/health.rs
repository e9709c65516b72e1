//! Post-deploy reachability probe.

use std::time::Duration;

use thiserror::Error;

/// Grace period between the startup marker and the probe. Tomcat accepts
/// connections slightly before the app context has finished initialising.
pub const HEALTH_SETTLE_DELAY: Duration = Duration::from_millis(1500);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum HealthCheckFailed {
    #[error("{url} answered HTTP {status}")]
    ServerError { url: String, status: u16 },

    #[error("{url} is unreachable: {reason}")]
    Unreachable { url: String, reason: String },
}

pub fn is_healthy(status: u16) -> bool {
    status < 500
}

/// GET `url` once. Any status below 500 counts as up, since a 404 on the
/// context root still proves the app is deployed.
pub async fn probe(url: &str) -> Result<u16, HealthCheckFailed> {
    let client = reqwest::Client::builder()
        .connect_timeout(PROBE_TIMEOUT)
        .timeout(PROBE_TIMEOUT)
        .build()
        .map_err(|e| HealthCheckFailed::Unreachable {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    let response = client
        .get(url)
        .header("User-Agent", "xavva")
        .send()
        .await
        .map_err(|e| HealthCheckFailed::Unreachable {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let status = response.status().as_u16();
    tracing::info!(url, status, "Health probe");
    if is_healthy(status) {
        Ok(status)
    } else {
        Err(HealthCheckFailed::ServerError {
            url: url.to_string(),
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!("HTTP/1.1 {status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{addr}/shop/")
    }

    #[test]
    fn threshold_is_five_hundred() {
        assert!(is_healthy(200));
        assert!(is_healthy(404));
        assert!(!is_healthy(500));
        assert!(!is_healthy(503));
    }

    #[tokio::test]
    async fn not_found_counts_as_reachable() {
        let url = serve_once("404 Not Found").await;
        assert_eq!(probe(&url).await.unwrap(), 404);
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        let url = serve_once("500 Internal Server Error").await;
        assert!(matches!(
            probe(&url).await,
            Err(HealthCheckFailed::ServerError { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn closed_port_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        assert!(matches!(
            probe(&format!("http://{addr}/")).await,
            Err(HealthCheckFailed::Unreachable { .. })
        ));
    }
}
