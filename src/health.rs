//! Liveness probing of the engine's `/health` endpoint.
//!
//! Any 2xx answer counts as healthy; connection failures, timeouts and
//! non-2xx statuses all count as unhealthy. No response body is assumed.

use std::time::Duration;
use tracing::{debug, trace};

#[derive(Clone)]
pub struct HealthProber {
    client: reqwest::Client,
    url: String,
}

impl HealthProber {
    pub fn new(port: u16) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("http://127.0.0.1:{port}/health"),
        }
    }

    /// One probe, bounded by `timeout`.
    pub async fn check(&self, timeout: Duration) -> bool {
        match self.client.get(&self.url).timeout(timeout).send().await {
            Ok(response) => {
                let healthy = response.status().is_success();
                trace!(status = %response.status(), healthy, "Health probe answered");
                healthy
            }
            Err(err) => {
                debug!(?err, "Health probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn respond(listener: TcpListener, status_line: &'static str) {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response =
                    format!("{status_line}\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok");
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    }

    #[tokio::test]
    async fn two_hundred_is_healthy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(respond(listener, "HTTP/1.1 200 OK"));
        let prober = HealthProber::new(port);
        assert!(prober.check(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn server_error_is_unhealthy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(respond(listener, "HTTP/1.1 503 Service Unavailable"));
        let prober = HealthProber::new(port);
        assert!(!prober.check(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn connection_refused_is_unhealthy() {
        // Bind then drop to get a port that is almost certainly closed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let prober = HealthProber::new(port);
        assert!(!prober.check(Duration::from_millis(500)).await);
    }
}
