//! Reachability probe backed by a plain HTTP request.

use async_trait::async_trait;
use log::debug;
use std::time::Duration;

use fieldsync_core::sync::{NetworkMonitor, NetworkState, NetworkType};

use crate::error::Result;

pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// Reports the internet as reachable when the probe URL answers at all.
/// Any HTTP status counts; only transport failures mean offline.
#[derive(Debug, Clone)]
pub struct HttpReachabilityMonitor {
    client: reqwest::Client,
    probe_url: String,
    network_type: NetworkType,
}

impl HttpReachabilityMonitor {
    pub fn new(probe_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            probe_url: probe_url.trim().to_string(),
            network_type: NetworkType::Unknown,
        })
    }

    /// Interface type to report while reachable. The probe cannot tell.
    pub fn with_network_type(mut self, network_type: NetworkType) -> Self {
        self.network_type = network_type;
        self
    }
}

#[async_trait]
impl NetworkMonitor for HttpReachabilityMonitor {
    async fn state(&self) -> NetworkState {
        match self.client.head(&self.probe_url).send().await {
            Ok(response) => {
                debug!("[Network] Probe answered with {}", response.status());
                NetworkState::online(self.network_type)
            }
            Err(err) => {
                debug!("[Network] Probe failed: {}", err);
                NetworkState::offline()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn start_probe_server(status_line: &'static str) -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let handle = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buffer = [0_u8; 1024];
                let _ = stream.read(&mut buffer).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status_line
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.flush().await;
            }
        });
        (format!("http://{}/health", addr), handle)
    }

    #[tokio::test]
    async fn any_answer_means_reachable() {
        let (url, server) = start_probe_server("503 Service Unavailable").await;
        let monitor = HttpReachabilityMonitor::new(&url, Duration::from_secs(2))
            .unwrap()
            .with_network_type(NetworkType::Wifi);

        let state = monitor.state().await;
        assert!(state.internet_reachable);
        assert_eq!(state.network_type, NetworkType::Wifi);
        server.abort();
    }

    #[tokio::test]
    async fn refused_connection_means_offline() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let monitor =
            HttpReachabilityMonitor::new(&format!("http://{}/", addr), Duration::from_secs(1))
                .unwrap();
        let state = monitor.state().await;
        assert!(!state.internet_reachable);
        assert!(!state.connected);
    }
}
