//! Network monitor contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    None,
    Wifi,
    Cellular,
    Ethernet,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    pub connected: bool,
    pub internet_reachable: bool,
    pub network_type: NetworkType,
}

impl NetworkState {
    pub fn online(network_type: NetworkType) -> Self {
        Self {
            connected: true,
            internet_reachable: true,
            network_type,
        }
    }

    pub fn offline() -> Self {
        Self {
            connected: false,
            internet_reachable: false,
            network_type: NetworkType::None,
        }
    }
}

/// Reports connectivity. The sync engine consults it before each drain and
/// only branches on `internet_reachable`.
#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    async fn state(&self) -> NetworkState;
}

/// Monitor whose state is pushed in by the platform shell.
#[derive(Debug)]
pub struct StaticNetworkMonitor {
    state: RwLock<NetworkState>,
}

impl StaticNetworkMonitor {
    pub fn new(state: NetworkState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    pub fn online() -> Self {
        Self::new(NetworkState::online(NetworkType::Unknown))
    }

    pub fn offline() -> Self {
        Self::new(NetworkState::offline())
    }

    pub fn set_state(&self, state: NetworkState) {
        match self.state.write() {
            Ok(mut guard) => *guard = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
    }

    pub fn current(&self) -> NetworkState {
        match self.state.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl NetworkMonitor for StaticNetworkMonitor {
    async fn state(&self) -> NetworkState {
        self.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_monitor_reports_pushed_state() {
        let monitor = StaticNetworkMonitor::offline();
        assert!(!monitor.state().await.internet_reachable);

        monitor.set_state(NetworkState::online(NetworkType::Cellular));
        let state = monitor.state().await;
        assert!(state.internet_reachable);
        assert_eq!(state.network_type, NetworkType::Cellular);
    }

    #[test]
    fn state_uses_camel_case_contract() {
        let json = serde_json::to_value(NetworkState::online(NetworkType::Wifi)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "connected": true,
                "internetReachable": true,
                "networkType": "wifi"
            })
        );
    }
}
