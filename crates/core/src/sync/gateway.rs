//! Remote gateway contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::sync_engine::{classify_http_status, SyncRetryClass};

/// Outcome of one remote call. Transport failures and timeouts use `status = 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    pub success: bool,
    pub status: u16,
    pub message: Option<String>,
}

impl GatewayResponse {
    pub fn ok(status: u16) -> Self {
        Self {
            success: true,
            status,
            message: None,
        }
    }

    pub fn failure(status: u16, message: impl Into<String>) -> Self {
        Self {
            success: false,
            status,
            message: Some(message.into()),
        }
    }

    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self::failure(0, message)
    }

    pub fn timed_out() -> Self {
        Self::transport_failure("Request timed out")
    }

    pub fn retry_class(&self) -> SyncRetryClass {
        classify_http_status(self.status)
    }

    pub fn describe(&self) -> String {
        match &self.message {
            Some(message) => format!("status {}: {}", self.status, message),
            None => format!("status {}", self.status),
        }
    }
}

/// REST boundary of the remote system. Both operations are expected to be
/// idempotent enough to survive at-least-once delivery.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn upsert_record(
        &self,
        doc_id: &str,
        fields: &serde_json::Map<String, serde_json::Value>,
    ) -> GatewayResponse;

    async fn upload_attachment(&self, file_ref: &str, bytes: Vec<u8>) -> GatewayResponse;
}
