//! JSON-RPC client for nodes and public RPC endpoints

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use super::{GatewayError, RpcGateway};

/// Remote methods consumed by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    TotalTransactionBlocks,
    LatestCheckpointSequenceNumber,
    LatestSystemState,
    ValidatorsApy,
}

impl RpcMethod {
    /// Wire name of the method
    pub fn name(&self) -> &'static str {
        match self {
            RpcMethod::TotalTransactionBlocks => "sui_getTotalTransactionBlocks",
            RpcMethod::LatestCheckpointSequenceNumber => "sui_getLatestCheckpointSequenceNumber",
            RpcMethod::LatestSystemState => "suix_getLatestSuiSystemState",
            RpcMethod::ValidatorsApy => "suix_getValidatorsApy",
        }
    }
}

impl std::fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// JSON-RPC request
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    method: &'static str,
    params: serde_json::Value,
    id: u64,
}

/// JSON-RPC response
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

/// JSON-RPC error
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// HTTP JSON-RPC client shared by every host task
pub struct JsonRpcClient {
    client: Client,
    timeout: Duration,
    request_id: AtomicU64,
}

impl JsonRpcClient {
    /// Create a client whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport {
                endpoint: String::new(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            timeout,
            request_id: AtomicU64::new(1),
        })
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl RpcGateway for JsonRpcClient {
    async fn call(&self, endpoint: &str, method: RpcMethod) -> Result<serde_json::Value, GatewayError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: method.name(),
            params: serde_json::json!([]),
            id: self.next_id(),
        };

        debug!("→ {} {}", endpoint, method);

        let response = self
            .client
            .post(endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(endpoint, method, self.timeout, e))?;

        if !response.status().is_success() {
            return Err(GatewayError::Status {
                endpoint: endpoint.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body: JsonRpcResponse = response.json().await.map_err(|e| GatewayError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

        decode_response(method, body)
    }
}

fn decode_response(method: RpcMethod, body: JsonRpcResponse) -> Result<serde_json::Value, GatewayError> {
    if let Some(error) = body.error {
        return Err(GatewayError::Rpc {
            method: method.name().to_string(),
            code: error.code,
            message: error.message,
        });
    }

    match body.result {
        Some(serde_json::Value::Null) | None => Err(GatewayError::EmptyResult {
            method: method.name().to_string(),
        }),
        Some(value) => Ok(value),
    }
}

fn transport_error(endpoint: &str, method: RpcMethod, timeout: Duration, e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout {
            operation: format!("{} {}", endpoint, method),
            timeout,
        }
    } else {
        GatewayError::Transport {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        }
    }
}
