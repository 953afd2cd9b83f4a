//! Gateway stdio transport.
//!
//! One child process, one long-lived bidirectional stream, one dedicated
//! reader task. Requests are multiplexed by correlation id: each in-flight
//! call parks on a oneshot waiter and the reader dispatches replies as they
//! arrive, in any order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{oneshot, Mutex};

use crate::protocol::{
    self, GatewayToolDef, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ToolCallResult,
    ToolsListResult,
};

/// Maximum non-JSON lines tolerated before the stream is declared broken.
const MAX_SKIP_LINES: usize = 1000;

/// Deadline for child exit during shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("gateway process has exited")]
    ProcessExited,

    #[error("timeout waiting for gateway response")]
    Timeout,

    #[error("gateway protocol error: {0}")]
    Protocol(String),
}

type WaiterMap = Arc<SyncMutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// Client for one gateway subprocess.
#[derive(Debug)]
pub struct GatewayClient {
    stdin: Mutex<ChildStdin>,
    child: Mutex<Child>,
    waiters: WaiterMap,
    next_id: AtomicU64,
    alive: Arc<AtomicBool>,
    request_timeout: Duration,
}

impl GatewayClient {
    /// Spawn the gateway from its argv and start the reader task.
    pub fn spawn(argv: &[String], request_timeout: Duration) -> Result<Self, TransportError> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            TransportError::Protocol("gateway command is empty".into())
        })?;

        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture gateway stdin",
            ))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "failed to capture gateway stdout",
            ))
        })?;

        let waiters: WaiterMap = Arc::new(SyncMutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        // Dedicated reader: parses replies and dispatches them to waiters.
        let reader_waiters = waiters.clone();
        let reader_alive = alive.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut skipped = 0usize;
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        if !trimmed.starts_with('{') {
                            skipped += 1;
                            if skipped >= MAX_SKIP_LINES {
                                tracing::warn!("gateway wrote too many non-JSON lines, giving up");
                                break;
                            }
                            continue;
                        }
                        match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                            Ok(resp) => {
                                let waiter = reader_waiters.lock().remove(&resp.id);
                                match waiter {
                                    Some(tx) => {
                                        let _ = tx.send(resp);
                                    }
                                    None => tracing::debug!(
                                        id = resp.id,
                                        "gateway reply with no waiter (notification or timeout)"
                                    ),
                                }
                            }
                            Err(_) => {
                                // Notifications and other frames are skipped.
                                tracing::debug!(line = %trimmed, "skipping non-response gateway frame");
                            }
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
            reader_alive.store(false, Ordering::SeqCst);
            // Drop pending waiters so callers see ProcessExited.
            reader_waiters.lock().clear();
            tracing::debug!("gateway reader stopped");
        });

        Ok(Self {
            stdin: Mutex::new(stdin),
            child: Mutex::new(child),
            waiters,
            next_id: AtomicU64::new(1),
            alive,
            request_timeout,
        })
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn write_line(&self, json: &str) -> Result<(), TransportError> {
        if !self.is_alive() {
            return Err(TransportError::ProcessExited);
        }
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Send a request and await its correlated reply.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(id, tx);

        let req = JsonRpcRequest::new(id, method, params);
        let json = serde_json::to_string(&req)?;
        tracing::debug!(id, method, "sending gateway request");

        if let Err(e) = self.write_line(&json).await {
            self.waiters.lock().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => Err(TransportError::ProcessExited),
            Err(_) => {
                self.waiters.lock().remove(&id);
                Err(TransportError::Timeout)
            }
        }
    }

    /// Fire-and-forget notification.
    pub async fn notify(&self, method: &str) -> Result<(), TransportError> {
        let notif = JsonRpcNotification::new(method);
        self.write_line(&serde_json::to_string(&notif)?).await
    }

    // ── Gateway operations ─────────────────────────────────────────

    /// Initialization handshake, bounded by `timeout`.
    pub async fn initialize(&self, timeout: Duration) -> Result<(), TransportError> {
        let params = serde_json::to_value(protocol::initialize_params())?;
        let handshake = async {
            let resp = self.request("initialize", Some(params)).await?;
            if let Some(err) = resp.error {
                return Err(TransportError::Protocol(format!("initialize failed: {err}")));
            }
            self.notify("notifications/initialized").await
        };
        tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| TransportError::Timeout)?
    }

    /// Discover the gateway's tools.
    pub async fn list_tools(&self) -> Result<Vec<GatewayToolDef>, TransportError> {
        let resp = self.request("list_tools", None).await?;
        let result = resp
            .into_result()
            .map_err(|e| TransportError::Protocol(format!("list_tools failed: {e}")))?;
        let parsed: ToolsListResult = serde_json::from_value(result)?;
        Ok(parsed.tools)
    }

    /// Invoke a tool by its gateway-side name.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<ToolCallResult, TransportError> {
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        let resp = self.request("call_tool", Some(params)).await?;
        let result = resp
            .into_result()
            .map_err(|e| TransportError::Protocol(format!("call_tool failed: {e}")))?;
        Ok(serde_json::from_value(result)?)
    }

    /// Close the channel and wait for child exit, killing on deadline.
    pub async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.waiters.lock().clear();
        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.shutdown().await {
                tracing::debug!(error = %e, "error closing gateway stdin");
            }
        }
        let mut child = self.child.lock().await;
        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => tracing::debug!(?status, "gateway process exited"),
            Ok(Err(e)) => tracing::warn!(error = %e, "error waiting for gateway process"),
            Err(_) => {
                tracing::warn!("gateway did not exit within deadline, killing");
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "failed to kill gateway process");
                }
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    /// A tiny line-oriented JSON-RPC echo server written in shell: replies
    /// to `initialize`, `list_tools` and `call_tool` by pattern-matching
    /// the request id out of each line.
    fn stub_gateway_argv() -> Vec<String> {
        let script = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  case "$line" in
    *'"initialize"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"capabilities":{}}}\n' "$id" ;;
    *'"list_tools"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"echo_text","description":"Echo text back","inputSchema":{"type":"object","properties":{"text":{"type":"string"}},"required":["text"]}}]}}\n' "$id" ;;
    *'"call_tool"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"echoed"}]}}\n' "$id" ;;
    *) ;;
  esac
done
"#;
        vec!["sh".into(), "-c".into(), script.into()]
    }

    #[tokio::test]
    async fn handshake_list_and_call() {
        let client =
            GatewayClient::spawn(&stub_gateway_argv(), Duration::from_secs(5)).unwrap();

        client.initialize(Duration::from_secs(5)).await.unwrap();
        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo_text");

        let result = client
            .call_tool("echo_text", serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(result.text(), "echoed");
        assert!(!result.is_error);

        client.shutdown().await;
        assert!(!client.is_alive());
    }

    #[tokio::test]
    async fn concurrent_requests_multiplex_by_id() {
        let client = Arc::new(
            GatewayClient::spawn(&stub_gateway_argv(), Duration::from_secs(5)).unwrap(),
        );
        client.initialize(Duration::from_secs(5)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                client
                    .call_tool("echo_text", serde_json::json!({"text": "x"}))
                    .await
                    .map(|r| r.text())
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "echoed");
        }
        client.shutdown().await;
    }

    #[tokio::test]
    async fn dead_process_yields_process_exited() {
        let argv = vec!["sh".into(), "-c".into(), "exit 0".into()];
        let client = GatewayClient::spawn(&argv, Duration::from_millis(500)).unwrap();

        // Give the child a moment to exit and the reader to observe EOF.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let err = client.request("list_tools", None).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::ProcessExited | TransportError::Timeout | TransportError::Io(_)
        ));
    }

    #[tokio::test]
    async fn empty_argv_is_rejected() {
        let err = GatewayClient::spawn(&[], Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, TransportError::Protocol(_)));
    }
}
