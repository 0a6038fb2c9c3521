// MCP stdio transport runner: line-framed JSON-RPC, one request at a time

use crate::dispatch::Dispatcher;
use crate::protocol::{decode, encode, JsonRpcError, JsonRpcResponse};
use crate::tools::RobotsPolicy;
use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};

/// Longest accepted request line (bytes)
pub const MAX_FRAME_LENGTH: usize = 4 * 1024 * 1024;

/// Lifecycle of the stdio runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    AwaitingRobotsPrefetch,
    Serving,
    Draining,
    Stopped,
}

pub struct McpServer {
    dispatcher: Dispatcher,
    robots: Arc<RobotsPolicy>,
    state: RunnerState,
}

impl McpServer {
    pub fn new(dispatcher: Dispatcher, robots: Arc<RobotsPolicy>) -> Self {
        Self {
            dispatcher,
            robots,
            state: RunnerState::Idle,
        }
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// Serve on the process stdin/stdout until a termination signal or EOF.
    pub async fn start(&mut self) -> Result<()> {
        self.run(tokio::io::stdin(), tokio::io::stdout(), shutdown_signal())
            .await
    }

    /// Serve on arbitrary streams. `shutdown` resolving stops the runner once
    /// the request being processed (if any) has been answered.
    pub async fn run<R, W, F>(&mut self, reader: R, writer: W, shutdown: F) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        F: Future<Output = ()>,
    {
        self.transition(RunnerState::AwaitingRobotsPrefetch);
        if let Err(err) = self.robots.prefetch().await {
            tracing::warn!(error = %format!("{err:#}"), "robots.txt prefetch failed; continuing without rules");
        }

        let mut frames = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_FRAME_LENGTH));
        let mut sink = FramedWrite::new(writer, LinesCodec::new());
        tokio::pin!(shutdown);

        self.transition(RunnerState::Serving);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    tracing::info!("Received shutdown signal");
                    break;
                }

                frame = frames.next() => match frame {
                    Some(Ok(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if let Some(response) = self.process_line(&line).await {
                            let encoded = encode(&response).context("Failed to encode response")?;
                            tracing::debug!(response = %encoded, "Sending");
                            sink.send(encoded).await.context("Failed to write response")?;
                        }
                    }
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        tracing::warn!(limit = MAX_FRAME_LENGTH, "Discarding oversized request line");
                        let response = JsonRpcResponse::error(
                            Value::Null,
                            JsonRpcError::parse_error("Request exceeds maximum frame length"),
                        );
                        let encoded = encode(&response).context("Failed to encode response")?;
                        sink.send(encoded).await.context("Failed to write response")?;
                    }
                    Some(Err(LinesCodecError::Io(err))) => {
                        return Err(err).context("Failed to read request");
                    }
                    None => {
                        tracing::info!("Input stream closed");
                        break;
                    }
                },
            }
        }

        self.transition(RunnerState::Draining);
        SinkExt::<String>::flush(&mut sink)
            .await
            .context("Failed to flush output")?;
        self.transition(RunnerState::Stopped);

        Ok(())
    }

    /// Decode and dispatch one line. Notifications yield no response.
    async fn process_line(&self, line: &str) -> Option<JsonRpcResponse> {
        tracing::debug!(request = %line, "Received");

        let request = match decode(line.as_bytes()) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(code = err.error.code, message = %err.error.message, "Malformed request");
                return Some(err.into_response());
            }
        };

        let response = self.dispatcher.dispatch(&request).await;

        if request.is_notification() {
            tracing::debug!(method = %request.method, "Handled notification");
            None
        } else {
            Some(response)
        }
    }

    fn transition(&mut self, next: RunnerState) {
        tracing::debug!(from = ?self.state, to = ?next, "Stdio runner state change");
        self.state = next;
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{echo_registry, AirbnbClient};
    use airbnb_mcp_core::config::AirbnbSection;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn server() -> McpServer {
        let client = Arc::new(AirbnbClient::new(&AirbnbSection::default()).unwrap());
        let robots = Arc::new(RobotsPolicy::new(client, true));
        McpServer::new(Dispatcher::new(Arc::new(echo_registry())), robots)
    }

    fn responses(output: &[u8]) -> Vec<Value> {
        String::from_utf8(output.to_vec())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_sequential_requests_until_eof() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05"}}"#, "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#, "\n",
            "\n",
            r#"{"jsonrpc":"2.0","id":"two","method":"tools/list"}"#, "\n",
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"airbnb_search","arguments":{"location":"Oslo"}}}"#, "\n",
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"nope"}}"#, "\n",
        );

        let mut server = server();
        let mut output = Vec::new();
        server
            .run(input.as_bytes(), &mut output, std::future::pending())
            .await
            .unwrap();

        assert_eq!(server.state(), RunnerState::Stopped);

        let responses = responses(&output);
        assert_eq!(responses.len(), 4, "notification and blank line must not be answered");
        assert_eq!(responses[0]["id"], json!(1));
        assert_eq!(responses[1]["id"], json!("two"));
        assert_eq!(responses[1]["result"]["tools"].as_array().unwrap().len(), 2);
        assert_eq!(responses[2]["id"], json!(3));
        assert_eq!(responses[2]["result"]["isError"], json!(false));
        assert_eq!(responses[3]["id"], json!(4));
        assert_eq!(responses[3]["error"]["code"], json!(-32601));
    }

    #[tokio::test]
    async fn test_malformed_lines_get_error_responses() {
        let input = concat!(
            "{this is not json\n",
            r#"{"jsonrpc":"1.0","id":8,"method":"tools/list"}"#, "\n",
            r#"{"jsonrpc":"2.0","id":9,"method":"tools/call","params":{}}"#, "\n",
        );

        let mut server = server();
        let mut output = Vec::new();
        server
            .run(input.as_bytes(), &mut output, std::future::pending())
            .await
            .unwrap();

        let responses = responses(&output);
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[0]["error"]["code"], json!(-32700));
        assert_eq!(responses[1]["id"], json!(8));
        assert_eq!(responses[1]["error"]["code"], json!(-32600));
        assert_eq!(responses[2]["error"]["code"], json!(-32602));
    }

    #[tokio::test]
    async fn test_null_id_is_answered() {
        let input = concat!(r#"{"jsonrpc":"2.0","id":null,"method":"tools/list"}"#, "\n");

        let mut server = server();
        let mut output = Vec::new();
        server
            .run(input.as_bytes(), &mut output, std::future::pending())
            .await
            .unwrap();

        let responses = responses(&output);
        assert_eq!(responses.len(), 1);
        assert!(responses[0].as_object().unwrap().contains_key("id"));
        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[0]["result"]["tools"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_robots_does_not_stop_serving() {
        let client = Arc::new(
            AirbnbClient::new(&AirbnbSection {
                base_url: "http://127.0.0.1:9".to_string(),
                request_timeout_secs: 2,
                ..AirbnbSection::default()
            })
            .unwrap(),
        );
        let robots = Arc::new(RobotsPolicy::new(client, false));
        assert!(robots.prefetch().await.is_err());

        let mut server = McpServer::new(Dispatcher::new(Arc::new(echo_registry())), robots);
        let input = concat!(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#, "\n");
        let mut output = Vec::new();
        server
            .run(input.as_bytes(), &mut output, std::future::pending())
            .await
            .unwrap();

        assert_eq!(server.state(), RunnerState::Stopped);
        let responses = responses(&output);
        assert_eq!(responses, vec![json!({"jsonrpc": "2.0", "id": 1, "result": {}})]);
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_runner() {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server_io);
        let (client_read, mut client_write) = tokio::io::split(client_io);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut server = server();
            let result = server
                .run(server_read, server_write, async {
                    let _ = stop_rx.await;
                })
                .await;
            (result, server.state())
        });

        client_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(client_read).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let response: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(response["id"], json!(1));
        assert_eq!(response["result"], json!({}));

        stop_tx.send(()).unwrap();
        let (result, state) = handle.await.unwrap();
        result.unwrap();
        assert_eq!(state, RunnerState::Stopped);
    }
}
