/// Line-delimited JSON bridge between the desktop shell and the facade.
///
/// Each input line is `{"id": .., "command": "..", "args": {..}}`; each output
/// line is `{"id": .., "result": ..}`. Requests run concurrently, so responses
/// may come back out of order and are matched by `id`.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::facade::{Command, OrchestrationFacade};

#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Option<Value>,
    pub command: String,
    #[serde(default)]
    pub args: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub id: Value,
    pub result: Value,
}

/// Serves requests from `input` until it closes, then waits for in-flight
/// commands to answer.
pub async fn run<R, W>(facade: Arc<OrchestrationFacade>, input: R, output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Response>(32);
    let writer = tokio::spawn(write_responses(rx, output));
    let mut in_flight = JoinSet::new();

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request = match serde_json::from_str::<Request>(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Malformed request line");
                let _ = tx
                    .send(Response {
                        id: Value::Null,
                        result: json!({ "success": false, "error": format!("Malformed request: {e}") }),
                    })
                    .await;
                continue;
            }
        };

        let id = request.id.unwrap_or(Value::Null);
        debug!(command = %request.command, id = %id, "Request");
        let facade = Arc::clone(&facade);
        let tx = tx.clone();
        in_flight.spawn(async move {
            let result = match Command::parse(&request.command, request.args) {
                Ok(command) => facade.execute(command).await,
                Err(e) => json!({ "success": false, "error": e.to_string() }),
            };
            let _ = tx.send(Response { id, result }).await;
        });
    }

    while in_flight.join_next().await.is_some() {}
    drop(tx);
    writer.await??;
    Ok(())
}

async fn write_responses<W>(mut rx: mpsc::Receiver<Response>, mut output: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_vec(&response)?;
        line.push(b'\n');
        output.write_all(&line).await?;
        output.flush().await?;
    }
    Ok(())
}
