/*!
 * IPC Server for the Blueman Applet
 * JSON protocol over Unix socket
 */

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::plugin::{AppletSignal, PluginSummary};
use crate::runtime::AppletMessage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    GetStatus,
    ListPlugins,
    LoadPlugin {
        id: String,
    },
    UnloadPlugin {
        id: String,
    },
    GetLogLevel,
    /// Method registered by a loaded plugin.
    Call {
        method: String,
        #[serde(default)]
        args: Value,
    },
    /// Keeps the connection open and streams [`AppletSignal`]s.
    Subscribe,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Status {
        manager_state: bool,
        visible: bool,
        icon_name: String,
        tooltip_title: String,
        tooltip_text: String,
        plugins: Vec<String>,
    },
    Plugins {
        plugins: Vec<PluginSummary>,
    },
    Value {
        value: Value,
    },
    Success {
        message: String,
    },
    Error {
        message: String,
    },
    Signal {
        signal: AppletSignal,
    },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Response::Success {
            message: message.into(),
        }
    }
}

pub struct IpcServer {
    listener: UnixListener,
    tx: mpsc::UnboundedSender<AppletMessage>,
    signals: broadcast::Sender<AppletSignal>,
}

impl IpcServer {
    pub fn new(
        listener: UnixListener,
        tx: mpsc::UnboundedSender<AppletMessage>,
        signals: broadcast::Sender<AppletSignal>,
    ) -> Self {
        Self {
            listener,
            tx,
            signals,
        }
    }

    pub async fn run(self) -> Result<()> {
        tracing::info!("IPC server listening for connections...");

        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    tracing::debug!("New client connected");
                    let tx = self.tx.clone();
                    let signals = self.signals.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, tx, signals).await {
                            tracing::error!("Client error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

async fn handle_client(
    stream: UnixStream,
    tx: mpsc::UnboundedSender<AppletMessage>,
    signals: broadcast::Sender<AppletSignal>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let raw = line.trim();
        tracing::debug!("Received request: {}", raw);

        let response = match serde_json::from_str::<Request>(raw) {
            Ok(Request::Subscribe) => {
                return stream_signals(&mut writer, signals.subscribe()).await;
            }
            Ok(request) => forward(&tx, request).await?,
            Err(e) => Response::error(format!("invalid request: {}", e)),
        };

        write_response(&mut writer, &response).await?;
        line.clear();
    }

    Ok(())
}

/// Hands a request to the applet task and waits for the reply and for
/// every effect it triggered. The first failed effect replaces the reply.
async fn forward(tx: &mpsc::UnboundedSender<AppletMessage>, request: Request) -> Result<Response> {
    let (reply_tx, reply_rx) = oneshot::channel();
    tx.send(AppletMessage::Request {
        request,
        reply: reply_tx,
    })
    .map_err(|_| anyhow!("applet is shutting down"))?;

    let pending = reply_rx.await.map_err(|_| anyhow!("applet dropped the request"))?;
    let mut response = pending.response;
    for completion in pending.completions {
        match completion.await {
            Ok(Ok(())) => {}
            Ok(Err(message)) => {
                if !matches!(response, Response::Error { .. }) {
                    response = Response::Error { message };
                }
            }
            Err(_) => tracing::debug!("Effect finished without reporting"),
        }
    }
    Ok(response)
}

async fn stream_signals(writer: &mut OwnedWriteHalf, mut signals: broadcast::Receiver<AppletSignal>) -> Result<()> {
    write_response(writer, &Response::success("subscribed")).await?;

    loop {
        match signals.recv().await {
            Ok(signal) => write_response(writer, &Response::Signal { signal }).await?,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Subscriber lagged, {} signals dropped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        }
    }
}

async fn write_response(writer: &mut OwnedWriteHalf, response: &Response) -> Result<()> {
    let response_json = serde_json::to_string(response)?;
    writer.write_all(response_json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::PendingReply;
    use serde_json::json;

    #[test]
    fn requests_use_tagged_json() {
        let call: Request =
            serde_json::from_str(r#"{"type":"Call","method":"SetBluetoothStatus","args":true}"#).unwrap();
        assert_eq!(
            call,
            Request::Call {
                method: "SetBluetoothStatus".into(),
                args: json!(true)
            }
        );

        let bare: Request = serde_json::from_str(r#"{"type":"Call","method":"GetMenu"}"#).unwrap();
        assert_eq!(
            bare,
            Request::Call {
                method: "GetMenu".into(),
                args: Value::Null
            }
        );
        assert_eq!(
            serde_json::to_string(&Request::LoadPlugin { id: "PowerManager".into() }).unwrap(),
            r#"{"type":"LoadPlugin","id":"PowerManager"}"#
        );
    }

    #[tokio::test]
    async fn failed_effect_replaces_reply() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(AppletMessage::Request { reply, .. }) = rx.recv().await {
                let (done_tx, done_rx) = oneshot::channel();
                let _ = done_tx.send(Err("mechanism unavailable".to_string()));
                let _ = reply.send(PendingReply {
                    response: Response::Value { value: Value::Null },
                    completions: vec![done_rx],
                });
            }
        });

        let response = forward(&tx, Request::Call {
            method: "SetBluetoothStatus".into(),
            args: json!(true),
        })
        .await
        .unwrap();
        assert_eq!(response, Response::error("mechanism unavailable"));
    }

    #[tokio::test]
    async fn socket_round_trip_and_subscription() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("applet.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (signals, _) = broadcast::channel(16);

        tokio::spawn(IpcServer::new(listener, tx, signals.clone()).run());
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let AppletMessage::Request { reply, .. } = message {
                    let _ = reply.send(PendingReply::ready(Response::success("ok")));
                }
            }
        });

        let client = crate::client::AppletClient::new(&path);
        assert_eq!(client.send_request(&Request::Quit).await.unwrap(), Response::success("ok"));

        let mut subscription = client.subscribe().await.unwrap();
        signals.send(AppletSignal::MenuChanged).unwrap();
        assert_eq!(subscription.next().await.unwrap(), Some(AppletSignal::MenuChanged));
    }
}
