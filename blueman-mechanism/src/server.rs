/*!
 * Mechanism IPC Server
 * JSON protocol over Unix socket, caller identity from peer credentials
 */

use anyhow::{bail, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use crate::authority::{Authority, Caller};
use crate::error::MechanismError;
use crate::protocol::{Request, Response};
use crate::rfkill::RfKill;

/// Executes authorized requests.
pub struct RequestHandler {
    authority: Authority,
    rfkill: Option<RfKill>,
}

impl RequestHandler {
    pub fn new(authority: Authority, rfkill: Option<RfKill>) -> Self {
        Self { authority, rfkill }
    }

    pub async fn handle(&self, request: Request, caller: &Caller) -> Response {
        let id = request.id();
        match self.execute(request, caller).await {
            Ok(message) => Response::success(id, message),
            Err(e) => {
                tracing::error!(caller = %caller, "Request {} failed: {}", id, e);
                Response::error(id, &e)
            }
        }
    }

    async fn execute(&self, request: Request, caller: &Caller) -> Result<String, MechanismError> {
        if let Some(action) = request.action_id() {
            self.authority.confirm_authorization(caller, action)?;
        }

        match request {
            Request::Ping { .. } => Ok("pong".to_string()),
            Request::SetRfkillState { state, .. } => {
                let rfkill = self
                    .rfkill
                    .as_ref()
                    .ok_or_else(|| MechanismError::Unavailable("rfkill".to_string()))?;
                rfkill.set_state(state).await?;
                Ok(format!("bluetooth {}", if state { "enabled" } else { "disabled" }))
            }
        }
    }
}

pub struct MechanismServer {
    listener: UnixListener,
    handler: Arc<RequestHandler>,
}

impl MechanismServer {
    pub fn new(listener: UnixListener, handler: RequestHandler) -> Self {
        Self {
            listener,
            handler: Arc::new(handler),
        }
    }

    pub async fn run(self) -> Result<()> {
        tracing::info!("Mechanism listening for connections...");

        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    tracing::debug!("New client connected");
                    let handler = Arc::clone(&self.handler);

                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, &handler).await {
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

async fn handle_client(stream: UnixStream, handler: &RequestHandler) -> Result<()> {
    let cred = stream.peer_cred()?;
    let caller = Caller {
        uid: cred.uid(),
        gid: cred.gid(),
        pid: cred.pid(),
    };

    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let request = line.trim();
        tracing::debug!(caller = %caller, "Received request: {}", request);

        let response = match serde_json::from_str::<Request>(request) {
            Ok(request) => handler.handle(request, &caller).await,
            Err(e) => Response::error(uuid::Uuid::nil(), &MechanismError::from(e)),
        };

        let payload = serde_json::to_string(&response)?;
        write_half.write_all(payload.as_bytes()).await?;
        write_half.write_all(b"\n").await?;

        line.clear();
    }

    Ok(())
}

/// Binds the mechanism socket, replacing a stale socket file but never one
/// a running mechanism still answers on.
pub async fn bind_socket(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if path.exists() {
        if UnixStream::connect(path).await.is_ok() {
            bail!("mechanism already running on {}", path.display());
        }
        fs::remove_file(path)?;
    }
    Ok(UnixListener::bind(path)?)
}
