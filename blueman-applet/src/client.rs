/*!
 * Blueman Applet Client
 * JSON IPC communication with a running applet
 */

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::OwnedReadHalf;
use tokio::net::UnixStream;

use crate::ipc::{Request, Response};
use crate::plugin::AppletSignal;

pub struct AppletClient {
    socket_path: PathBuf,
}

/// Signal stream of a `Subscribe` connection.
pub struct Subscription {
    lines: Lines<BufReader<OwnedReadHalf>>,
}

impl AppletClient {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    async fn open(&self, request: &Request) -> Result<Lines<BufReader<OwnedReadHalf>>> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (reader, mut writer) = stream.into_split();

        let request_json = serde_json::to_string(request)?;
        writer.write_all(request_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;

        Ok(BufReader::new(reader).lines())
    }

    pub async fn send_request(&self, request: &Request) -> Result<Response> {
        let mut lines = self.open(request).await?;
        match lines.next_line().await? {
            Some(line) => Ok(serde_json::from_str(&line)?),
            None => bail!("applet closed the connection without replying"),
        }
    }

    pub async fn subscribe(&self) -> Result<Subscription> {
        let mut lines = self.open(&Request::Subscribe).await?;
        match lines.next_line().await? {
            Some(line) => match serde_json::from_str::<Response>(&line)? {
                Response::Success { .. } => Ok(Subscription { lines }),
                Response::Error { message } => bail!("subscription refused: {}", message),
                other => bail!("unexpected reply to Subscribe: {:?}", other),
            },
            None => bail!("applet closed the connection without replying"),
        }
    }
}

impl Subscription {
    /// Next signal, or `None` once the applet closes the stream.
    pub async fn next(&mut self) -> Result<Option<AppletSignal>> {
        while let Some(line) = self.lines.next_line().await? {
            if let Response::Signal { signal } = serde_json::from_str::<Response>(&line)? {
                return Ok(Some(signal));
            }
        }
        Ok(None)
    }
}
