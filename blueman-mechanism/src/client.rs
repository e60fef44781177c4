/*!
 * Mechanism Client
 * JSON IPC communication with blueman-mechanism
 */

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::error::MechanismError;
use crate::protocol::{Request, Response};

#[derive(Debug, Clone)]
pub struct MechanismClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl MechanismClient {
    pub fn new(socket_path: impl AsRef<Path>, timeout: Duration) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            timeout,
        }
    }

    pub async fn send_request(&self, request: &Request) -> Result<Response, MechanismError> {
        match tokio::time::timeout(self.timeout, self.exchange(request)).await {
            Ok(result) => result,
            Err(_) => Err(MechanismError::Protocol(format!(
                "no reply from {} within {:?}",
                self.socket_path.display(),
                self.timeout
            ))),
        }
    }

    async fn exchange(&self, request: &Request) -> Result<Response, MechanismError> {
        let mut stream = UnixStream::connect(&self.socket_path).await?;

        let request_json = serde_json::to_string(request)?;
        stream.write_all(request_json.as_bytes()).await?;
        stream.write_all(b"\n").await?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(MechanismError::Protocol("connection closed before reply".to_string()));
        }

        let response: Response = serde_json::from_str(line.trim())?;
        if response.id() != request.id() {
            return Err(MechanismError::Protocol(format!(
                "reply {} does not match request {}",
                response.id(),
                request.id()
            )));
        }
        Ok(response)
    }

    pub async fn ping(&self) -> Result<(), MechanismError> {
        self.send_request(&Request::ping()).await?.into_result().map(|_| ())
    }

    pub async fn set_rfkill_state(&self, state: bool) -> Result<(), MechanismError> {
        let message = self
            .send_request(&Request::set_rfkill_state(state))
            .await?
            .into_result()?;
        tracing::debug!("Mechanism: {}", message);
        Ok(())
    }
}
