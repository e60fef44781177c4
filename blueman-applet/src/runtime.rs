/*!
 * Applet Runtime
 * Main loop, effect execution and task wiring
 */

use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{UnixListener, UnixStream};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

use blueman_mechanism::MechanismClient;

use crate::applet::Applet;
use crate::bluetooth::{BluetoothManager, BluezUpdate};
use crate::config::{AppletConfig, GeneralConfig};
use crate::ipc::{IpcServer, Request, Response};
use crate::plugin::{AppletSignal, Effect};

/// Everything the applet task reacts to.
#[derive(Debug)]
pub enum AppletMessage {
    Bluez(BluezUpdate),
    Request {
        request: Request,
        reply: oneshot::Sender<PendingReply>,
    },
    Quit,
}

impl From<BluezUpdate> for AppletMessage {
    fn from(update: BluezUpdate) -> Self {
        AppletMessage::Bluez(update)
    }
}

/// Reply to an IPC request plus completion handles of the effects it queued.
#[derive(Debug)]
pub struct PendingReply {
    pub response: Response,
    pub completions: Vec<oneshot::Receiver<Result<(), String>>>,
}

impl PendingReply {
    pub fn ready(response: Response) -> Self {
        Self {
            response,
            completions: Vec::new(),
        }
    }
}

/// Executes plugin effects outside the plugin core.
#[derive(Clone)]
pub struct EffectRunner {
    signals: broadcast::Sender<AppletSignal>,
    mechanism: MechanismClient,
    bluetooth: Option<BluetoothManager>,
    quit: mpsc::UnboundedSender<AppletMessage>,
    manager: Arc<Mutex<Option<Child>>>,
    settings: GeneralConfig,
}

impl EffectRunner {
    pub fn new(
        signals: broadcast::Sender<AppletSignal>,
        mechanism: MechanismClient,
        bluetooth: Option<BluetoothManager>,
        quit: mpsc::UnboundedSender<AppletMessage>,
        settings: GeneralConfig,
    ) -> Self {
        Self {
            signals,
            mechanism,
            bluetooth,
            quit,
            manager: Arc::new(Mutex::new(None)),
            settings,
        }
    }

    /// Starts an effect. Signals and quit requests complete immediately;
    /// everything else runs on its own task and reports through the
    /// returned receiver.
    pub fn run(&self, effect: Effect) -> Option<oneshot::Receiver<Result<(), String>>> {
        match effect {
            Effect::Signal(signal) => {
                // No subscribers is fine.
                let _ = self.signals.send(signal);
                None
            }
            Effect::Quit => {
                let _ = self.quit.send(AppletMessage::Quit);
                None
            }
            effect => {
                let (done_tx, done_rx) = oneshot::channel();
                let runner = self.clone();
                tokio::spawn(async move {
                    let description = format!("{:?}", effect);
                    let result = runner.execute(effect).await.map_err(|e| format!("{:#}", e));
                    if let Err(e) = &result {
                        warn!("Effect {} failed: {}", description, e);
                    }
                    let _ = done_tx.send(result);
                });
                Some(done_rx)
            }
        }
    }

    pub fn run_all(&self, effects: Vec<Effect>) -> Vec<oneshot::Receiver<Result<(), String>>> {
        effects.into_iter().filter_map(|effect| self.run(effect)).collect()
    }

    fn bluez(&self) -> Result<&BluetoothManager> {
        self.bluetooth
            .as_ref()
            .ok_or_else(|| anyhow!("not connected to the system bus"))
    }

    async fn execute(&self, effect: Effect) -> Result<()> {
        match effect {
            Effect::SetRfkillState { state } => {
                self.mechanism.set_rfkill_state(state).await?;
                info!("Bluetooth switched {}", if state { "on" } else { "off" });
            }
            Effect::ConnectDevice(path) => self.bluez()?.connect_device(&path).await?,
            Effect::DisconnectDevice(path) => self.bluez()?.disconnect_device(&path).await?,
            Effect::RemoveDevice { adapter, device } => self.bluez()?.remove_device(&adapter, &device).await?,
            Effect::Spawn { program, args } => spawn_and_wait(&program, &args).await?,
            Effect::ActivateManager { toggle } => self.activate_manager(toggle).await?,
            Effect::Signal(_) | Effect::Quit => {}
        }
        Ok(())
    }

    /// Starts the device manager, or stops it when `toggle` is set and it
    /// is already running.
    async fn activate_manager(&self, toggle: bool) -> Result<()> {
        let mut manager = self.manager.lock().await;

        if let Some(child) = manager.as_mut() {
            if child.try_wait()?.is_none() {
                if toggle {
                    debug!("Closing device manager");
                    child.kill().await?;
                    *manager = None;
                } else {
                    debug!("Device manager already running");
                }
                return Ok(());
            }
        }

        let Some((program, args)) = self.settings.manager_command.split_first() else {
            bail!("no device manager command configured");
        };
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start {}", program))?;
        info!("Started device manager: {}", program);
        *manager = Some(child);
        Ok(())
    }
}

async fn spawn_and_wait(program: &str, args: &[String]) -> Result<()> {
    debug!("Running {} {:?}", program, args);
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .status()
        .await
        .with_context(|| format!("failed to start {}", program))?;

    if !status.success() {
        bail!("{} exited with {}", program, status);
    }
    Ok(())
}

/// Binds the applet socket. A stale socket file is replaced; one that
/// still accepts connections belongs to a running applet.
pub async fn bind_socket(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if path.exists() {
        if UnixStream::connect(path).await.is_ok() {
            bail!("applet already running on {}", path.display());
        }
        debug!("Removing stale socket {}", path.display());
        fs::remove_file(path)?;
    }
    Ok(UnixListener::bind(path)?)
}

/// Runs the applet until a quit request or Ctrl-C.
pub async fn run(config: AppletConfig) -> Result<()> {
    let socket = Path::new(&config.socket_path);
    let listener = bind_socket(socket).await?;

    let (tx, mut rx) = mpsc::unbounded_channel::<AppletMessage>();
    let (signals, _) = broadcast::channel(64);

    let bluetooth = match BluetoothManager::connect(Duration::from_secs(config.bluetooth.dbus_timeout_secs)) {
        Ok(manager) => Some(manager),
        Err(e) => {
            error!("Failed to connect to the system bus: {}", e);
            None
        }
    };
    let _watch = match &bluetooth {
        Some(manager) => Some(
            manager
                .watch(tx.clone(), config.bluetooth.max_retries, &config.bluetooth.rfkill_class)
                .await?,
        ),
        None => None,
    };

    let mechanism = MechanismClient::new(
        &config.mechanism_socket,
        Duration::from_secs(config.bluetooth.dbus_timeout_secs),
    );
    let runner = EffectRunner::new(
        signals.clone(),
        mechanism,
        bluetooth,
        tx.clone(),
        config.general.clone(),
    );

    let mut applet = Applet::from_config(&config)?;
    runner.run_all(applet.start()?);

    let server = tokio::spawn(IpcServer::new(listener, tx.clone(), signals.clone()).run());
    info!("Blueman applet ready on socket: {}", config.socket_path);

    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(AppletMessage::Bluez(update)) => {
                    runner.run_all(applet.handle_bluez(update));
                }
                Some(AppletMessage::Request { request, reply }) => {
                    let (response, effects) = applet.handle_request(request);
                    let completions = runner.run_all(effects);
                    let _ = reply.send(PendingReply { response, completions });
                }
                Some(AppletMessage::Quit) | None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    runner.run_all(applet.shutdown());
    server.abort();
    let _ = fs::remove_file(socket);
    info!("Blueman applet stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> (EffectRunner, broadcast::Receiver<AppletSignal>, mpsc::UnboundedReceiver<AppletMessage>) {
        let (signals, signal_rx) = broadcast::channel(8);
        let (quit, quit_rx) = mpsc::unbounded_channel();
        let runner = EffectRunner::new(
            signals,
            MechanismClient::new("/nonexistent/mechanism.sock", Duration::from_millis(200)),
            None,
            quit,
            GeneralConfig::default(),
        );
        (runner, signal_rx, quit_rx)
    }

    #[tokio::test]
    async fn signals_and_quit_complete_immediately() {
        let (runner, mut signal_rx, mut quit_rx) = runner();

        assert!(runner.run(Effect::Signal(AppletSignal::MenuChanged)).is_none());
        assert_eq!(signal_rx.recv().await.unwrap(), AppletSignal::MenuChanged);

        assert!(runner.run(Effect::Quit).is_none());
        assert!(matches!(quit_rx.recv().await, Some(AppletMessage::Quit)));
    }

    #[tokio::test]
    async fn failures_reach_the_completion() {
        let (runner, _signals, _quit) = runner();

        let rfkill = runner.run(Effect::SetRfkillState { state: true }).unwrap();
        assert!(rfkill.await.unwrap().is_err());

        let connect = runner
            .run(Effect::ConnectDevice("/org/bluez/hci0/dev_AA".into()))
            .unwrap();
        assert_eq!(connect.await.unwrap(), Err("not connected to the system bus".to_string()));

        let script = runner
            .run(Effect::Spawn {
                program: "false".into(),
                args: vec![],
            })
            .unwrap();
        assert!(script.await.unwrap().is_err());

        let ok = runner
            .run(Effect::Spawn {
                program: "true".into(),
                args: vec![],
            })
            .unwrap();
        assert_eq!(ok.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn live_socket_is_not_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blueman").join("applet.sock");

        let first = bind_socket(&path).await.unwrap();
        let err = bind_socket(&path).await.unwrap_err();
        assert!(err.to_string().contains("applet already running"));

        drop(first);
        assert!(path.exists());
        let _second = bind_socket(&path).await.unwrap();
    }
}
