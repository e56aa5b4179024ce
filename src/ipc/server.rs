//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications of state
//! events to subscribed clients.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::app::{ChannelError, ControlError, Controller};
use crate::events::StateEvent;

use super::protocol::{DaemonStatus, Notification, Request, Response, MAX_FRAME_LEN};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    controller: Controller,
    start_time: Instant,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind the socket, replacing a stale one
    pub fn bind(socket_path: &Path, controller: Controller) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            controller,
            start_time: Instant::now(),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let controller = self.controller.clone();
                    let start_time = self.start_time;
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, controller, start_time) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(
        stream: UnixStream,
        controller: Controller,
        start_time: Instant,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();

        // frames are read on their own task so a pending read is never
        // cancelled halfway by a notification
        let (request_tx, mut request_rx) = mpsc::channel(16);
        let reader_task = tokio::spawn(async move {
            loop {
                match read_frame(&mut reader).await {
                    Ok(Some(frame)) => {
                        let request = serde_json::from_slice::<Request>(&frame)
                            .map_err(|e| e.to_string());
                        if request_tx.send(request).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("client disconnected");
                        break;
                    }
                    Err(e) => {
                        warn!(?e, "failed to read request");
                        break;
                    }
                }
            }
        });

        let mut events: Option<broadcast::Receiver<StateEvent>> = None;

        let result = loop {
            tokio::select! {
                request = request_rx.recv() => {
                    let Some(request) = request else {
                        break Ok(());
                    };
                    let response = match request {
                        Ok(request) => {
                            debug!(?request, "received request");
                            let (response, subscribe) =
                                Self::process_request(request, &controller, start_time).await;
                            if subscribe {
                                match controller.subscribe().await {
                                    Ok(rx) => {
                                        events = Some(rx);
                                        debug!("client subscribed to notifications");
                                        response
                                    }
                                    Err(e) => error_response(&e),
                                }
                            } else {
                                response
                            }
                        }
                        Err(message) => Response::error("bad_request", message),
                    };
                    if let Err(e) = write_frame(&mut writer, &response).await {
                        break Err(e);
                    }
                }
                event = next_event(&mut events) => {
                    let notification = match event {
                        Ok(event) => Notification::StateEvent { event },
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "subscriber lagged");
                            Notification::Lagged { skipped }
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            events = None;
                            continue;
                        }
                    };
                    if let Err(e) = write_frame(&mut writer, &notification).await {
                        break Err(e);
                    }
                }
            }
        };

        reader_task.abort();
        result
    }

    /// Process a request and return a response
    /// Returns (Response, should_subscribe)
    async fn process_request(
        request: Request,
        controller: &Controller,
        start_time: Instant,
    ) -> (Response, bool) {
        let result = match request {
            Request::Ping => return (Response::Pong, false),

            Request::Subscribe => return (Response::Subscribed, true),

            Request::GetStatus => {
                let response = match controller.status().await {
                    Ok(core) => {
                        Response::Status(DaemonStatus::new(core, start_time.elapsed().as_secs()))
                    }
                    Err(e) => error_response(&e),
                };
                return (response, false);
            }

            Request::ToggleChat => controller.toggle_chat().await,
            Request::StartListening => controller.start_listening().await,
            Request::StopListening => controller.stop_listening().await,
            Request::WakeWord { text } => controller.wake_word(text).await,

            Request::SetAecMode { mode } => {
                info!(%mode, "aec mode changed via IPC");
                controller.set_aec_mode(mode).await
            }

            Request::ShowExpression {
                emotion,
                duration_secs,
            } => {
                controller
                    .show_expression(emotion, Duration::from_secs(duration_secs))
                    .await
            }

            Request::Reboot => {
                info!("reboot requested via IPC");
                controller.reboot();
                Ok(())
            }
        };

        let response = match result {
            Ok(()) => Response::Ok,
            Err(e) => error_response(&e),
        };
        (response, false)
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

fn error_response(e: &ControlError) -> Response {
    let code = match e {
        ControlError::Channel(ChannelError::ProtocolNotReady) => "protocol_not_ready",
        ControlError::Channel(ChannelError::OpenFailed) => "open_failed",
        ControlError::DispatcherStopped => "dispatcher_stopped",
    };
    Response::error(code, e.to_string())
}

async fn next_event(
    events: &mut Option<broadcast::Receiver<StateEvent>>,
) -> Result<StateEvent, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Read one length-prefixed frame; `None` on a clean disconnect
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        anyhow::bail!("message too large: {len} bytes");
    }

    let mut frame = vec![0u8; len];
    reader.read_exact(&mut frame).await?;
    Ok(Some(frame))
}

/// Send a length-prefixed JSON message
async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}
