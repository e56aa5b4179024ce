//! voicebot-daemon: runs the device core as a host process
//!
//! This daemon provides:
//! - The event dispatcher thread that owns all device state
//! - The boot-time update and activation workflow
//! - A housekeeping clock
//! - IPC server for control clients
//!
//! Audio, display and network are stand-ins from `host`; no hardware is
//! touched.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use voicebot_core::app::{Application, Controller, DispatcherHost, Peripherals, ProtocolEvents};
use voicebot_core::config::Config;
use voicebot_core::dispatch::{run_clock, Dispatcher};
use voicebot_core::events::StateEvent;
use voicebot_core::host::{LogDisplay, LoopbackProtocol, NullAudio, OfflineUpdateService, ProcessBoard};
use voicebot_core::ipc::Server;
use voicebot_core::lifecycle::ShutdownSignal;
use voicebot_core::ota::{RetryPolicy, ThreadSleeper, UpdateOutcome, UpdateService, UpdateWorkflow};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "voicebot-daemon starting");

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, aec_mode = %config.aec_mode, "configuration loaded");

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    // Core -> IPC subscribers and the log
    let (event_tx, mut event_rx) = broadcast::channel::<StateEvent>(64);

    let dispatcher = Dispatcher::new();
    let handle = dispatcher.handle();
    let peripherals = Peripherals {
        audio: Box::new(NullAudio::new()),
        display: Arc::new(LogDisplay),
        board: Arc::new(ProcessBoard),
    };

    let mut app = Application::new(
        dispatcher.handle(),
        peripherals,
        config.app_options(),
        event_tx,
        Handle::current(),
    );
    app.start();

    let controller = app.controller();
    let protocol_events = app.protocol_events();

    // All device state lives on this thread from here on
    let dispatcher_thread = dispatcher
        .spawn(app)
        .context("failed to start dispatcher thread")?;

    let clock = tokio::spawn(run_clock(handle.clone(), config.clock_interval));
    let booting = tokio::spawn(boot(controller.clone(), protocol_events, config.retry.clone()));

    let server = Server::bind(&config.socket_path, controller)?;

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Log what the core reports
        _ = async {
            loop {
                match event_rx.recv().await {
                    Ok(event) => info!(%event, "state event"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "state event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("state event handler exited");
        }

        // Wait for shutdown signal
        result = shutdown.wait() => {
            match result {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => error!(?e, "failed to listen for shutdown signals"),
            }
        }
    }

    // Cleanup
    info!("shutting down...");

    booting.abort();
    clock.abort();
    server.shutdown().await;

    handle.shutdown();
    match tokio::task::spawn_blocking(move || dispatcher_thread.join()).await {
        Ok(Ok(app)) => info!(state = %app.state(), "dispatcher stopped"),
        Ok(Err(_)) => error!("dispatcher thread panicked"),
        Err(e) => error!(?e, "failed to join dispatcher thread"),
    }

    info!("voicebot-daemon stopped");

    Ok(())
}

/// Run the update workflow, then bring up the protocol
async fn boot(controller: Controller, events: ProtocolEvents, policy: RetryPolicy) {
    let host = DispatcherHost::new(&controller);
    let workflow = tokio::task::spawn_blocking(move || {
        let mut workflow =
            UpdateWorkflow::new(OfflineUpdateService::default(), host, ThreadSleeper, policy);
        let outcome = workflow.run();
        (outcome, workflow.service().current_version())
    });

    let (outcome, version) = match workflow.await {
        Ok(result) => result,
        Err(e) => {
            error!(?e, "update workflow failed");
            return;
        }
    };
    info!(?outcome, "update workflow finished");

    match outcome {
        UpdateOutcome::Rebooting => return,
        UpdateOutcome::ActivationExhausted => {
            warn!("activation gave up, waiting for operator");
            return;
        }
        UpdateOutcome::Ready
        | UpdateOutcome::VersionCheckAbandoned
        | UpdateOutcome::ActivationCancelled => {}
    }

    let protocol = LoopbackProtocol::new(events);
    if let Err(e) = controller
        .install_protocol(Box::new(protocol), version)
        .await
    {
        error!(?e, "failed to install protocol");
    }
}
