//! Daemon wiring: listener, playback worker, status notifier, and shutdown.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use playd_engine::command::{Command, StatusEvent};
use playd_engine::controller::Controller;
use playd_engine::decode::{CodecRegistry, DecoderFactory};
use playd_engine::device::{CpalSinkFactory, SinkFactory};
use playd_engine::notifier::{StatusNotifier, StatusSink};
use playd_engine::session::SessionOpener;
use playd_engine::worker::PlaybackWorker;
use playd_proto::FrameError;

use crate::config::DaemonConfig;
use crate::server::{ConnectionEnd, serve_connection};

const STATUS_WRITE_TIMEOUT: Duration = Duration::from_secs(2);
const WAKE_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// The currently connected client, shared between the accept loop and the status notifier.
#[derive(Clone, Default)]
pub struct ConnectionSlot {
    inner: Arc<Mutex<Option<TcpStream>>>,
}

impl ConnectionSlot {
    /// Make `stream` the status destination.
    ///
    /// Clients are served one at a time, so the slot is empty whenever a new one is set.
    pub fn set(&self, stream: TcpStream) {
        if let Err(e) = stream.set_write_timeout(Some(STATUS_WRITE_TIMEOUT)) {
            tracing::debug!("set write timeout failed: {e}");
        }
        if let Ok(mut guard) = self.inner.lock() {
            *guard = Some(stream);
        }
    }

    /// Close and forget the current client.
    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            if let Some(prev) = guard.take() {
                let _ = prev.shutdown(Shutdown::Both);
            }
        }
    }

    /// Stop reading from the current client while still allowing status writes.
    pub fn shutdown_read(&self) {
        if let Ok(guard) = self.inner.lock() {
            if let Some(stream) = guard.as_ref() {
                let _ = stream.shutdown(Shutdown::Read);
            }
        }
    }

    /// Write `event` to the current client. With no client connected the event is dropped.
    pub fn send(&self, event: &StatusEvent) -> Result<()> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("connection lock poisoned"))?;
        let Some(stream) = guard.as_ref() else {
            tracing::debug!(status = ?event.kind, "no client connected; status dropped");
            return Ok(());
        };
        let packet = event.to_packet();
        playd_proto::write_packet(stream, packet.code, packet.payload.as_deref())
            .context("write status")?;
        Ok(())
    }
}

/// Delivers notifier events to whichever client is connected.
pub struct ConnectionStatusSink {
    connection: ConnectionSlot,
}

impl StatusSink for ConnectionStatusSink {
    fn deliver(&mut self, event: &StatusEvent) -> Result<()> {
        self.connection.send(event)
    }
}

/// Asynchronous shutdown request (Ctrl-C), safe to trigger more than once.
pub struct ShutdownSignal {
    requested: AtomicBool,
    controller: Arc<Controller>,
    connection: ConnectionSlot,
    wake_addr: SocketAddr,
}

impl ShutdownSignal {
    pub fn trigger(&self) {
        if self.requested.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("shutdown requested");
        self.controller.post(Command::Quit);
        self.connection.shutdown_read();
        // Unblock a pending accept().
        if let Err(e) = TcpStream::connect_timeout(&self.wake_addr, WAKE_CONNECT_TIMEOUT) {
            tracing::debug!("wake connection failed: {e}");
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Bind `addr`, retrying while it is still in use by a previous instance.
pub fn bind_with_retry(addr: SocketAddr, attempts: u32, delay: Duration) -> Result<TcpListener> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match TcpListener::bind(addr) {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse && attempt < attempts => {
                tracing::warn!(bind = %addr, attempt, attempts, "address in use; retrying");
                thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e).with_context(|| format!("bind {addr}")),
        }
    }
}

fn wake_address(local: SocketAddr) -> SocketAddr {
    let mut addr = local;
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => addr.set_ip(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        IpAddr::V6(ip) if ip.is_unspecified() => addr.set_ip(IpAddr::V6(Ipv6Addr::LOCALHOST)),
        _ => {}
    }
    addr
}

/// A started daemon: listener bound, worker and notifier running.
pub struct Daemon {
    listener: TcpListener,
    local_addr: SocketAddr,
    controller: Arc<Controller>,
    connection: ConnectionSlot,
    signal: Arc<ShutdownSignal>,
    worker: Option<JoinHandle<()>>,
    notifier: Option<StatusNotifier>,
    max_payload: u32,
}

impl Daemon {
    pub fn start(
        config: &DaemonConfig,
        decoders: Arc<dyn DecoderFactory>,
        sinks: Arc<dyn SinkFactory>,
    ) -> Result<Self> {
        let listener = bind_with_retry(config.bind, config.bind_attempts, config.bind_retry_delay)?;
        let local_addr = listener.local_addr().context("listener address")?;

        let controller = Arc::new(Controller::new());
        let connection = ConnectionSlot::default();
        let notifier = StatusNotifier::spawn(ConnectionStatusSink {
            connection: connection.clone(),
        })
        .context("spawn status notifier")?;

        let opener = SessionOpener::new(decoders, sinks, config.engine.clone());
        let worker = PlaybackWorker::new(controller.clone(), opener, Arc::new(notifier.handle()))
            .spawn()
            .context("spawn playback worker")?;

        let signal = Arc::new(ShutdownSignal {
            requested: AtomicBool::new(false),
            controller: controller.clone(),
            connection: connection.clone(),
            wake_addr: wake_address(local_addr),
        });

        Ok(Self {
            listener,
            local_addr,
            controller,
            connection,
            signal,
            worker: Some(worker),
            notifier: Some(notifier),
            max_payload: config.max_payload,
        })
    }

    /// The bound address; useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_signal(&self) -> Arc<ShutdownSignal> {
        self.signal.clone()
    }

    /// Serve clients one at a time until a client sends `Quit` or shutdown is triggered.
    pub fn run(mut self) -> Result<()> {
        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(s) => s,
                Err(e) => {
                    if self.signal.is_requested() {
                        break;
                    }
                    tracing::warn!("accept error: {e}");
                    thread::sleep(Duration::from_millis(100));
                    continue;
                }
            };
            if self.signal.is_requested() {
                break;
            }
            tracing::info!(peer = %peer, "client connected");
            let _ = stream.set_nodelay(true);
            let reader = match stream.try_clone() {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(peer = %peer, "clone client stream failed: {e}");
                    continue;
                }
            };
            self.connection.set(stream);

            match serve_connection(reader, &self.controller, self.max_payload) {
                ConnectionEnd::Quit => {
                    tracing::info!(peer = %peer, "quit requested by client");
                    break;
                }
                ConnectionEnd::Dropped(e) => {
                    if self.signal.is_requested() {
                        break;
                    }
                    // Playback never outlives its controlling client.
                    match e {
                        FrameError::Closed => tracing::info!(peer = %peer, "client disconnected; stopping"),
                        e => tracing::warn!(peer = %peer, "dropping client: {e}"),
                    }
                    self.controller.post(Command::Stop);
                    self.connection.clear();
                }
            }
        }
        self.shutdown();
        Ok(())
    }

    /// Stop the worker, deliver the final status, then close the client.
    fn shutdown(&mut self) {
        if self.worker.is_none() && self.notifier.is_none() {
            return;
        }
        self.controller.post(Command::Quit);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("playback worker panicked");
            }
        }
        if let Some(notifier) = self.notifier.take() {
            notifier.shutdown();
        }
        self.connection.clear();
        tracing::info!("daemon stopped");
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// `playd serve`: real codecs and the cpal output, until Ctrl-C or a client `Quit`.
pub fn run_serve(config: &DaemonConfig) -> Result<()> {
    let decoders: Arc<dyn DecoderFactory> = Arc::new(CodecRegistry);
    let sinks: Arc<dyn SinkFactory> = Arc::new(CpalSinkFactory::new(
        config.device.clone(),
        config.engine.sink_buffer_millis,
    ));
    let daemon = Daemon::start(config, decoders, sinks)?;

    let signal = daemon.shutdown_signal();
    ctrlc::set_handler(move || signal.trigger()).context("install Ctrl-C handler")?;

    tracing::info!(
        bind = %daemon.local_addr(),
        device = config.device.as_deref().unwrap_or("default"),
        chunk_ms = config.engine.chunk_millis,
        "listening (one client at a time)"
    );
    daemon.run()
}

/// `playd devices`.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    for d in playd_engine::device::list_devices(&host)? {
        let marker = if d.is_default { "*" } else { " " };
        if d.max_rate == 0 {
            println!("{marker} {} (no output configs)", d.name);
        } else {
            println!("{marker} {} ({}-{} Hz)", d.name, d.min_rate, d.max_rate);
        }
    }
    Ok(())
}
