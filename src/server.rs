use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::SystemTime;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::{Notify, RwLock};

use crate::config::Config;
use crate::engine::ProtocolEngine;
use crate::error::{HandleError, ListenError};
use crate::message::DhcpMessage;
use crate::snapshot;

const MAX_DATAGRAM: usize = 1500;

/// Readers are in-flight workers about to use the socket; the writer is
/// the shutdown sequence.
struct SocketState {
    abort: bool,
    socket: Option<Arc<UdpSocket>>,
}

pub struct Server {
    config: Config,
    engine: Arc<ProtocolEngine>,
    socket_state: Arc<RwLock<SocketState>>,
    // Wakes the receive loop when stop() is called from outside serve().
    stopped: Notify,
    logger: slog::Logger,
}

impl Server {
    pub fn create(config: &Config, logger: slog::Logger) -> Server {
        let engine = Arc::new(ProtocolEngine::create(config, logger.clone()));
        Server::with_engine(config, engine, logger)
    }

    /// Serve an engine that is shared with other components (the admin API).
    pub fn with_engine(config: &Config, engine: Arc<ProtocolEngine>, logger: slog::Logger) -> Server {
        let srv_logger = logger.new(o!("module" => "server"));

        Server {
            config: config.clone(),
            engine,
            socket_state: Arc::new(RwLock::new(SocketState {
                abort: false,
                socket: None,
            })),
            stopped: Notify::new(),
            logger: srv_logger,
        }
    }

    pub fn engine(&self) -> Arc<ProtocolEngine> {
        self.engine.clone()
    }

    pub async fn serve(&self, shutdown: Arc<Notify>) -> Result<(), ListenError> {
        info!(self.logger, "Serving"; "bind" => %self.config.bind_address);
        let socket = Arc::new(bind_socket(&self.config).map_err(ListenError::Bind)?);

        if let Some(path) = &self.config.lease_file {
            let leases = snapshot::restore(path, &self.logger);
            let restored = self.engine.pool().restore(leases, SystemTime::now()).await;
            info!(self.logger, "Restored leases"; "count" => restored);
        }

        {
            let mut state = self.socket_state.write().await;
            if state.abort {
                debug!(self.logger, "Stopped before serving");
                return Ok(());
            }
            state.socket = Some(socket.clone());
        }

        let reclaimer = tokio::spawn(reclaim_loop(
            self.engine.clone(),
            self.socket_state.clone(),
            self.config.clone(),
            self.logger.new(o!("routine" => "reclaim")),
        ));

        let result = self.recv_loop(&socket, shutdown).await;
        reclaimer.abort();
        self.stop().await;
        result
    }

    /// Set the abort flag, close the socket and persist the active leases.
    ///
    /// Waits for in-flight replies to finish with the socket first. A running
    /// [`Server::serve`] returns once its receive loop observes the stop.
    pub async fn stop(&self) {
        {
            let mut state = self.socket_state.write().await;
            if state.abort {
                return;
            }
            state.abort = true;
            state.socket.take();
        }
        // Stores a permit if the loop is not parked right now.
        self.stopped.notify_one();
        info!(self.logger, "Stopped");

        if let Some(path) = &self.config.lease_file {
            let leases = self.engine.pool().active_leases().await;
            match snapshot::save(path, &leases) {
                Ok(()) => {
                    info!(self.logger, "Saved lease snapshot"; "path" => %path.display(), "count" => leases.len())
                }
                Err(err) => {
                    error!(self.logger, "Failed saving lease snapshot: {}", err; "path" => %path.display())
                }
            }
        }
    }

    async fn recv_loop(&self, socket: &UdpSocket, shutdown: Arc<Notify>) -> Result<(), ListenError> {
        let logger = self.logger.new(o!("routine" => "recv_loop"));
        let destination = SocketAddrV4::new(self.config.broadcast_address, self.config.client_port);
        loop {
            let mut buf = [0; MAX_DATAGRAM];
            debug!(logger, "Waiting for packet");
            tokio::select! {
                received = socket.recv_from(&mut buf) => {
                    let (n, src) = match received {
                        Ok(received) => received,
                        Err(err) => {
                            if self.socket_state.read().await.abort {
                                return Ok(());
                            }
                            warn!(logger, "Error while reading from socket: {}", err);
                            continue;
                        }
                    };
                    if self.socket_state.read().await.abort {
                        debug!(logger, "Dropping packet received after abort");
                        return Ok(());
                    }
                    debug!(logger, "Got packet"; "src" => %src, "len" => n);

                    let worker = Worker {
                        engine: self.engine.clone(),
                        socket_state: self.socket_state.clone(),
                        destination,
                        logger: logger.new(o!("routine" => "worker", "src" => src.to_string())),
                    };
                    let datagram = buf[..n].to_vec();
                    tokio::spawn(async move { worker.run(datagram).await });
                },
                _ = shutdown.notified() => {
                    info!(logger, "Shutting down");
                    return Ok(());
                }
                _ = self.stopped.notified() => {
                    debug!(logger, "Stop requested");
                    return Ok(());
                }
            }
        }
    }
}

/// Handles a single datagram.
struct Worker {
    engine: Arc<ProtocolEngine>,
    socket_state: Arc<RwLock<SocketState>>,
    destination: SocketAddrV4,
    logger: slog::Logger,
}

impl Worker {
    async fn run(self, datagram: Vec<u8>) {
        match self.handle(&datagram).await {
            Ok(()) => {}
            Err(HandleError::Message(err)) => {
                warn!(self.logger, "Discarding malformed packet: {}", err)
            }
            Err(err) => error!(self.logger, "{}", err),
        }
    }

    async fn handle(&self, datagram: &[u8]) -> Result<(), HandleError> {
        let message = DhcpMessage::decode(datagram)?;
        let reply = match self.engine.handle(&message, SystemTime::now()).await {
            Some(reply) => reply,
            None => return Ok(()),
        };

        // Held across the send so shutdown cannot close the socket under us.
        let state = self.socket_state.read().await;
        let socket = match (&state.socket, state.abort) {
            (Some(socket), false) => socket,
            _ => {
                debug!(self.logger, "Aborted, not sending reply");
                return Ok(());
            }
        };
        socket
            .send_to(&reply.encode(), self.destination)
            .await
            .map_err(HandleError::Send)?;
        debug!(self.logger, "Sent reply"; "dst" => %self.destination);
        Ok(())
    }
}

async fn reclaim_loop(
    engine: Arc<ProtocolEngine>,
    socket_state: Arc<RwLock<SocketState>>,
    config: Config,
    logger: slog::Logger,
) {
    let mut interval = tokio::time::interval(config.reclaim_interval());
    loop {
        interval.tick().await;
        if socket_state.read().await.abort {
            return;
        }
        let reclaimed = engine.reclaim(SystemTime::now()).await;
        if !reclaimed.is_empty() {
            info!(logger, "Reclaimed leases"; "count" => reclaimed.len());
        }
    }
}

fn bind_socket(config: &Config) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    if let Some(interface) = &config.bind_interface {
        bind_to_device(&socket, interface)?;
    }
    socket.bind(&SocketAddr::V4(config.bind_address).into())?;

    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into())
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn bind_to_device(socket: &Socket, interface: &str) -> std::io::Result<()> {
    socket.bind_device(Some(interface.as_bytes()))
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn bind_to_device(_socket: &Socket, interface: &str) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!("binding to device {} is only supported on Linux", interface),
    ))
}
