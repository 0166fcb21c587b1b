use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::session::session_controller::{SessionController, SessionError};
use crate::shared::constants::ACCEPT_ERROR_BACKOFF;
use crate::session::session_logger::LogSessionLogger;
use crate::transport::frame_transport::TransportError;

use super::connection_gate::{ConnectionGate, Permit};

/// Accept-loop limits.
#[derive(Clone, Debug, Default)]
pub struct ServerOptions {
    /// Sessions allowed at once. `None` is unbounded.
    pub max_connections: Option<usize>,
    /// Read/write timeout applied to every accepted socket.
    pub io_timeout: Option<Duration>,
}

/// Stops a running [`BlurServer::serve`] loop from another thread.
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: Arc<AtomicBool>,
    addr: SocketAddr,
}

impl ServerHandle {
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Wake the blocking accept so the loop sees the flag.
        let mut wake = self.addr;
        if wake.ip().is_unspecified() {
            wake.set_ip(match wake {
                SocketAddr::V4(_) => Ipv4Addr::LOCALHOST.into(),
                SocketAddr::V6(_) => Ipv6Addr::LOCALHOST.into(),
            });
        }
        let _ = TcpStream::connect(wake);
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// TCP front end: one thread per accepted connection, each running a
/// [`SessionController`] exchange.
///
/// Session failures are logged and confined to their connection; they never
/// stop the accept loop.
pub struct BlurServer {
    listener: TcpListener,
    controller: Arc<SessionController>,
    gate: Option<ConnectionGate>,
    io_timeout: Option<Duration>,
    shutdown: Arc<AtomicBool>,
}

impl BlurServer {
    pub fn bind(
        addr: &str,
        controller: Arc<SessionController>,
        options: ServerOptions,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self {
            listener,
            controller,
            gate: options.max_connections.map(ConnectionGate::new),
            io_timeout: options.io_timeout,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> io::Result<ServerHandle> {
        Ok(ServerHandle {
            shutdown: Arc::clone(&self.shutdown),
            addr: self.local_addr()?,
        })
    }

    /// Runs the accept loop until the [`ServerHandle`] is stopped, then
    /// waits for in-flight sessions to finish.
    pub fn serve(&self) -> io::Result<()> {
        log::info!("Listening on {}", self.local_addr()?);
        let mut sessions: Vec<JoinHandle<()>> = Vec::new();

        loop {
            // Backpressure: hold a permit before accepting the next client.
            let permit = self.gate.as_ref().map(ConnectionGate::acquire);

            let accepted = self.listener.accept();
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            let Some((stream, peer)) = accepted_or_backoff(accepted, ACCEPT_ERROR_BACKOFF)
            else {
                continue;
            };
            log::info!("Client connected: {peer}");

            sessions.retain(|h| !h.is_finished());
            match self.spawn_session(stream, peer, permit) {
                Ok(handle) => sessions.push(handle),
                Err(e) => log::error!("Failed to start session for {peer}: {e}"),
            }
        }

        log::info!("Shutting down, waiting for {} sessions", sessions.len());
        for handle in sessions {
            if handle.join().is_err() {
                log::error!("Session thread panicked");
            }
        }
        Ok(())
    }

    fn spawn_session(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        permit: Option<Permit>,
    ) -> io::Result<JoinHandle<()>> {
        let controller = Arc::clone(&self.controller);
        let timeout = self.io_timeout;
        let session_id = controller.next_session_id();

        thread::Builder::new()
            .name(format!("session-{session_id}"))
            .spawn(move || {
                let _permit = permit;
                run_session(&controller, session_id, stream, peer, timeout);
            })
    }
}

/// Passes a successful accept through. On failure logs it and sleeps for
/// `backoff`, so persistent errors do not spin the accept loop.
fn accepted_or_backoff<T>(accepted: io::Result<T>, backoff: Duration) -> Option<T> {
    match accepted {
        Ok(pair) => Some(pair),
        Err(e) => {
            log::error!("Accept failed: {e}");
            thread::sleep(backoff);
            None
        }
    }
}

fn run_session(
    controller: &SessionController,
    session_id: u64,
    mut stream: TcpStream,
    peer: SocketAddr,
    timeout: Option<Duration>,
) {
    if let Err(e) = stream
        .set_read_timeout(timeout)
        .and_then(|_| stream.set_write_timeout(timeout))
    {
        log::warn!("Session {session_id}: could not set socket timeout: {e}");
    }

    let mut logger = LogSessionLogger::new(session_id);
    match controller.handle(session_id, &mut stream, &peer.to_string(), &mut logger) {
        Ok(outcome) => log::info!(
            "Session {session_id}: sent blurred image to {peer} (radius {}, blur {}ms)",
            outcome.radius,
            outcome.elapsed_ms
        ),
        Err(failure) => match failure.source {
            SessionError::Transport(TransportError::ConnectionClosed) => {
                log::debug!("Session {session_id}: {peer} closed without sending")
            }
            _ => log::warn!("{failure}"),
        },
    }

    let _ = stream.shutdown(Shutdown::Both);
    log::debug!("Session {session_id}: connection to {peer} closed");
}
