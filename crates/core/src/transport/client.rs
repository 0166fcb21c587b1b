use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;

use super::frame_transport::{receive_frame, send_frame, TransportError};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("failed to connect: {0}")]
    Connect(#[source] std::io::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Sends one encoded image and waits for the blurred reply on the same connection.
pub fn send_image<A: ToSocketAddrs>(
    addr: A,
    payload: &[u8],
    timeout: Option<Duration>,
) -> Result<Vec<u8>, ClientError> {
    let mut stream = TcpStream::connect(addr).map_err(ClientError::Connect)?;
    stream
        .set_read_timeout(timeout)
        .map_err(ClientError::Connect)?;
    stream
        .set_write_timeout(timeout)
        .map_err(ClientError::Connect)?;

    send_frame(&mut stream, payload)?;
    log::debug!("Sent {} byte request frame", payload.len());

    let reply = receive_frame(&mut stream, None)?;
    let _ = stream.shutdown(Shutdown::Both);
    log::debug!("Received {} byte reply frame", reply.len());
    Ok(reply)
}
