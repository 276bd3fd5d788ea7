//! UDP receive and send loops.
//!
//! Frames are dispatched on the receive loop in arrival order, so frames
//! from one endpoint reach their handlers in the order they were read.
//! Off-loaded handlers may still complete out of order.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

use crate::dispatch::Dispatcher;
use crate::error::ServerError;
use crate::shutdown::ShutdownState;

/// Largest datagram the socket will read.
const RECEIVE_BUFFER: usize = 64 * 1024;

/// Binds the server socket.
pub async fn bind(address: SocketAddr) -> Result<Arc<UdpSocket>, ServerError> {
    let socket = UdpSocket::bind(address)
        .await
        .map_err(|e| ServerError::Network(format!("failed to bind {address}: {e}")))?;
    info!("📡 Listening for datagrams on {}", address);
    Ok(Arc::new(socket))
}

/// Reads datagrams until shutdown, dispatching each one.
pub async fn receive_loop(socket: Arc<UdpSocket>, dispatcher: Dispatcher, shutdown: ShutdownState) {
    let mut buffer = vec![0u8; RECEIVE_BUFFER];
    loop {
        let (len, endpoint) = tokio::select! {
            _ = shutdown.initiated() => {
                info!("🛑 Receive loop stopping - shutdown initiated");
                break;
            }
            received = socket.recv_from(&mut buffer) => match received {
                Ok(received) => received,
                Err(e) => {
                    // ICMP port unreachable surfaces here on some platforms.
                    debug!("Receive error: {}", e);
                    continue;
                }
            },
        };

        trace!("📥 {} byte(s) from {}", len, endpoint);
        dispatcher.receive(endpoint, &buffer[..len]);
    }
}

/// Writes queued frames to the socket until shutdown completes, then
/// flushes whatever is still queued.
pub async fn send_loop(
    socket: Arc<UdpSocket>,
    mut outbound: mpsc::UnboundedReceiver<(SocketAddr, Vec<u8>)>,
    shutdown: ShutdownState,
) {
    loop {
        tokio::select! {
            next = outbound.recv() => match next {
                Some((endpoint, frame)) => send(&socket, endpoint, &frame).await,
                None => break,
            },
            _ = shutdown.completed() => {
                while let Ok((endpoint, frame)) = outbound.try_recv() {
                    send(&socket, endpoint, &frame).await;
                }
                break;
            }
        }
    }
    debug!("Send loop finished");
}

async fn send(socket: &UdpSocket, endpoint: SocketAddr, frame: &[u8]) {
    if let Err(e) = socket.send_to(frame, endpoint).await {
        error!("📤 Failed to send {} byte(s) to {}: {}", frame.len(), endpoint, e);
    }
}
