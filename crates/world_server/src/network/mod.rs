//! Outbound frame delivery and the UDP transport.
//!
//! Everything that produces frames (handlers, zones, the replication tick)
//! writes to a [`FrameSink`]. The production sink is an [`Outbox`] whose
//! queue is drained by the UDP send loop; [`MemorySink`] records frames for
//! tests and offline tools.

pub mod udp;

use std::net::SocketAddr;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

/// Destination for outbound frames.
pub trait FrameSink: Send + Sync {
    fn send(&self, endpoint: SocketAddr, frame: Vec<u8>);

    fn broadcast(&self, endpoints: &[SocketAddr], frame: &[u8]) {
        for endpoint in endpoints {
            self.send(*endpoint, frame.to_vec());
        }
    }
}

/// Unbounded queue feeding the socket writer.
#[derive(Debug, Clone)]
pub struct Outbox {
    sender: mpsc::UnboundedSender<(SocketAddr, Vec<u8>)>,
}

impl Outbox {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(SocketAddr, Vec<u8>)>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl FrameSink for Outbox {
    fn send(&self, endpoint: SocketAddr, frame: Vec<u8>) {
        if self.sender.send((endpoint, frame)).is_err() {
            trace!("📪 Outbox closed, dropping frame for {}", endpoint);
        }
    }
}

/// Sink that keeps every frame in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    frames: Mutex<Vec<(SocketAddr, Vec<u8>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything sent so far.
    pub fn take(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        std::mem::take(&mut *self.frames.lock())
    }

    /// Frames sent to `endpoint`, without removing them.
    pub fn sent_to(&self, endpoint: SocketAddr) -> Vec<Vec<u8>> {
        self.frames
            .lock()
            .iter()
            .filter(|(to, _)| *to == endpoint)
            .map(|(_, frame)| frame.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }
}

impl FrameSink for MemorySink {
    fn send(&self, endpoint: SocketAddr, frame: Vec<u8>) {
        self.frames.lock().push((endpoint, frame));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn outbox_delivers_in_order() {
        let (outbox, mut receiver) = Outbox::new();
        let to = SocketAddr::from(([127, 0, 0, 1], 5000));
        outbox.send(to, vec![1]);
        outbox.broadcast(&[to, to], &[2]);

        assert_eq!(receiver.recv().await, Some((to, vec![1])));
        assert_eq!(receiver.recv().await, Some((to, vec![2])));
        assert_eq!(receiver.recv().await, Some((to, vec![2])));
    }

    #[test]
    fn closed_outbox_drops_silently() {
        let (outbox, receiver) = Outbox::new();
        drop(receiver);
        outbox.send(SocketAddr::from(([127, 0, 0, 1], 5001)), vec![1]);
    }
}
