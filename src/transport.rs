//! # Transport seam
//!
//! A channel hands finished frames to a [Transport]. Wire I/O, retransmission
//! and fragmentation live behind this trait. [LoopbackTransport] delivers
//! frames in-process, which is enough to drive a channel end to end.

use bytes::Bytes;
use tokio::sync::mpsc::{
    channel, error::TryRecvError, error::TrySendError, unbounded_channel, Receiver, Sender,
    UnboundedReceiver, UnboundedSender,
};

/// This enumeration is the list of the possible error outcomes for
/// [Transport::transmit]
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The receiving side is gone
    #[error("transport closed")]
    Closed,
    /// The transport queue has no room for the frame
    #[error("transport queue full")]
    Full,
}

/// Destination of outbound frames
pub trait Transport: Send + Sync {
    /// Returns false once the transport cannot accept frames any more
    fn is_available(&self) -> bool;

    /// Queues `frame` for delivery
    fn transmit(&self, frame: Bytes, reliable: bool) -> Result<(), TransportError>;
}

/// A frame as delivered by [LoopbackReceiver]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame bytes, header included
    pub bytes: Bytes,
    /// Delivery class requested by the sender
    pub reliable: bool,
}

/// In-process transport backed by a tokio mpsc channel
pub struct LoopbackTransport {
    sender: LoopbackSender,
}

enum LoopbackSender {
    Bounded(Sender<Frame>),
    Unbounded(UnboundedSender<Frame>),
}

/// Receiving end of a [LoopbackTransport]
pub struct LoopbackReceiver {
    receiver: LoopbackQueue,
}

enum LoopbackQueue {
    Bounded(Receiver<Frame>),
    Unbounded(UnboundedReceiver<Frame>),
}

impl LoopbackTransport {
    /// Creates a connected transport and receiver
    ///
    /// Set `buffer_size` to 0 for an unlimited queue
    pub fn pair(buffer_size: usize) -> (LoopbackTransport, LoopbackReceiver) {
        if buffer_size == 0 {
            let (tx, rx) = unbounded_channel();
            let sender = LoopbackSender::Unbounded(tx);
            let receiver = LoopbackQueue::Unbounded(rx);
            (LoopbackTransport { sender }, LoopbackReceiver { receiver })
        } else {
            let (tx, rx) = channel(buffer_size);
            let sender = LoopbackSender::Bounded(tx);
            let receiver = LoopbackQueue::Bounded(rx);
            (LoopbackTransport { sender }, LoopbackReceiver { receiver })
        }
    }
}

impl Transport for LoopbackTransport {
    fn is_available(&self) -> bool {
        match &self.sender {
            LoopbackSender::Bounded(tx) => !tx.is_closed(),
            LoopbackSender::Unbounded(tx) => !tx.is_closed(),
        }
    }

    fn transmit(&self, bytes: Bytes, reliable: bool) -> Result<(), TransportError> {
        let frame = Frame { bytes, reliable };
        match &self.sender {
            LoopbackSender::Bounded(tx) => tx.try_send(frame).map_err(|e| match e {
                TrySendError::Full(_) => TransportError::Full,
                TrySendError::Closed(_) => TransportError::Closed,
            }),
            LoopbackSender::Unbounded(tx) => tx.send(frame).map_err(|_| TransportError::Closed),
        }
    }
}

impl LoopbackReceiver {
    /// Takes the next queued frame without waiting
    pub fn try_recv(&mut self) -> Option<Frame> {
        let frame = match &mut self.receiver {
            LoopbackQueue::Bounded(rx) => rx.try_recv(),
            LoopbackQueue::Unbounded(rx) => rx.try_recv(),
        };
        match frame {
            Ok(frame) => Some(frame),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Waits for the next frame
    ///
    /// Returns None once every transport is dropped and the queue is drained
    pub async fn recv(&mut self) -> Option<Frame> {
        match &mut self.receiver {
            LoopbackQueue::Bounded(rx) => rx.recv().await,
            LoopbackQueue::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Stops accepting frames, the transport becomes unavailable
    pub fn close(&mut self) {
        match &mut self.receiver {
            LoopbackQueue::Bounded(rx) => rx.close(),
            LoopbackQueue::Unbounded(rx) => rx.close(),
        }
    }
}
