//! Bounded hand-off between the SeedLink producer and the storage writer.
//!
//! The producer never blocks indefinitely: a full queue makes `enqueue`
//! give up after its timeout so the caller can drop the packet. The writer
//! polls with a timeout so it can notice shutdown between packets.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TryRecvError};

use crate::packet::WaveformPacket;

#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    /// No room freed up within the timeout. Carries the rejected packet.
    #[error("queue full")]
    Full(Box<WaveformPacket>),
    /// The writer side is gone.
    #[error("queue closed")]
    Closed(Box<WaveformPacket>),
}

/// Outcome of waiting on the queue.
#[derive(Debug, PartialEq)]
pub enum Dequeued {
    Packet(WaveformPacket),
    /// Nothing arrived within the timeout.
    Idle,
    /// Every sender dropped and the queue is drained.
    Closed,
}

pub fn handoff_queue(capacity: usize) -> (PacketSender, PacketReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (PacketSender { tx }, PacketReceiver { rx })
}

#[derive(Clone, Debug)]
pub struct PacketSender {
    tx: mpsc::Sender<WaveformPacket>,
}

impl PacketSender {
    pub async fn enqueue(
        &self,
        packet: WaveformPacket,
        timeout: Duration,
    ) -> Result<(), EnqueueError> {
        self.tx
            .send_timeout(packet, timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(p) => EnqueueError::Full(Box::new(p)),
                SendTimeoutError::Closed(p) => EnqueueError::Closed(Box::new(p)),
            })
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}

#[derive(Debug)]
pub struct PacketReceiver {
    rx: mpsc::Receiver<WaveformPacket>,
}

impl PacketReceiver {
    pub async fn dequeue(&mut self, timeout: Duration) -> Dequeued {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(packet)) => Dequeued::Packet(packet),
            Ok(None) => Dequeued::Closed,
            Err(_) => Dequeued::Idle,
        }
    }

    /// Take a packet only if one is already waiting.
    pub fn try_dequeue(&mut self) -> Dequeued {
        match self.rx.try_recv() {
            Ok(packet) => Dequeued::Packet(packet),
            Err(TryRecvError::Empty) => Dequeued::Idle,
            Err(TryRecvError::Disconnected) => Dequeued::Closed,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
