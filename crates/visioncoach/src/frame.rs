//! Frame samples and the latest-wins frame channel
//!
//! The camera produces frames faster than pose estimation can consume them.
//! Frames are never queued: the producer overwrites a single slot and the
//! consumer always takes the newest frame, so latency stays bounded and the
//! backlog can never grow.
//!
//! ```text
//! camera thread                        frame-processing task
//!      │                                        │
//!      ▼                                        ▼
//!  FrameSender::send ──► [ one slot ] ──► FrameReceiver::recv
//!  (overwrites)            (watch)          (skips intermediates,
//!                                            counts them as dropped)
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Which camera produced the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    Front,
    Back,
}

/// Opaque image payload handed to the pose estimator
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    /// Pixel data in whatever layout the camera and estimator agree on
    pub data: Bytes,
}

impl ImageBuffer {
    pub fn new(width: u32, height: u32, data: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            data: data.into(),
        }
    }

    /// Placeholder image for sources that carry no pixels (replay, tests)
    pub fn empty() -> Self {
        Self::default()
    }
}

/// One captured frame. Consumed within a single pipeline tick.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSample {
    pub image: ImageBuffer,
    /// Presentation timestamp, monotonic seconds
    pub timestamp: f64,
    pub facing: Facing,
}

impl FrameSample {
    pub fn new(image: ImageBuffer, timestamp: f64, facing: Facing) -> Self {
        Self {
            image,
            timestamp,
            facing,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    seq: u64,
    frame: Option<FrameSample>,
}

/// Create a connected frame sender/receiver pair
pub fn frame_channel() -> (FrameSender, FrameReceiver) {
    let (slot_tx, slot_rx) = watch::channel(Slot::default());
    let (done_tx, done_rx) = watch::channel(0u64);
    (
        FrameSender {
            slot: slot_tx,
            done: done_rx,
            sent: 0,
        },
        FrameReceiver {
            slot: slot_rx,
            done: done_tx,
            last_seq: 0,
            received: 0,
            dropped: 0,
        },
    )
}

/// Producer half. Owned by the capture side.
pub struct FrameSender {
    slot: watch::Sender<Slot>,
    done: watch::Receiver<u64>,
    sent: u64,
}

impl FrameSender {
    /// Publish a frame, replacing any frame the consumer has not taken yet.
    ///
    /// Returns false once the receiver is gone.
    pub fn send(&mut self, frame: FrameSample) -> bool {
        if self.slot.is_closed() {
            return false;
        }
        self.sent += 1;
        let seq = self.sent;
        self.slot.send_modify(|slot| {
            slot.seq = seq;
            slot.frame = Some(frame);
        });
        true
    }

    /// Wait until the consumer has finished processing everything sent so far.
    ///
    /// Capture sources that must not lose frames (replay in lockstep) call this
    /// between sends. Returns false if the receiver went away first.
    pub async fn until_consumed(&mut self) -> bool {
        let target = self.sent;
        self.done.wait_for(|done| *done >= target).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}

/// Consumer half. Owned by the frame-processing task.
pub struct FrameReceiver {
    slot: watch::Receiver<Slot>,
    done: watch::Sender<u64>,
    last_seq: u64,
    received: u64,
    dropped: u64,
}

impl FrameReceiver {
    /// Take the newest frame, waiting for one if none is pending.
    ///
    /// Calling `recv` again marks the previously returned frame as processed.
    /// Returns `None` once the sender is dropped and no unseen frame remains.
    pub async fn recv(&mut self) -> Option<FrameSample> {
        self.done.send_replace(self.last_seq);

        loop {
            self.slot.changed().await.ok()?;
            let slot = self.slot.borrow_and_update();
            let Some(frame) = slot.frame.clone() else {
                continue;
            };

            self.dropped += slot.seq.saturating_sub(self.last_seq + 1);
            self.last_seq = slot.seq;
            self.received += 1;
            return Some(frame);
        }
    }

    /// Frames handed to the consumer
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Frames overwritten before the consumer got to them
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Drop for FrameReceiver {
    fn drop(&mut self) {
        self.done.send_replace(self.last_seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    fn frame(t: f64) -> FrameSample {
        FrameSample::new(ImageBuffer::empty(), t, Facing::Front)
    }

    #[tokio::test]
    async fn test_latest_frame_wins() {
        let (mut tx, mut rx) = frame_channel();
        assert!(tx.send(frame(0.0)));
        assert!(tx.send(frame(0.1)));
        assert!(tx.send(frame(0.2)));

        let got = rx.recv().await.unwrap();
        assert_eq!(got.timestamp, 0.2);
        assert_eq!(rx.received(), 1);
        assert_eq!(rx.dropped(), 2);
    }

    #[tokio::test]
    async fn test_recv_waits_for_frame() {
        let (mut tx, mut rx) = frame_channel();
        {
            let mut recv = task::spawn(rx.recv());
            assert_pending!(recv.poll());

            tx.send(frame(1.0));
            assert!(recv.is_woken());
            let got = assert_ready!(recv.poll());
            assert_eq!(got.unwrap().timestamp, 1.0);
        }
        assert_eq!(rx.dropped(), 0);
    }

    #[tokio::test]
    async fn test_closed_after_sender_drop() {
        let (mut tx, mut rx) = frame_channel();
        tx.send(frame(0.5));
        drop(tx);

        // The unseen frame is still delivered, then the channel reports closed
        assert_eq!(rx.recv().await.unwrap().timestamp, 0.5);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_after_receiver_drop() {
        let (mut tx, rx) = frame_channel();
        drop(rx);
        assert!(tx.is_closed());
        assert!(!tx.send(frame(0.0)));
    }

    #[tokio::test]
    async fn test_until_consumed_lockstep() {
        let (mut tx, mut rx) = frame_channel();

        let consumer = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(f) = rx.recv().await {
                seen.push(f.timestamp);
            }
            (seen, rx.dropped())
        });

        for i in 0..5 {
            tx.send(frame(i as f64));
            assert!(tx.until_consumed().await);
        }
        drop(tx);

        let (seen, dropped) = consumer.await.unwrap();
        assert_eq!(seen, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(dropped, 0);
    }
}
