//! Latest-wins frame buffer shared by the producer and every session
//!
//! The buffer is a latest-value cache with change detection, not a queue.
//! The current frame lives in a `watch` cell: publishing swaps an `Arc` under
//! a short write lock, reading clones the `Arc` under a short read lock, and
//! nobody holds either lock while talking to the network. A reader that polls
//! slower than the producer simply skips frames.
//!
//! A bounded history of the last K frames is kept next to the cell for
//! diagnostics only. Sessions never read it.

use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{trace, warn};

use crate::types::Frame;

/// Default number of frames kept in the diagnostic history
pub const DEFAULT_CAPACITY: usize = 10;

/// Change-notified stream of the newest frame
///
/// Yields the current frame first (if any), then every frame observed after a
/// change. Intermediate frames published while the consumer is busy are
/// skipped.
pub type FrameStream = BoxStream<'static, Arc<Frame>>;

/// Shared latest-value cache between one producer and many readers
pub struct FrameBuffer {
    /// Newest published frame
    current: watch::Sender<Option<Arc<Frame>>>,

    /// Last `capacity` frames, oldest first
    history: Mutex<VecDeque<Arc<Frame>>>,

    capacity: usize,
}

impl FrameBuffer {
    /// Create an empty buffer keeping `capacity` frames of history
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (current, _) = watch::channel(None);
        Self { current, history: Mutex::new(VecDeque::with_capacity(capacity)), capacity }
    }

    /// Replace the current frame
    ///
    /// Returns `false` (and leaves the buffer untouched) if the frame's
    /// sequence id is not newer than the current one, so readers never see
    /// ids go backwards.
    pub fn publish(&self, frame: Frame) -> bool {
        let frame = Arc::new(frame);
        let sequence_id = frame.sequence_id;

        let accepted = self.current.send_if_modified(|slot| match slot {
            Some(current) if current.sequence_id >= sequence_id => false,
            _ => {
                *slot = Some(Arc::clone(&frame));
                true
            }
        });

        if !accepted {
            warn!(
                sequence_id,
                latest = self.latest_sequence_id(),
                "Rejected stale frame"
            );
            return false;
        }

        let mut history = self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(frame);

        trace!("Published frame {}", sequence_id);
        true
    }

    /// Current frame, without consuming it
    pub fn peek(&self) -> Option<Arc<Frame>> {
        self.current.borrow().clone()
    }

    /// True if a frame newer than `last` has been published
    ///
    /// `None` means the caller has not seen any frame yet.
    pub fn has_newer_than(&self, last: Option<u64>) -> bool {
        match (self.latest_sequence_id(), last) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(latest), Some(last)) => latest > last,
        }
    }

    /// Sequence id of the current frame
    pub fn latest_sequence_id(&self) -> Option<u64> {
        self.current.borrow().as_ref().map(|frame| frame.sequence_id)
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> FrameStream {
        WatchStream::new(self.current.subscribe()).filter_map(|frame| async move { frame }).boxed()
    }

    /// Copy of the diagnostic history, oldest first
    pub fn recent(&self) -> Vec<Arc<Frame>> {
        let history = self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        history.iter().cloned().collect()
    }

    /// Maximum history length
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live change subscriptions
    pub fn reader_count(&self) -> usize {
        self.current.receiver_count()
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("latest_sequence_id", &self.latest_sequence_id())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::frame;
    use proptest::prelude::*;
    use std::time::Duration;

    #[test]
    fn empty_buffer_has_nothing() {
        let buffer = FrameBuffer::default();

        assert!(buffer.peek().is_none());
        assert!(!buffer.has_newer_than(None));
        assert_eq!(buffer.latest_sequence_id(), None);
        assert!(buffer.recent().is_empty());
    }

    #[test]
    fn late_reader_sees_only_the_latest_frame() {
        let buffer = FrameBuffer::new(10);
        for id in 1..=5 {
            assert!(buffer.publish(frame(id)));
        }

        let current = buffer.peek().unwrap();
        assert_eq!(current.sequence_id, 5);
        assert_eq!(current.payload.as_ref(), b"frame-5");
    }

    #[test]
    fn peek_does_not_drain() {
        let buffer = FrameBuffer::default();
        buffer.publish(frame(1));

        assert_eq!(buffer.peek().unwrap().sequence_id, 1);
        assert_eq!(buffer.peek().unwrap().sequence_id, 1);
    }

    #[test]
    fn has_newer_than_compares_sequence_ids() {
        let buffer = FrameBuffer::default();
        buffer.publish(frame(3));

        assert!(buffer.has_newer_than(None));
        assert!(buffer.has_newer_than(Some(2)));
        assert!(!buffer.has_newer_than(Some(3)));
        assert!(!buffer.has_newer_than(Some(4)));
    }

    #[test]
    fn stale_frames_are_rejected() {
        let buffer = FrameBuffer::default();
        assert!(buffer.publish(frame(4)));
        assert!(!buffer.publish(frame(4)));
        assert!(!buffer.publish(frame(2)));

        assert_eq!(buffer.latest_sequence_id(), Some(4));
        assert_eq!(buffer.recent().len(), 1);
    }

    #[test]
    fn history_is_bounded() {
        let buffer = FrameBuffer::new(3);
        for id in 1..=7 {
            buffer.publish(frame(id));
        }

        let ids: Vec<u64> = buffer.recent().iter().map(|f| f.sequence_id).collect();
        assert_eq!(ids, vec![5, 6, 7]);
        assert_eq!(FrameBuffer::new(0).capacity(), 1);
    }

    #[test]
    fn stalled_subscriber_never_blocks_publish() {
        let buffer = FrameBuffer::default();
        let _stalled = buffer.subscribe();

        for id in 1..=10_000 {
            assert!(buffer.publish(frame(id)));
        }
        assert_eq!(buffer.latest_sequence_id(), Some(10_000));
        assert_eq!(buffer.reader_count(), 1);
    }

    #[tokio::test]
    async fn subscription_yields_current_then_newer() {
        let buffer = Arc::new(FrameBuffer::default());
        buffer.publish(frame(1));
        buffer.publish(frame(2));

        let mut frames = buffer.subscribe();
        assert_eq!(frames.next().await.unwrap().sequence_id, 2);

        let publisher = Arc::clone(&buffer);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish(frame(3));
        });

        let next = tokio::time::timeout(Duration::from_secs(2), frames.next()).await.unwrap();
        assert_eq!(next.unwrap().sequence_id, 3);
    }

    #[tokio::test]
    async fn subscription_waits_for_first_frame() {
        let buffer = Arc::new(FrameBuffer::default());
        let mut frames = buffer.subscribe();

        let pending = tokio::time::timeout(Duration::from_millis(30), frames.next()).await;
        assert!(pending.is_err(), "no frame should be delivered before the first publish");

        buffer.publish(frame(1));
        let first = tokio::time::timeout(Duration::from_secs(2), frames.next()).await.unwrap();
        assert_eq!(first.unwrap().sequence_id, 1);
    }

    #[test]
    fn concurrent_readers_observe_monotonic_ids() {
        let buffer = Arc::new(FrameBuffer::default());

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    let mut last = 0;
                    for _ in 0..20_000 {
                        if let Some(current) = buffer.peek() {
                            assert!(current.sequence_id >= last);
                            assert_eq!(
                                current.payload,
                                format!("frame-{}", current.sequence_id).into_bytes()
                            );
                            last = current.sequence_id;
                        }
                    }
                })
            })
            .collect();

        for id in 1..=5_000 {
            buffer.publish(frame(id));
        }
        for reader in readers {
            reader.join().unwrap();
        }
    }

    proptest! {
        #[test]
        fn prop_latest_publish_wins(steps in prop::collection::vec(1u64..50, 1..100)) {
            let buffer = FrameBuffer::default();
            let mut id = 0;
            for step in steps {
                id += step;
                prop_assert!(buffer.publish(frame(id)));
            }
            prop_assert_eq!(buffer.peek().unwrap().sequence_id, id);
        }

        #[test]
        fn prop_current_id_never_decreases(ids in prop::collection::vec(1u64..1_000, 1..200)) {
            let buffer = FrameBuffer::new(4);
            let mut observed = 0;
            for id in &ids {
                buffer.publish(frame(*id));
                let current = buffer.latest_sequence_id().unwrap();
                prop_assert!(current >= observed);
                observed = current;
            }
            prop_assert_eq!(observed, *ids.iter().max().unwrap());
            prop_assert!(buffer.recent().len() <= 4);
        }
    }
}
