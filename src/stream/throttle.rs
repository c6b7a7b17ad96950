//! Latest-wins rate limiting for frame streams

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Extension trait to add throttling to any Stream
pub trait ThrottleExt: Stream {
    /// Throttle the stream to emit at most once per interval
    ///
    /// Uses "latest-wins" semantics - if multiple items arrive
    /// during an interval, only the latest is emitted.
    fn throttle(self, duration: Duration) -> Throttle<Self>
    where
        Self: Sized,
    {
        Throttle::new(self, duration)
    }
}

impl<T: Stream> ThrottleExt for T {}

pin_project! {
    /// A stream combinator that throttles emission rate
    pub struct Throttle<S: Stream> {
        #[pin]
        stream: S,
        interval: Interval,
        pending: Option<S::Item>,
        ticked: bool,
        finished: bool,
    }
}

impl<S: Stream> Throttle<S> {
    /// Create a new throttled stream
    pub fn new(stream: S, duration: Duration) -> Self {
        let mut interval = interval(duration);
        // Delay rather than burst after a slow consumer
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self { stream, interval, pending: None, ticked: false, finished: false }
    }
}

impl<S: Stream> Stream for Throttle<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if !*this.ticked {
            ready!(this.interval.poll_tick(cx));
            *this.ticked = true;
        }

        // Drain everything that is ready, keeping only the latest
        while !*this.finished {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => *this.pending = Some(item),
                Poll::Ready(None) => *this.finished = true,
                Poll::Pending => break,
            }
        }

        match this.pending.take() {
            Some(item) => {
                *this.ticked = false;
                Poll::Ready(Some(item))
            }
            // Nothing new this interval; the inner stream will wake us
            None if !*this.finished => Poll::Pending,
            None => Poll::Ready(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use futures::stream;

    #[tokio::test(start_paused = true)]
    async fn keeps_only_the_latest_item_per_interval() {
        let throttled = stream::iter(1..=5).throttle(Duration::from_millis(100));
        let items: Vec<i32> = throttled.collect().await;

        assert_eq!(items, vec![5]);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_items_instead_of_ending() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let mut throttled =
            tokio_stream::wrappers::UnboundedReceiverStream::new(rx).throttle(Duration::from_millis(50));

        tx.send(1).unwrap();
        assert_eq!(throttled.next().await, Some(1));

        let sender = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            tx.send(2).unwrap();
            tx.send(3).unwrap();
        });

        assert_eq!(throttled.next().await, Some(3));
        sender.await.unwrap();
        assert_eq!(throttled.next().await, None);
    }
}
