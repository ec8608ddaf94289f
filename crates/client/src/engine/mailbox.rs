//! Selective receive over a connection's event mailbox.
//!
//! Every wait in the adapter goes through [`Mailbox`]: events matching the
//! awaited connection/stream pair are returned in delivery order, while
//! events for other streams are deferred (kept aside and re-examined on
//! later waits), never destructively consumed.

use std::collections::VecDeque;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Instant, timeout_at};
use tracing::trace;

use super::Event;

/// Why a wait ended without a matching event.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum WaitError {
    /// No matching event arrived within the configured wait duration.
    Timeout,
    /// The engine dropped the event sender: the connection backend is gone.
    Closed,
}

pub(crate) struct Mailbox {
    events: UnboundedReceiver<Event>,
    deferred: VecDeque<Event>,
}

impl Mailbox {
    pub(crate) fn new(events: UnboundedReceiver<Event>) -> Self {
        Self { events, deferred: VecDeque::new() }
    }

    /// Waits for the next event satisfying `matches`, deferring everything
    /// else. Deferred events from earlier waits are examined first, in
    /// their original delivery order.
    pub(crate) async fn recv<F>(&mut self, timeout: Duration, mut matches: F) -> Result<Event, WaitError>
    where
        F: FnMut(&Event) -> bool,
    {
        if let Some(event) = self.take_deferred(&mut matches) {
            return Ok(event);
        }

        let deadline = Instant::now() + timeout;
        loop {
            match timeout_at(deadline, self.events.recv()).await {
                Ok(Some(event)) => {
                    if matches(&event) {
                        return Ok(event);
                    }
                    trace!(?event, "event does not match awaited stream, deferring");
                    self.deferred.push_back(event);
                }
                Ok(None) => return Err(WaitError::Closed),
                Err(_elapsed) => return Err(WaitError::Timeout),
            }
        }
    }

    /// Poll-level variant of [`recv`] for hand-rolled stream
    /// implementations. `Ready(None)` means the mailbox is closed; the
    /// caller owns its own timeout.
    ///
    /// [`recv`]: Mailbox::recv
    pub(crate) fn poll_matching<F>(&mut self, cx: &mut Context<'_>, mut matches: F) -> Poll<Option<Event>>
    where
        F: FnMut(&Event) -> bool,
    {
        if let Some(event) = self.take_deferred(&mut matches) {
            return Poll::Ready(Some(event));
        }

        loop {
            match self.events.poll_recv(cx) {
                Poll::Ready(Some(event)) => {
                    if matches(&event) {
                        return Poll::Ready(Some(event));
                    }
                    trace!(?event, "event does not match awaited stream, deferring");
                    self.deferred.push_back(event);
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }

    fn take_deferred<F>(&mut self, matches: &mut F) -> Option<Event>
    where
        F: FnMut(&Event) -> bool,
    {
        let pos = self.deferred.iter().position(|event| matches(event))?;
        self.deferred.remove(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StreamId;
    use bytes::Bytes;
    use tokio::sync::mpsc::unbounded_channel;

    fn data(stream: u64, chunk: &'static str, fin: bool) -> Event {
        Event::Data { stream: StreamId(stream), chunk: Bytes::from_static(chunk.as_bytes()), fin }
    }

    #[tokio::test]
    async fn matching_event_is_returned_in_delivery_order() {
        let (tx, rx) = unbounded_channel();
        let mut mailbox = Mailbox::new(rx);

        tx.send(data(1, "a", false)).unwrap();
        tx.send(data(1, "b", true)).unwrap();

        let first = mailbox.recv(Duration::from_millis(100), |e| e.concerns(StreamId(1))).await.unwrap();
        let second = mailbox.recv(Duration::from_millis(100), |e| e.concerns(StreamId(1))).await.unwrap();

        assert_eq!(first, data(1, "a", false));
        assert_eq!(second, data(1, "b", true));
    }

    #[tokio::test]
    async fn non_matching_events_are_deferred_not_dropped() {
        let (tx, rx) = unbounded_channel();
        let mut mailbox = Mailbox::new(rx);

        tx.send(data(7, "stale", true)).unwrap();
        tx.send(data(2, "fresh", true)).unwrap();

        let fresh = mailbox.recv(Duration::from_millis(100), |e| e.concerns(StreamId(2))).await.unwrap();
        assert_eq!(fresh, data(2, "fresh", true));

        // the stale-stream event is still there for a later wait
        let stale = mailbox.recv(Duration::from_millis(100), |e| e.concerns(StreamId(7))).await.unwrap();
        assert_eq!(stale, data(7, "stale", true));
    }

    #[tokio::test]
    async fn wait_times_out_when_nothing_matches() {
        let (tx, rx) = unbounded_channel();
        let mut mailbox = Mailbox::new(rx);

        tx.send(data(9, "other", false)).unwrap();

        let result = mailbox.recv(Duration::from_millis(20), |e| e.concerns(StreamId(1))).await;
        assert_eq!(result, Err(WaitError::Timeout));
    }

    #[tokio::test]
    async fn closed_sender_ends_the_wait() {
        let (tx, rx) = unbounded_channel();
        let mut mailbox = Mailbox::new(rx);
        drop(tx);

        let result = mailbox.recv(Duration::from_millis(100), |_| true).await;
        assert_eq!(result, Err(WaitError::Closed));
    }
}
