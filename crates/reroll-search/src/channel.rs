//! Progress channel between a running search and its consumer.
//!
//! The producer side never blocks. The consumer side is a [`Stream`] whose
//! drop cancels the search it belongs to.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

use reroll_core::ProgressEvent;

/// Create a connected sender/stream pair for one search.
pub fn progress_channel(
    search_id: Uuid,
    cancel: CancellationToken,
) -> (ProgressSender, ProgressStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stream = ProgressStream {
        search_id,
        rx,
        _guard: cancel.clone().drop_guard(),
        cancel,
    };
    (ProgressSender { tx }, stream)
}

/// Producer end, owned by the search task.
#[derive(Debug)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSender {
    /// Push a non-terminal event. Returns `false` once the consumer is gone.
    pub fn emit(&self, event: ProgressEvent) -> bool {
        debug_assert!(!event.is_terminal(), "terminal events go through finish()");
        self.tx.send(event).is_ok()
    }

    /// Push the terminal event and close the channel.
    pub fn finish(self, event: ProgressEvent) {
        debug_assert!(event.is_terminal(), "finish() takes a terminal event");
        let _ = self.tx.send(event);
    }

    /// Whether the consumer has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer end of a search.
///
/// Yields events in emission order and ends right after the terminal event.
/// Dropping it cancels the search.
#[derive(Debug)]
pub struct ProgressStream {
    search_id: Uuid,
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl ProgressStream {
    pub fn search_id(&self) -> Uuid {
        self.search_id
    }

    /// Ask the search to stop. The stream still delivers the final
    /// `Search cancelled` error.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A token that cancels this search without borrowing the stream.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Stream for ProgressStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
