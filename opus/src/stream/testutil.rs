//! Input wrappers that record when they are dropped.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};

/// Wraps an iterator or stream and sets a flag when dropped.
pub(crate) struct DropFlagged<T> {
    inner: T,
    dropped: Arc<AtomicBool>,
}

impl<T> DropFlagged<T> {
    pub(crate) fn new(inner: T) -> (Self, Arc<AtomicBool>) {
        let dropped = Arc::new(AtomicBool::new(false));
        (
            Self {
                inner,
                dropped: dropped.clone(),
            },
            dropped,
        )
    }
}

impl<T> Drop for DropFlagged<T> {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

impl<T: Iterator> Iterator for DropFlagged<T> {
    type Item = T::Item;

    fn next(&mut self) -> Option<T::Item> {
        self.inner.next()
    }
}

impl<T: Stream + Unpin> Stream for DropFlagged<T> {
    type Item = T::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

pub(crate) fn is_set(flag: &AtomicBool) -> bool {
    flag.load(Ordering::SeqCst)
}
