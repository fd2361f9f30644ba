//! Lazy key enumeration handed from a producer thread to the consumer.

use std::iter::FusedIterator;
use std::sync::mpsc::Receiver;

use crate::error::{KeyOrError, StoreError};

/// Lazy, single-pass sequence of stored keys.
///
/// Keys are produced by a background traversal and handed over one at a
/// time, so the producer never runs ahead of the consumer. An `Err` element
/// ends the sequence. Dropping the stream early stops the traversal at its
/// next hand-off.
pub struct KeyStream {
    receiver: Option<Receiver<KeyOrError>>,
    pending: Option<StoreError>,
}

impl KeyStream {
    pub(crate) fn new(receiver: Receiver<KeyOrError>) -> Self {
        Self {
            receiver: Some(receiver),
            pending: None,
        }
    }

    /// A stream that yields `err` once and then ends.
    pub(crate) fn failed(err: StoreError) -> Self {
        Self {
            receiver: None,
            pending: Some(err),
        }
    }
}

impl Iterator for KeyStream {
    type Item = KeyOrError;

    fn next(&mut self) -> Option<KeyOrError> {
        if let Some(err) = self.pending.take() {
            return Some(Err(err));
        }
        let item = self.receiver.as_ref()?.recv().ok();
        if !matches!(item, Some(Ok(_))) {
            self.receiver = None;
        }
        item
    }
}

impl FusedIterator for KeyStream {}

impl std::fmt::Debug for KeyStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStream")
            .field("open", &self.receiver.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cask_types::Key;
    use std::io;
    use std::sync::mpsc;

    #[test]
    fn failed_stream_yields_its_error_once() {
        let mut stream = KeyStream::failed(StoreError::Io(io::Error::new(
            io::ErrorKind::Other,
            "no thread",
        )));
        assert!(matches!(stream.next(), Some(Err(StoreError::Io(_)))));
        assert!(stream.next().is_none());
    }

    #[test]
    fn error_closes_the_stream() {
        let (tx, rx) = mpsc::channel();
        tx.send(Ok(Key::from([1u8; 4]))).unwrap();
        tx.send(Err(StoreError::LockPoisoned)).unwrap();
        tx.send(Ok(Key::from([2u8; 4]))).unwrap();
        let mut stream = KeyStream::new(rx);
        assert!(matches!(stream.next(), Some(Ok(_))));
        assert!(matches!(stream.next(), Some(Err(StoreError::LockPoisoned))));
        assert!(stream.next().is_none());
        assert!(format!("{stream:?}").contains("open: false"));
    }
}
