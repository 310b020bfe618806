//! Change notification.

use omnivfs_types::FileName;
use strum::Display;
use tokio::sync::mpsc;

/// What happened to a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Changed,
    Deleted,
}

/// A single change notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileChangeEvent {
    pub kind: ChangeKind,
    pub name: FileName,
}

impl FileChangeEvent {
    pub fn new(kind: ChangeKind, name: FileName) -> Self {
        Self { kind, name }
    }
}

/// Receives change notifications for files it is registered on.
///
/// Called synchronously from whichever task fired the event, so
/// implementations should not block.
pub trait FileListener: Send + Sync {
    fn file_created(&self, event: &FileChangeEvent);
    fn file_changed(&self, event: &FileChangeEvent);
    fn file_deleted(&self, event: &FileChangeEvent);

    /// Dispatch on the event kind.
    fn notify(&self, event: &FileChangeEvent) {
        match event.kind {
            ChangeKind::Created => self.file_created(event),
            ChangeKind::Changed => self.file_changed(event),
            ChangeKind::Deleted => self.file_deleted(event),
        }
    }
}

/// Forwards every event into an unbounded channel.
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<FileChangeEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FileChangeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: &FileChangeEvent) {
        // Receiver gone means nobody is interested any more.
        let _ = self.tx.send(event.clone());
    }
}

impl FileListener for ChannelListener {
    fn file_created(&self, event: &FileChangeEvent) {
        self.send(event);
    }

    fn file_changed(&self, event: &FileChangeEvent) {
        self.send(event);
    }

    fn file_deleted(&self, event: &FileChangeEvent) {
        self.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnivfs_types::{NameParser, PathNameParser};

    #[test]
    fn test_channel_listener_forwards() {
        let (listener, mut rx) = ChannelListener::new();
        let name = PathNameParser::new().parse("ram:///a").unwrap();

        listener.notify(&FileChangeEvent::new(ChangeKind::Created, name.clone()));
        listener.notify(&FileChangeEvent::new(ChangeKind::Deleted, name.clone()));

        assert_eq!(rx.try_recv().unwrap().kind, ChangeKind::Created);
        let deleted = rx.try_recv().unwrap();
        assert_eq!(deleted.kind, ChangeKind::Deleted);
        assert_eq!(deleted.name, name);
        assert!(rx.try_recv().is_err());
    }
}
