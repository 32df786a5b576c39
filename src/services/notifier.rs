use serde::Serialize;
use tokio::sync::broadcast;

use crate::state::content::GameMode;

/// Severity of an operator notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    /// Neutral information.
    Info,
    /// Something went the players' way.
    Success,
    /// Degraded but playable.
    Warning,
    /// An action failed.
    Error,
}

/// Transient message for the presentation layer, rendered as a toast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Mode that raised the notice, if any.
    pub mode: Option<GameMode>,
    /// Human-readable text.
    pub message: String,
}

/// Broadcast hub fanning notices out to every subscriber.
pub struct Notifier {
    sender: broadcast::Sender<Notice>,
}

impl Notifier {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent notices.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }

    /// Send a notice to all current subscribers, ignoring delivery errors.
    pub fn publish(&self, notice: Notice) {
        let _ = self.sender.send(notice);
    }

    fn send(&self, level: NoticeLevel, mode: Option<GameMode>, message: impl Into<String>) {
        self.publish(Notice {
            level,
            mode,
            message: message.into(),
        });
    }

    /// Publish an informational notice.
    pub fn info(&self, mode: Option<GameMode>, message: impl Into<String>) {
        self.send(NoticeLevel::Info, mode, message);
    }

    /// Publish a success notice.
    pub fn success(&self, mode: Option<GameMode>, message: impl Into<String>) {
        self.send(NoticeLevel::Success, mode, message);
    }

    /// Publish a warning.
    pub fn warning(&self, mode: Option<GameMode>, message: impl Into<String>) {
        self.send(NoticeLevel::Warning, mode, message);
    }

    /// Publish an error.
    pub fn error(&self, mode: Option<GameMode>, message: impl Into<String>) {
        self.send(NoticeLevel::Error, mode, message);
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_notices_in_order() {
        let notifier = Notifier::new(8);
        let mut receiver = notifier.subscribe();
        notifier.info(Some(GameMode::WordReveal), "first");
        notifier.error(None, "second");

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.level, NoticeLevel::Info);
        assert_eq!(first.mode, Some(GameMode::WordReveal));
        assert_eq!(receiver.recv().await.unwrap().message, "second");
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let notifier = Notifier::default();
        notifier.warning(None, "nobody listens");
    }
}
