//! One-shot outcome notifications raised by the controllers.
//!
//! Controllers push into a [`Notifier`]; whatever presents them (a terminal,
//! a toast layer) drains the paired receiver.

use std::fmt;

use tokio::sync::mpsc;
use tracing::debug;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Info,
    Warning,
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// A single user-facing outcome message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: Level,
    pub title: String,
    pub description: Option<String>,
}

impl Notification {
    pub fn new(level: Level, title: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level.as_str(), self.title)?;
        if let Some(description) = &self.description {
            write!(f, ": {description}")?;
        }
        Ok(())
    }
}

/// Receiving half handed to the presentation layer.
pub type Notifications = mpsc::UnboundedReceiver<Notification>;

/// Cloneable sending half held by the controllers.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    pub fn channel() -> (Self, Notifications) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn notify(&self, notification: Notification) {
        debug!(level = notification.level.as_str(), title = %notification.title, "notify");
        // Nobody listening is fine; notifications are fire-and-forget.
        let _ = self.tx.send(notification);
    }

    pub fn success(&self, title: impl Into<String>) {
        self.notify(Notification::new(Level::Success, title));
    }

    pub fn info(&self, title: impl Into<String>) {
        self.notify(Notification::new(Level::Info, title));
    }

    pub fn warning(&self, title: impl Into<String>) {
        self.notify(Notification::new(Level::Warning, title));
    }

    pub fn error(&self, title: impl Into<String>, description: impl Into<String>) {
        self.notify(Notification::new(Level::Error, title).with_description(description));
    }
}

/// Drain every notification currently queued.
pub fn drain(rx: &mut Notifications) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_description() {
        let n = Notification::new(Level::Error, "Could not add the task")
            .with_description("permission denied");
        assert_eq!(
            n.to_string(),
            "[error] Could not add the task: permission denied"
        );
        assert_eq!(
            Notification::new(Level::Success, "Task added").to_string(),
            "[success] Task added"
        );
    }

    #[test]
    fn drain_empties_queue() {
        let (notifier, mut rx) = Notifier::channel();
        notifier.success("one");
        notifier.warning("two");
        let drained = drain(&mut rx);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[1].level, Level::Warning);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn notifying_without_listener_is_harmless() {
        let (notifier, rx) = Notifier::channel();
        drop(rx);
        notifier.info("nobody home");
    }
}
