use tokio::sync::broadcast;

/// Capacity of the notice channel; slow receivers lose the oldest notices.
const NOTICE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
  Success,
  Error,
}

/// User-facing notification raised by a store action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
  pub level: NoticeLevel,
  pub message: String,
}

/// Broadcasts notices to whoever renders them.
#[derive(Debug, Clone)]
pub struct Notifier {
  tx: broadcast::Sender<Notice>,
}

impl Default for Notifier {
  fn default() -> Self {
    Self::new()
  }
}

impl Notifier {
  pub fn new() -> Self {
    let (tx, _rx) = broadcast::channel(NOTICE_CAPACITY);
    Self { tx }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
    self.tx.subscribe()
  }

  pub fn success(&self, message: impl Into<String>) {
    self.send(NoticeLevel::Success, message.into());
  }

  pub fn error(&self, message: impl Into<String>) {
    self.send(NoticeLevel::Error, message.into());
  }

  fn send(&self, level: NoticeLevel, message: String) {
    // No receivers is fine
    let _ = self.tx.send(Notice { level, message });
  }
}
