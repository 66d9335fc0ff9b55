// Alert delivery module
pub mod messages;
pub mod telegram;

pub use telegram::{NotifyError, TelegramClient, TelegramNotifier};

/// Fire-and-forget alert sink
///
/// `send` must return immediately; delivery failures never reach the caller.
pub trait Notifier: Send + Sync {
    fn send(&self, message: String);
}

/// Writes alerts to the log when no chat is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, message: String) {
        tracing::info!("📣 {}", message.trim());
    }
}
