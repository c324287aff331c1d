//! Chat transport plugin interface.
//!
//! ```text
//! Chat platform
//!     ↓ (platform-specific protocol)
//! ChannelPlugin::start() spawns listener
//!     ↓ (InboundEvent via mpsc)
//! Gateway::handle_event()
//!     ↓ (Messenger calls)
//! Chat platform
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;

use postgate_posts::Messenger;
use postgate_types::InboundEvent;

/// Lifecycle state of a channel plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    Stopped,
    Starting,
    Running,
    Error(String),
}

/// A chat platform connection: an inbound event source plus a [`Messenger`].
///
/// Use `&self` for all methods; implementations keep mutable state behind
/// interior mutability.
#[async_trait::async_trait]
pub trait ChannelPlugin: Send + Sync {
    /// Platform identifier, e.g. "telegram".
    fn channel_type(&self) -> &str;

    /// Connect and start pushing events into `sender`.
    async fn start(&self, sender: mpsc::Sender<InboundEvent>) -> anyhow::Result<()>;

    async fn stop(&self) -> anyhow::Result<()>;

    /// Outbound side of the connection.
    fn messenger(&self) -> Arc<dyn Messenger>;

    fn status(&self) -> ChannelStatus;

    /// Publish the command menu, where the platform supports one.
    async fn register_commands(&self, _commands: &[(&str, &str)]) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use postgate_posts::testing::RecordingMessenger;
    use tokio::sync::Mutex;

    struct MockChannel {
        sender: Mutex<Option<mpsc::Sender<InboundEvent>>>,
        messenger: Arc<RecordingMessenger>,
    }

    #[async_trait::async_trait]
    impl ChannelPlugin for MockChannel {
        fn channel_type(&self) -> &str {
            "mock"
        }

        async fn start(&self, sender: mpsc::Sender<InboundEvent>) -> anyhow::Result<()> {
            *self.sender.lock().await = Some(sender);
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            self.sender.lock().await.take();
            Ok(())
        }

        fn messenger(&self) -> Arc<dyn Messenger> {
            self.messenger.clone()
        }

        fn status(&self) -> ChannelStatus {
            match self.sender.try_lock() {
                Ok(sender) if sender.is_some() => ChannelStatus::Running,
                _ => ChannelStatus::Stopped,
            }
        }
    }

    #[tokio::test]
    async fn test_mock_channel_lifecycle() {
        let channel: Arc<dyn ChannelPlugin> = Arc::new(MockChannel {
            sender: Mutex::new(None),
            messenger: Arc::new(RecordingMessenger::new()),
        });
        assert_eq!(channel.status(), ChannelStatus::Stopped);

        let (tx, mut rx) = mpsc::channel(4);
        channel.start(tx).await.unwrap();
        assert_eq!(channel.status(), ChannelStatus::Running);
        channel.register_commands(&[("scan", "Scan now")]).await.unwrap();

        channel.stop().await.unwrap();
        assert_eq!(channel.status(), ChannelStatus::Stopped);
        assert!(rx.recv().await.is_none());
    }
}
