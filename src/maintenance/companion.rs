//! Long-running collaborators the backend only switches on: token rotation
//! and the chat bot.

use futures_util::future::BoxFuture;
use tokio::sync::broadcast;

pub trait Companion: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Run until `shutdown` fires.
    fn start(&self, shutdown: broadcast::Receiver<()>) -> BoxFuture<'static, ()>;
}

/// A companion with nothing to do beyond announcing itself and staying up
/// for the lifetime of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dormant {
    Rotation,
    ChatBot,
}

impl Companion for Dormant {
    fn name(&self) -> &str {
        match self {
            Dormant::Rotation => "rotation",
            Dormant::ChatBot => "chat-bot",
        }
    }

    fn start(&self, mut shutdown: broadcast::Receiver<()>) -> BoxFuture<'static, ()> {
        let kind = *self;
        Box::pin(async move {
            match kind {
                Dormant::Rotation => tracing::info!(target: "backend", "Auto rotation enabled"),
                Dormant::ChatBot => tracing::info!(target: "bot", "Chat bot started"),
            }
            let _ = shutdown.recv().await;
            tracing::debug!(companion = kind.name(), "Companion stopped");
        })
    }
}
