use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::DiscoveryError;

/// Handler name the host application listens on.
pub const VIDEO_FOUND_HANDLER: &str = "onVideoFound";

/// Outbound call into the embedding application.
pub trait HostBridge: Send + Sync {
    fn call_handler(&self, handler: &str, payload: &str) -> Result<(), DiscoveryError>;
}

impl<F> HostBridge for F
where
    F: Fn(&str, &str) + Send + Sync,
{
    fn call_handler(&self, handler: &str, payload: &str) -> Result<(), DiscoveryError> {
        self(handler, payload);
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BridgeMessage {
    pub handler: String,
    pub payload: String,
}

/// Forwards every call into a channel the host drains.
#[derive(Clone, Debug)]
pub struct ChannelBridge {
    tx: UnboundedSender<BridgeMessage>,
}

impl ChannelBridge {
    pub fn new() -> (Self, UnboundedReceiver<BridgeMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl HostBridge for ChannelBridge {
    fn call_handler(&self, handler: &str, payload: &str) -> Result<(), DiscoveryError> {
        self.tx
            .send(BridgeMessage {
                handler: handler.to_string(),
                payload: payload.to_string(),
            })
            .map_err(|_| DiscoveryError::Bridge("host is no longer listening".to_string()))
    }
}
