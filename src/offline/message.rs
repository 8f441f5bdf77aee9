//! Control messages exchanged between pages and the interceptor.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Commands a page can send, selected by the `action` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum ControlRequest {
    /// Reply with the current store name and entry count
    #[serde(rename = "getCacheInfo")]
    GetCacheInfo,
    /// Delete the current store
    #[serde(rename = "clearCache")]
    ClearCache,
}

/// Replies delivered on the caller's reply port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlReply {
    CacheInfo {
        #[serde(rename = "cacheName")]
        cache_name: String,
        #[serde(rename = "cachedItems")]
        cached_items: usize,
    },
    Cleared {
        success: bool,
    },
}

/// Reply channel supplied with a message.
pub type ReplyPort = oneshot::Sender<ControlReply>;

/// A message posted to the interceptor.
#[derive(Debug)]
pub struct MessageEvent {
    pub data: serde_json::Value,
    pub reply: Option<ReplyPort>,
}

impl MessageEvent {
    /// Build a message and the receiver its reply will arrive on.
    pub fn with_reply(data: serde_json::Value) -> (Self, oneshot::Receiver<ControlReply>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                data,
                reply: Some(tx),
            },
            rx,
        )
    }

    /// The command carried by `data`, or `None` for unknown actions.
    pub fn request(&self) -> Option<ControlRequest> {
        serde_json::from_value(self.data.clone()).ok()
    }
}
