use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::channel::ChannelToken;

/// Where a listener sits relative to the channels a message was sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventPhase {
    /// The subscription's channel is (or matches) one of the targets.
    #[serde(rename = "AT_TARGET")]
    AtTarget,
    /// The message reached the subscription via an ancestor (publish) or
    /// descendant (broadcast) of the targets.
    #[serde(rename = "BUBBLING_PHASE")]
    Bubbling,
}

impl EventPhase {
    /// DOM-compatible numeric phase.
    pub const fn code(self) -> u8 {
        match self {
            EventPhase::AtTarget => 2,
            EventPhase::Bubbling => 3,
        }
    }
}

/// Envelope options for one delivery.
#[derive(Debug, Clone)]
pub struct DeliveryOptions<'a> {
    pub target: Arc<[String]>,
    pub current_target: &'a ChannelToken,
    pub publish: bool,
    pub broadcast: bool,
    pub source_timestamp: Option<i64>,
}

/// The immutable message handed to a listener.
///
/// Every listener gets its own `Message`; the payload and the target list are
/// shared between them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    data: Arc<Value>,
    target: Arc<[String]>,
    current_target: Arc<str>,
    publish: bool,
    broadcast: bool,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_timestamp: Option<i64>,
    event_phase: EventPhase,
}

impl Message {
    /// Builds an envelope, stamping it with the current time in milliseconds.
    pub fn build(
        data: Arc<Value>,
        options: DeliveryOptions<'_>,
    ) -> Self {
        let event_phase = if options
            .target
            .iter()
            .any(|target| options.current_target.matches_target(target))
        {
            EventPhase::AtTarget
        } else {
            EventPhase::Bubbling
        };

        Self {
            data,
            current_target: Arc::from(options.current_target.as_str()),
            target: options.target,
            publish: options.publish,
            broadcast: options.broadcast,
            timestamp: chrono::Utc::now().timestamp_millis(),
            source_timestamp: options.source_timestamp,
            event_phase,
        }
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// The channels the message was originally sent to.
    pub fn target(&self) -> &[String] {
        &self.target
    }

    /// The channel (or pattern) of the subscription being notified.
    pub fn current_target(&self) -> &str {
        &self.current_target
    }

    pub fn is_publish(&self) -> bool {
        self.publish
    }

    pub fn is_broadcast(&self) -> bool {
        self.broadcast
    }

    /// Creation time, milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Timestamp of the original message when this one was mirrored.
    pub fn source_timestamp(&self) -> Option<i64> {
        self.source_timestamp
    }

    pub fn event_phase(&self) -> EventPhase {
        self.event_phase
    }
}
