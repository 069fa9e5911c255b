use serde::{Deserialize, Serialize};

use crate::{channel::normalize, error::Result};

/// What happens when a listener panics during `publish`/`broadcast`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerPanicPolicy {
    /// The panic unwinds out of the dispatch call; listeners after the
    /// failing one are not notified.
    #[default]
    Propagate,
    /// The panic is caught and logged; delivery continues with the next
    /// listener.
    Isolate,
}

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubConfig {
    /// Channel prefix used by `mirror_default` and by sources without an
    /// explicit base.
    pub default_base: String,
    pub listener_panic_policy: ListenerPanicPolicy,
    /// Emit a `trace!` event for every single delivery.
    pub trace_deliveries: bool,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            default_base: "/".to_string(),
            listener_panic_policy: ListenerPanicPolicy::Propagate,
            trace_deliveries: false,
        }
    }
}

impl PubSubConfig {
    /// Checks the settings and normalizes `default_base`.
    pub fn validate(mut self) -> Result<Self> {
        self.default_base = normalize(&self.default_base)?;
        Ok(self)
    }
}
