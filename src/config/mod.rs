//! Конфигурация: настройки диспетчера и логирования.

mod pubsub;
mod settings;

pub use pubsub::{ListenerPanicPolicy, PubSubConfig};
pub use settings::{Settings, DEFAULT_CONFIG_FILE};
