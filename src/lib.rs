//! Hierarchical in-process publish/subscribe.
//!
//! Listeners subscribe to `/`-separated channels, glob patterns or regular
//! expressions. `publish` walks up the channel tree (the target and every
//! ancestor), `broadcast` walks down (the target and every descendant).
//! Subscriptions may carry a MongoDB-style payload filter, and foreign
//! emitters can be attached through the mirror bridge.

/// Channel paths, glob patterns and subscription tokens.
pub mod channel;
/// Settings loading (`topica.toml`, `TOPICA_*` environment).
pub mod config;
/// Error taxonomy and the crate `Result` alias.
pub mod error;
/// Declarative payload filters.
pub mod filter;
/// Flexible logging (formatting, filters, sinks).
pub mod logging;
/// Bridge for foreign messages and event emitters.
pub mod mirror;
/// Pub/Sub: PubSub, Listener, Message, Unsubscribe.
pub mod pubsub;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Channel model.
pub use channel::{
    compile_pattern, normalize, ChannelSpec, ChannelToken, Channels, CompiledPattern, Targets,
};
/// Configuration.
pub use config::{ListenerPanicPolicy, PubSubConfig, Settings};
/// Errors and result types.
pub use error::{ErrorExt, PubSubError, Result, StatusCode};
/// Filters.
pub use filter::{Filter, IntoFilter};
/// Logging.
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
/// Mirroring and sources.
pub use mirror::{
    add_source_subscriber, delete_source_subscriber, Capability, Detection, EventHandler,
    EventSource, ListenParams, MirrorMessage, Parser, SourceOptions,
};
/// Pub/Sub API.
pub use pubsub::{
    EventPhase, Listener, Message, PubSub, PubSubStats, Selector, Selectors, SubscriptionId,
    Unsubscribe,
};
