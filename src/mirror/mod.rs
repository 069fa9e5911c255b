//! Bridge from foreign messages and emitters into a `PubSub`.
//!
//! - `message`: `MirrorMessage`, parsers and `PubSub::mirror`.
//! - `source`: the `EventSource` contract, adapter tables and
//!   `PubSub::source`.
//! - `adapters`: built-in adapters (Generic, jQuery, Angular, PubSub, DOM).

pub mod adapters;
pub mod message;
pub mod source;

pub use message::{MirrorMessage, Parser};
pub use source::{
    add_source_subscriber, default_detection, delete_source_subscriber, Capability, Detection,
    EventHandler, EventSource, ListenParams, SourceAdapter, SourceOptions,
};
