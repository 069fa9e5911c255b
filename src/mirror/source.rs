//! Attaching foreign event emitters to a `PubSub`.
//!
//! An emitter describes itself through [`EventSource`]: which subscription
//! styles it supports and how to register a handler. An *adapter* knows one
//! such style and wires the emitter's events into [`PubSub::mirror`].
//! Adapters are looked up by name, first on the instance, then in the
//! process-wide table that ships the built-ins.

use std::{any::Any, sync::Arc};

use ahash::RandomState;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::Value;

use super::{adapters, Parser};
use crate::{
    channel::Targets,
    error::{log_error, PubSubError, Result},
    filter::Filter,
    pubsub::{Message, PubSub},
};

/// Subscription style an emitter can offer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// A user-named method, see [`SourceOptions::on`].
    Custom(String),
    /// jQuery style `on(event, [data], [selector], handler)`.
    On,
    /// Angular style `$on(event, handler)`.
    AngularOn,
    /// PubSub style `subscribe(channel, [filter], handler)`.
    Subscribe,
    /// DOM style `addEventListener(event, handler, [options])`.
    AddEventListener,
}

impl Capability {
    /// The method name the capability stands for.
    pub fn method(&self) -> &str {
        match self {
            Capability::Custom(method) => method,
            Capability::On => "on",
            Capability::AngularOn => "$on",
            Capability::Subscribe => "subscribe",
            Capability::AddEventListener => "addEventListener",
        }
    }
}

/// Native callback handed to an emitter. Receives the raw event.
pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Extra arguments placed before and after the handler when registering it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListenParams {
    pub before: Vec<Value>,
    pub after: Vec<Value>,
}

/// A foreign event emitter.
pub trait EventSource {
    fn as_any(&self) -> &dyn Any;

    /// Whether the emitter offers the given subscription style.
    fn supports(
        &self,
        capability: &Capability,
    ) -> bool;

    /// Registers `handler` for `event` through `method`.
    ///
    /// Emitters return [`PubSubError::SourceUnsupported`] for methods they do
    /// not have.
    fn listen(
        &self,
        method: &str,
        event: &str,
        params: &ListenParams,
        handler: EventHandler,
    ) -> Result<()>;
}

/// Adapter binding one subscription style to `PubSub::mirror`.
///
/// Arguments: the target `PubSub`, the emitter, the event names to listen on
/// and the options given to [`PubSub::source`].
pub type SourceAdapter =
    Arc<dyn Fn(&PubSub, &dyn EventSource, &[String], &SourceOptions) -> Result<()> + Send + Sync>;

/// One row of the detection table: if the emitter supports `capability`, use
/// the adapter registered as `adapter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub capability: Capability,
    pub adapter: String,
}

impl Detection {
    pub fn new(
        capability: Capability,
        adapter: impl Into<String>,
    ) -> Self {
        Self {
            capability,
            adapter: adapter.into(),
        }
    }
}

/// Built-in detection order. A custom `on` method, when given, is tried
/// first.
pub fn default_detection(on: Option<&str>) -> Vec<Detection> {
    let mut table = Vec::with_capacity(5);
    if let Some(on) = on {
        table.push(Detection::new(
            Capability::Custom(on.to_string()),
            adapters::GENERIC,
        ));
    }
    table.extend([
        Detection::new(Capability::On, adapters::JQUERY),
        Detection::new(Capability::AngularOn, adapters::ANGULAR),
        Detection::new(Capability::Subscribe, adapters::PUBSUB),
        Detection::new(Capability::AddEventListener, adapters::DOM),
    ]);
    table
}

/// Options for [`PubSub::source`].
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    /// Adapter to use, skipping detection.
    pub kind: Option<String>,
    /// Method name for the generic adapter.
    pub on: Option<String>,
    /// Base channel for mirrored messages; the configured default when
    /// unset.
    pub base: Option<String>,
    pub parsers: Vec<Parser>,
    /// Filter passed to PubSub-style emitters.
    pub filter: Option<Filter>,
    /// Detection table replacing [`default_detection`].
    pub detection: Option<Vec<Detection>>,
    /// jQuery delegated-event selector.
    pub selector: Option<Value>,
    /// jQuery event data.
    pub data: Option<Value>,
    /// DOM listener options object; takes precedence over `capture`.
    pub options: Option<Value>,
    pub capture: Option<bool>,
    pub wants_untrusted: Option<bool>,
    pub before_listener_params: Vec<Value>,
    pub after_listener_params: Vec<Value>,
}

impl SourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(
        mut self,
        kind: impl Into<String>,
    ) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn on(
        mut self,
        method: impl Into<String>,
    ) -> Self {
        self.on = Some(method.into());
        self
    }

    pub fn base(
        mut self,
        base: impl Into<String>,
    ) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn parser(
        mut self,
        parser: Parser,
    ) -> Self {
        self.parsers.push(parser);
        self
    }

    pub fn filter(
        mut self,
        filter: Filter,
    ) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn detection(
        mut self,
        detection: Vec<Detection>,
    ) -> Self {
        self.detection = Some(detection);
        self
    }

    pub fn selector(
        mut self,
        selector: impl Into<Value>,
    ) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn data(
        mut self,
        data: impl Into<Value>,
    ) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn listener_options(
        mut self,
        options: impl Into<Value>,
    ) -> Self {
        self.options = Some(options.into());
        self
    }

    pub fn capture(
        mut self,
        capture: bool,
    ) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn wants_untrusted(
        mut self,
        wants_untrusted: bool,
    ) -> Self {
        self.wants_untrusted = Some(wants_untrusted);
        self
    }

    pub fn before_listener_params(
        mut self,
        params: Vec<Value>,
    ) -> Self {
        self.before_listener_params = params;
        self
    }

    pub fn after_listener_params(
        mut self,
        params: Vec<Value>,
    ) -> Self {
        self.after_listener_params = params;
        self
    }
}

/// Process-wide adapters, seeded with the built-ins.
static SOURCE_ADAPTERS: Lazy<DashMap<String, SourceAdapter, RandomState>> = Lazy::new(|| {
    let table = DashMap::default();
    for (name, adapter) in adapters::builtins() {
        table.insert(name.to_string(), adapter);
    }
    table
});

/// Registers (or replaces) a process-wide adapter.
pub fn add_source_subscriber<F>(
    name: impl Into<String>,
    adapter: F,
) where
    F: Fn(&PubSub, &dyn EventSource, &[String], &SourceOptions) -> Result<()>
        + Send
        + Sync
        + 'static,
{
    SOURCE_ADAPTERS.insert(name.into(), Arc::new(adapter));
}

/// Removes a process-wide adapter, built-ins included.
pub fn delete_source_subscriber(name: &str) -> bool {
    SOURCE_ADAPTERS.remove(name).is_some()
}

impl PubSub {
    /// Registers (or replaces) an adapter on this instance only. Instance
    /// adapters shadow process-wide ones of the same name.
    pub fn add_source_subscriber<F>(
        &self,
        name: impl Into<String>,
        adapter: F,
    ) where
        F: Fn(&PubSub, &dyn EventSource, &[String], &SourceOptions) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.inner.adapters.insert(name.into(), Arc::new(adapter));
    }

    pub fn delete_source_subscriber(
        &self,
        name: &str,
    ) -> bool {
        self.inner.adapters.remove(name).is_some()
    }

    /// The adapter registered as `name`, instance table first.
    pub fn source_adapter(
        &self,
        name: &str,
    ) -> Option<SourceAdapter> {
        self.inner
            .adapters
            .get(name)
            .map(|entry| entry.value().clone())
            .or_else(|| SOURCE_ADAPTERS.get(name).map(|entry| entry.value().clone()))
    }

    /// Mirrors the events of a foreign emitter into this instance.
    ///
    /// `channels` are event names on the emitter (`"/"` when empty). The
    /// adapter is `options.kind` if set, otherwise the first detection row
    /// whose capability the emitter supports and whose adapter is
    /// registered.
    ///
    /// # Errors
    ///
    /// - [`PubSubError::UnknownSourceAdapter`] if `options.kind` names no
    ///   adapter;
    /// - [`PubSubError::NoSourceAdapter`] if detection finds nothing;
    /// - whatever the adapter or emitter reports.
    pub fn source<T: Into<Targets>>(
        &self,
        emitter: &dyn EventSource,
        channels: T,
        options: SourceOptions,
    ) -> Result<()> {
        let mut channels = channels.into().0;
        if channels.is_empty() {
            channels.push("/".to_string());
        }

        if let Some(kind) = &options.kind {
            let adapter = self
                .source_adapter(kind)
                .ok_or_else(|| PubSubError::UnknownSourceAdapter { name: kind.clone() })?;
            tracing::debug!(adapter = %kind, ?channels, "sourcing emitter");
            return adapter(self, emitter, &channels, &options);
        }

        let detection = options
            .detection
            .clone()
            .unwrap_or_else(|| default_detection(options.on.as_deref()));

        for row in &detection {
            if !emitter.supports(&row.capability) {
                continue;
            }
            if let Some(adapter) = self.source_adapter(&row.adapter) {
                tracing::debug!(adapter = %row.adapter, ?channels, "sourcing emitter");
                return adapter(self, emitter, &channels, &options);
            }
        }

        let err = PubSubError::NoSourceAdapter;
        log_error(&err, &format!("no source adapter matched the emitter for {channels:?}"));
        Err(err)
    }
}

/// A `PubSub` is itself an emitter with the `subscribe` capability. Events
/// are handed out as the JSON form of each [`Message`].
impl EventSource for PubSub {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn supports(
        &self,
        capability: &Capability,
    ) -> bool {
        capability.method() == Capability::Subscribe.method()
    }

    fn listen(
        &self,
        method: &str,
        event: &str,
        params: &ListenParams,
        handler: EventHandler,
    ) -> Result<()> {
        if method != Capability::Subscribe.method() {
            return Err(PubSubError::SourceUnsupported {
                method: method.to_string(),
            });
        }
        let filter = match params.before.first() {
            Some(value) => Filter::from_value(value.clone())?,
            None => Filter::empty(),
        };
        self.subscribe_filtered(event, filter, move |message: &Message| {
            match serde_json::to_value(message) {
                Ok(value) => handler(value),
                Err(err) => tracing::warn!(%err, "cannot encode message for a sourced handler"),
            }
        })?;
        Ok(())
    }
}
