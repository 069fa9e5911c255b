//! Built-in source adapters.

use std::sync::Arc;

use serde_json::Value;

use super::{
    source::{EventHandler, EventSource, ListenParams, SourceAdapter, SourceOptions},
    MirrorMessage,
};
use crate::{
    channel::Channels,
    error::{log_error, PubSubError, Result},
    filter::Filter,
    pubsub::{Message, PubSub},
};

pub const GENERIC: &str = "Generic";
pub const JQUERY: &str = "jQuery";
pub const ANGULAR: &str = "Angular";
pub const PUBSUB: &str = "PubSub";
pub const DOM: &str = "DOM";

pub(super) fn builtins() -> Vec<(&'static str, SourceAdapter)> {
    vec![
        (GENERIC, Arc::new(generic) as SourceAdapter),
        (JQUERY, Arc::new(jquery) as SourceAdapter),
        (ANGULAR, Arc::new(angular) as SourceAdapter),
        (PUBSUB, Arc::new(pubsub) as SourceAdapter),
        (DOM, Arc::new(dom) as SourceAdapter),
    ]
}

fn base_of(
    target: &PubSub,
    options: &SourceOptions,
) -> String {
    options
        .base
        .clone()
        .unwrap_or_else(|| target.config().default_base.clone())
}

/// Handler that decodes a native event and mirrors it into `target`.
fn mirror_handler(
    target: &PubSub,
    options: &SourceOptions,
) -> EventHandler {
    let target = target.clone();
    let parsers = options.parsers.clone();
    let base = base_of(&target, options);

    Arc::new(move |event: Value| {
        if let Err(err) = target.mirror(MirrorMessage::from_event(event), &parsers, &base) {
            log_error(&err, "failed to mirror sourced event");
        }
    })
}

fn listen_all(
    emitter: &dyn EventSource,
    method: &str,
    channels: &[String],
    params: &ListenParams,
    handler: EventHandler,
) -> Result<()> {
    for channel in channels {
        emitter.listen(method, channel, params, handler.clone())?;
    }
    Ok(())
}

/// User-named method: `before_listener_params`, handler,
/// `after_listener_params`.
fn generic(
    target: &PubSub,
    emitter: &dyn EventSource,
    channels: &[String],
    options: &SourceOptions,
) -> Result<()> {
    let method = options
        .on
        .as_deref()
        .ok_or_else(|| PubSubError::SourceUnsupported {
            method: "<unset>".to_string(),
        })?;
    let params = ListenParams {
        before: options.before_listener_params.clone(),
        after: options.after_listener_params.clone(),
    };
    listen_all(
        emitter,
        method,
        channels,
        &params,
        mirror_handler(target, options),
    )
}

/// `on(event, [data], [selector], handler)`.
fn jquery(
    target: &PubSub,
    emitter: &dyn EventSource,
    channels: &[String],
    options: &SourceOptions,
) -> Result<()> {
    let before = options
        .data
        .iter()
        .chain(options.selector.iter())
        .cloned()
        .collect();
    let params = ListenParams {
        before,
        after: Vec::new(),
    };
    listen_all(
        emitter,
        "on",
        channels,
        &params,
        mirror_handler(target, options),
    )
}

/// `$on(event, handler)`.
fn angular(
    target: &PubSub,
    emitter: &dyn EventSource,
    channels: &[String],
    options: &SourceOptions,
) -> Result<()> {
    listen_all(
        emitter,
        "$on",
        channels,
        &ListenParams::default(),
        mirror_handler(target, options),
    )
}

/// `addEventListener(event, handler, options | useCapture [, wantsUntrusted])`.
fn dom(
    target: &PubSub,
    emitter: &dyn EventSource,
    channels: &[String],
    options: &SourceOptions,
) -> Result<()> {
    let mut after = Vec::new();
    if let Some(listener_options) = &options.options {
        after.push(listener_options.clone());
    } else if let Some(capture) = options.capture {
        after.push(Value::Bool(capture));
        if let Some(untrusted) = options.wants_untrusted {
            after.push(Value::Bool(untrusted));
        }
    }
    let params = ListenParams {
        before: Vec::new(),
        after,
    };
    listen_all(
        emitter,
        "addEventListener",
        channels,
        &params,
        mirror_handler(target, options),
    )
}

/// `subscribe(channel, [filter], handler)`.
///
/// Another `PubSub` is subscribed to directly, with each `Message` mirrored
/// as-is; any other emitter goes through `listen`.
fn pubsub(
    target: &PubSub,
    emitter: &dyn EventSource,
    channels: &[String],
    options: &SourceOptions,
) -> Result<()> {
    let Some(source) = emitter.as_any().downcast_ref::<PubSub>() else {
        let params = ListenParams {
            before: options.filter.iter().map(Filter::as_value).collect(),
            after: Vec::new(),
        };
        return listen_all(
            emitter,
            "subscribe",
            channels,
            &params,
            mirror_handler(target, options),
        );
    };

    let into = target.clone();
    let parsers = options.parsers.clone();
    let base = base_of(target, options);
    let filter = options.filter.clone().unwrap_or_default();

    source.subscribe_filtered(
        Channels::from(channels.to_vec()),
        filter,
        move |message: &Message| {
            if let Err(err) = into.mirror(MirrorMessage::from(message), &parsers, &base) {
                log_error(&err, "failed to mirror message between instances");
            }
        },
    )?;
    Ok(())
}
