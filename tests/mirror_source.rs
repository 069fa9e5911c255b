use std::{
    any::Any,
    collections::HashSet,
    sync::{Arc, Mutex},
};

use serde_json::{json, Value};
use serial_test::serial;
use topica::{
    add_source_subscriber, delete_source_subscriber, Capability, Detection, EventHandler,
    EventSource, Filter, ListenParams, Message, MirrorMessage, Parser, PubSub, PubSubError,
    SourceOptions,
};

/// Один вызов `listen`, записанный эмиттером.
#[derive(Debug, Clone, PartialEq)]
struct ListenCall {
    method: String,
    event: String,
    params: ListenParams,
}

/// Тестовый эмиттер: поддерживает заданный набор методов, запоминает
/// регистрации и позволяет вручную сгенерировать событие.
#[derive(Default)]
struct MockEmitter {
    methods: HashSet<String>,
    calls: Mutex<Vec<ListenCall>>,
    handlers: Mutex<Vec<(String, EventHandler)>>,
}

impl MockEmitter {
    fn with_methods(methods: &[&str]) -> Self {
        Self {
            methods: methods.iter().map(|m| m.to_string()).collect(),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<ListenCall> {
        self.calls.lock().unwrap().clone()
    }

    fn emit(
        &self,
        event: &str,
        payload: Value,
    ) {
        let handlers: Vec<EventHandler> = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(payload.clone());
        }
    }
}

impl EventSource for MockEmitter {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn supports(
        &self,
        capability: &Capability,
    ) -> bool {
        self.methods.contains(capability.method())
    }

    fn listen(
        &self,
        method: &str,
        event: &str,
        params: &ListenParams,
        handler: EventHandler,
    ) -> topica::Result<()> {
        if !self.methods.contains(method) {
            return Err(PubSubError::SourceUnsupported {
                method: method.to_string(),
            });
        }
        self.calls.lock().unwrap().push(ListenCall {
            method: method.to_string(),
            event: event.to_string(),
            params: params.clone(),
        });
        self.handlers
            .lock()
            .unwrap()
            .push((event.to_string(), handler));
        Ok(())
    }
}

fn collect(
    pubsub: &PubSub,
    channel: &str,
) -> Arc<Mutex<Vec<Message>>> {
    let seen: Arc<Mutex<Vec<Message>>> = Default::default();
    let sink = seen.clone();
    pubsub
        .subscribe(channel, move |m: &Message| sink.lock().unwrap().push(m.clone()))
        .unwrap();
    seen
}

/// Тест проверяет, что при нескольких поддерживаемых стилях выбирается
/// первый по таблице обнаружения (jQuery раньше DOM).
#[test]
#[serial]
fn test_detection_order_prefers_jquery() -> Result<(), Box<dyn std::error::Error>> {
    let pubsub = PubSub::new();
    let emitter = MockEmitter::with_methods(&["addEventListener", "on"]);

    pubsub.source(
        &emitter,
        vec!["click", "keyup"],
        SourceOptions::new().data(json!({"d": 1})).selector(".btn"),
    )?;

    let calls = emitter.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.method == "on"));
    assert_eq!(calls[0].event, "click");
    assert_eq!(calls[1].event, "keyup");
    assert_eq!(calls[0].params.before, vec![json!({"d": 1}), json!(".btn")]);
    Ok(())
}

/// Тест проверяет, что пользовательский метод `on` проверяется раньше
/// встроенных стилей и получает параметры до и после обработчика.
#[test]
fn test_generic_adapter_with_custom_method() -> Result<(), Box<dyn std::error::Error>> {
    let pubsub = PubSub::new();
    let emitter = MockEmitter::with_methods(&["listenTo", "on"]);

    pubsub.source(
        &emitter,
        "tick",
        SourceOptions::new()
            .on("listenTo")
            .before_listener_params(vec![json!("before")])
            .after_listener_params(vec![json!(true)]),
    )?;

    assert_eq!(
        emitter.calls(),
        vec![ListenCall {
            method: "listenTo".into(),
            event: "tick".into(),
            params: ListenParams {
                before: vec![json!("before")],
                after: vec![json!(true)],
            },
        }]
    );
    Ok(())
}

/// Тест проверяет DOM-адаптер: объект опций важнее флага capture.
#[test]
fn test_dom_adapter_listener_options() -> Result<(), Box<dyn std::error::Error>> {
    let pubsub = PubSub::new();

    let emitter = MockEmitter::with_methods(&["addEventListener"]);
    pubsub.source(
        &emitter,
        "load",
        SourceOptions::new().capture(true).wants_untrusted(false),
    )?;
    assert_eq!(emitter.calls()[0].params.after, vec![json!(true), json!(false)]);

    let emitter = MockEmitter::with_methods(&["addEventListener"]);
    pubsub.source(
        &emitter,
        "load",
        SourceOptions::new()
            .listener_options(json!({"passive": true}))
            .capture(true),
    )?;
    assert_eq!(emitter.calls()[0].params.after, vec![json!({"passive": true})]);
    Ok(())
}

/// Тест проверяет, что события эмиттера зеркалируются в PubSub
/// относительно базового канала.
#[test]
fn test_sourced_events_are_mirrored_under_base() -> Result<(), Box<dyn std::error::Error>> {
    let pubsub = PubSub::new();
    let seen = collect(&pubsub, "/ui/button");
    let root = collect(&pubsub, "/ui");

    let emitter = MockEmitter::with_methods(&["$on"]);
    pubsub.source(&emitter, "click", SourceOptions::new().base("/ui"))?;
    assert_eq!(emitter.calls()[0].method, "$on");

    emitter.emit(
        "click",
        json!({"target": "/button", "data": {"x": 3}, "timestamp": 11}),
    );
    emitter.emit("click", json!("raw event"));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].data(), &json!({"x": 3}));
    assert_eq!(seen[0].source_timestamp(), Some(11));

    // Событие без target уходит в сам базовый канал с пустыми данными.
    let root = root.lock().unwrap();
    assert_eq!(root.len(), 2);
    assert_eq!(root[1].target(), &["/ui".to_string()]);
    assert_eq!(root[1].data(), &json!({}));
    Ok(())
}

/// Тест проверяет, что парсеры получают исходное событие и могут
/// задать маршрут сообщения.
#[test]
#[serial]
fn test_parsers_route_native_events() -> Result<(), Box<dyn std::error::Error>> {
    let pubsub = PubSub::new();
    let seen = collect(&pubsub, "/keys/enter");

    let by_key = Parser::new(|m: &MirrorMessage, _: &str| {
        let key = m.event.as_ref()?.get("key")?.as_str()?;
        Some(m.clone().with_target(format!("/keys/{key}")).broadcasting())
    });
    let emitter = MockEmitter::with_methods(&["on"]);
    pubsub.source(
        &emitter,
        "keydown",
        SourceOptions::new().base("").parser(by_key),
    )?;

    emitter.emit("keydown", json!({"key": "enter"}));
    emitter.emit("keydown", json!({"key": "escape"}));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].is_broadcast());
    Ok(())
}

/// Тест проверяет явный выбор адаптера и ошибку для неизвестного имени.
#[test]
fn test_explicit_kind() -> Result<(), Box<dyn std::error::Error>> {
    let pubsub = PubSub::new();
    let emitter = MockEmitter::with_methods(&["on", "addEventListener"]);

    pubsub.source(&emitter, "x", SourceOptions::new().kind("DOM"))?;
    assert_eq!(emitter.calls()[0].method, "addEventListener");

    let err = pubsub
        .source(&emitter, "x", SourceOptions::new().kind("Backbone"))
        .unwrap_err();
    assert_eq!(
        err,
        PubSubError::UnknownSourceAdapter {
            name: "Backbone".into()
        }
    );
    Ok(())
}

/// Тест проверяет ошибку, когда ни один стиль подписки не подходит.
#[test]
fn test_no_adapter_matches() {
    let pubsub = PubSub::new();
    let emitter = MockEmitter::with_methods(&["emit"]);
    assert_eq!(
        pubsub.source(&emitter, "x", SourceOptions::new()),
        Err(PubSubError::NoSourceAdapter)
    );
}

/// Тест проверяет, что пустой список каналов означает корневой канал.
#[test]
fn test_empty_channels_default_to_root() -> Result<(), Box<dyn std::error::Error>> {
    let pubsub = PubSub::new();
    let emitter = MockEmitter::with_methods(&["$on"]);
    pubsub.source(&emitter, Vec::<String>::new(), SourceOptions::new())?;
    assert_eq!(emitter.calls()[0].event, "/");
    Ok(())
}

/// Тест проверяет пользовательскую таблицу обнаружения и адаптер,
/// зарегистрированный на экземпляре.
#[test]
fn test_instance_adapter_and_custom_detection() -> Result<(), Box<dyn std::error::Error>> {
    let pubsub = PubSub::new();
    let hits: Arc<Mutex<Vec<Vec<String>>>> = Default::default();
    let sink = hits.clone();
    pubsub.add_source_subscriber(
        "Recorder",
        move |_: &PubSub, _: &dyn EventSource, channels: &[String], _: &SourceOptions| {
            sink.lock().unwrap().push(channels.to_vec());
            Ok(())
        },
    );

    let emitter = MockEmitter::with_methods(&["on", "emit"]);
    let detection = vec![
        Detection::new(Capability::Custom("missing".into()), "jQuery"),
        Detection::new(Capability::Custom("emit".into()), "Recorder"),
        Detection::new(Capability::On, "jQuery"),
    ];
    pubsub.source(&emitter, ["a", "b"], SourceOptions::new().detection(detection))?;

    assert_eq!(*hits.lock().unwrap(), vec![vec!["a".to_string(), "b".to_string()]]);
    assert!(emitter.calls().is_empty());

    assert!(pubsub.delete_source_subscriber("Recorder"));
    assert!(!pubsub.delete_source_subscriber("Recorder"));
    assert!(pubsub.source_adapter("Recorder").is_none());
    Ok(())
}

/// Тест проверяет, что глобальный адаптер виден всем экземплярам, а
/// адаптер экземпляра перекрывает его.
#[test]
#[serial]
fn test_global_adapter_shadowed_by_instance() -> Result<(), Box<dyn std::error::Error>> {
    let calls: Arc<Mutex<Vec<&'static str>>> = Default::default();

    let sink = calls.clone();
    add_source_subscriber(
        "Shared",
        move |_: &PubSub, _: &dyn EventSource, _: &[String], _: &SourceOptions| {
            sink.lock().unwrap().push("global");
            Ok(())
        },
    );

    let plain = PubSub::new();
    let shadowing = PubSub::new();
    let sink = calls.clone();
    shadowing.add_source_subscriber(
        "Shared",
        move |_: &PubSub, _: &dyn EventSource, _: &[String], _: &SourceOptions| {
            sink.lock().unwrap().push("instance");
            Ok(())
        },
    );

    let emitter = MockEmitter::default();
    plain.source(&emitter, "e", SourceOptions::new().kind("Shared"))?;
    shadowing.source(&emitter, "e", SourceOptions::new().kind("Shared"))?;
    assert_eq!(*calls.lock().unwrap(), vec!["global", "instance"]);

    assert!(delete_source_subscriber("Shared"));
    assert!(plain.source_adapter("Shared").is_none());
    assert!(shadowing.source_adapter("Shared").is_some());
    Ok(())
}

/// Тест проверяет удаление встроенного адаптера: обнаружение переходит
/// к следующей строке таблицы.
#[test]
#[serial]
fn test_deleting_builtin_adapter_falls_through() -> Result<(), Box<dyn std::error::Error>> {
    let pubsub = PubSub::new();
    let jquery = pubsub
        .source_adapter("jQuery")
        .ok_or("jQuery adapter must be built in")?;

    assert!(delete_source_subscriber("jQuery"));
    let emitter = MockEmitter::with_methods(&["on", "addEventListener"]);
    let outcome = pubsub.source(&emitter, "x", SourceOptions::new());

    // Восстанавливаем таблицу до проверок, чтобы не влиять на другие тесты.
    add_source_subscriber(
        "jQuery",
        move |t: &PubSub, e: &dyn EventSource, c: &[String], o: &SourceOptions| jquery(t, e, c, o),
    );

    outcome?;
    assert_eq!(emitter.calls()[0].method, "addEventListener");
    Ok(())
}

/// Тест проверяет зеркалирование одного PubSub в другой: сообщения
/// переносятся с сохранением направления и метки времени источника.
/// Фильтр источника применяется ещё на стороне upstream.
#[test]
fn test_pubsub_to_pubsub_sourcing() -> Result<(), Box<dyn std::error::Error>> {
    let upstream = PubSub::new();
    let downstream = PubSub::new();
    let seen = collect(&downstream, "/mirror/orders/new");

    downstream.source(
        &upstream,
        "/orders",
        SourceOptions::new()
            .base("/mirror")
            .filter(Filter::from_value(json!({"total": {"$gt": 10}}))?),
    )?;
    assert!(upstream.has_subscribers("/orders"));

    upstream.publish("/orders/new", json!({"total": 5}))?;
    upstream.publish("/orders/new", json!({"total": 50}))?;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].is_publish());
    assert_eq!(seen[0].target(), &["/mirror/orders/new".to_string()]);
    assert_eq!(seen[0].data(), &json!({"total": 50}));
    assert!(seen[0].source_timestamp().is_some());
    assert_eq!(downstream.stats().mirror_count, 1);
    Ok(())
}

/// Тест проверяет PubSub как обычный эмиттер: `listen` через `subscribe`
/// отдаёт JSON-форму сообщения и отвергает другие методы.
#[test]
fn test_pubsub_as_event_source() -> Result<(), Box<dyn std::error::Error>> {
    let pubsub = PubSub::new();
    let events: Arc<Mutex<Vec<Value>>> = Default::default();
    let sink = events.clone();
    let handler: EventHandler = Arc::new(move |event: Value| sink.lock().unwrap().push(event));

    assert!(pubsub.supports(&Capability::Subscribe));
    assert!(!pubsub.supports(&Capability::On));

    pubsub.listen(
        "subscribe",
        "/a",
        &ListenParams {
            before: vec![json!({"ok": true})],
            after: Vec::new(),
        },
        handler.clone(),
    )?;
    pubsub.publish("/a", json!({"ok": false}))?;
    pubsub.publish("/a", json!({"ok": true}))?;

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["target"], json!(["/a"]));
    assert_eq!(events[0]["data"], json!({"ok": true}));

    assert!(matches!(
        pubsub.listen("on", "/a", &ListenParams::default(), handler),
        Err(PubSubError::SourceUnsupported { .. })
    ));
    Ok(())
}
