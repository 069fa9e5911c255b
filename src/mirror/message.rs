use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    channel::Targets,
    error::Result,
    pubsub::{Message, Mode, PubSub},
};

/// Внешнее сообщение на пути в `PubSub`.
///
/// Для маршрутизации важны только `target` и `data`; `publish`/`broadcast`
/// выбирают направление (publish, если не задан ни один флаг, broadcast,
/// если заданы оба).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MirrorMessage {
    pub data: Option<Value>,
    pub target: Vec<String>,
    pub publish: bool,
    pub broadcast: bool,
    pub timestamp: Option<i64>,
    pub source_timestamp: Option<i64>,
    /// Исходное событие, из которого декодировано сообщение (для парсеров).
    #[serde(skip)]
    pub event: Option<Value>,
}

impl MirrorMessage {
    pub fn new(data: impl Into<Value>) -> Self {
        Self {
            data: Some(data.into()),
            ..Default::default()
        }
    }

    pub fn with_target(
        mut self,
        target: impl Into<Targets>,
    ) -> Self {
        self.target = target.into().0;
        self
    }

    pub fn publishing(mut self) -> Self {
        self.publish = true;
        self
    }

    pub fn broadcasting(mut self) -> Self {
        self.broadcast = true;
        self
    }

    /// Нестрого декодирует нативное JSON-событие.
    ///
    /// Из объекта берутся ключи `data`, `target` (строка или массив строк),
    /// `publish`, `broadcast`, `timestamp` и `sourceTimestamp`; остальное
    /// игнорируется. Исходное событие в любом случае сохраняется в
    /// [`MirrorMessage::event`].
    pub fn from_event(event: Value) -> Self {
        let mut message = match &event {
            Value::Object(map) => Self::from_map(map),
            _ => Self::default(),
        };
        message.event = Some(event);
        message
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        let target = match map.get("target") {
            Some(Value::String(channel)) => vec![channel.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        let flag = |key: &str| map.get(key).and_then(Value::as_bool).unwrap_or(false);

        Self {
            data: map.get("data").cloned(),
            target,
            publish: flag("publish"),
            broadcast: flag("broadcast"),
            timestamp: map.get("timestamp").and_then(Value::as_i64),
            source_timestamp: map.get("sourceTimestamp").and_then(Value::as_i64),
            event: None,
        }
    }
}

impl From<&Message> for MirrorMessage {
    fn from(message: &Message) -> Self {
        Self {
            data: Some(message.data().clone()),
            target: message.target().to_vec(),
            publish: message.is_publish(),
            broadcast: message.is_broadcast(),
            timestamp: Some(message.timestamp()),
            source_timestamp: message.source_timestamp(),
            event: None,
        }
    }
}

type ParseFn = dyn Fn(&MirrorMessage, &str) -> Option<MirrorMessage> + Send + Sync;

/// Переписывает [`MirrorMessage`] перед маршрутизацией. Получает сообщение и
/// базу зеркала; `None` оставляет сообщение без изменений.
#[derive(Clone)]
pub struct Parser(Arc<ParseFn>);

impl Parser {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&MirrorMessage, &str) -> Option<MirrorMessage> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn parse(
        &self,
        message: &MirrorMessage,
        base: &str,
    ) -> Option<MirrorMessage> {
        (self.0)(message, base)
    }
}

impl fmt::Debug for Parser {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "Parser({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

/// Прогоняет парсеры и подставляет значения по умолчанию: пустая цель
/// становится базой, к остальным целям база добавляется префиксом.
fn prepare(
    mut message: MirrorMessage,
    parsers: &[Parser],
    base: &str,
) -> MirrorMessage {
    for parser in parsers {
        if let Some(parsed) = parser.parse(&message, base) {
            message = parsed;
        }
    }

    message.target = if message.target.is_empty() {
        if base.is_empty() {
            Vec::new()
        } else {
            vec![base.to_string()]
        }
    } else {
        message
            .target
            .iter()
            .map(|channel| format!("{base}{channel}"))
            .collect()
    };
    message
}

impl PubSub {
    /// Маршрутизирует внешнее сообщение через этот экземпляр.
    ///
    /// Парсеры применяются по порядку, затем цель переносится под `base`
    /// (конкатенация и нормализация). Отсутствующие данные становятся `{}`;
    /// без флагов сообщение публикуется. `source_timestamp` конверта берётся
    /// из `source_timestamp` сообщения, а при его отсутствии из `timestamp`.
    ///
    /// ```
    /// use serde_json::json;
    /// use topica::{MirrorMessage, PubSub};
    ///
    /// let pubsub = PubSub::new();
    /// pubsub.subscribe("/", |_: &topica::Message| {}).unwrap();
    /// assert!(pubsub.mirror_default(MirrorMessage::new(json!("x"))).unwrap());
    /// ```
    pub fn mirror(
        &self,
        message: MirrorMessage,
        parsers: &[Parser],
        base: &str,
    ) -> Result<bool> {
        let message = prepare(message, parsers, base);
        let targets = Targets(message.target).resolve()?;

        let mode = if message.broadcast {
            Mode::Broadcast
        } else {
            Mode::Publish
        };
        let data = match message.data {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(data) => data,
        };

        self.record_mirror();
        Ok(self.dispatch(
            targets,
            data,
            mode,
            message.source_timestamp.or(message.timestamp),
        ))
    }

    /// [`PubSub::mirror`] без парсеров, под базу из конфигурации.
    pub fn mirror_default(
        &self,
        message: MirrorMessage,
    ) -> Result<bool> {
        let base = self.config().default_base.clone();
        self.mirror(message, &[], &base)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::error::PubSubError;

    #[test]
    fn from_event_picks_known_keys() {
        let msg = MirrorMessage::from_event(json!({
            "data": {"id": 7},
            "target": "/orders",
            "broadcast": true,
            "timestamp": 1000,
            "extra": "ignored"
        }));
        assert_eq!(msg.data, Some(json!({"id": 7})));
        assert_eq!(msg.target, vec!["/orders".to_string()]);
        assert!(msg.broadcast && !msg.publish);
        assert_eq!(msg.timestamp, Some(1000));
        assert_eq!(msg.source_timestamp, None);
        assert!(msg.event.is_some());

        let odd = MirrorMessage::from_event(json!("click"));
        assert_eq!(odd.data, None);
        assert!(odd.target.is_empty());
        assert_eq!(odd.event, Some(json!("click")));
    }

    #[test]
    fn prepare_rebases_targets() {
        let msg = prepare(
            MirrorMessage::new(1).with_target(["/a", "b"]),
            &[],
            "/base",
        );
        assert_eq!(msg.target, vec!["/base/a", "/baseb"]);

        let msg = prepare(MirrorMessage::new(1), &[], "/base");
        assert_eq!(msg.target, vec!["/base"]);

        let msg = prepare(MirrorMessage::new(1), &[], "");
        assert!(msg.target.is_empty());
    }

    /// Тест проверяет порядок применения парсеров и то, что `None` оставляет
    /// сообщение без изменений.
    #[test]
    fn parsers_run_in_order() {
        let add_target = Parser::new(|m: &MirrorMessage, _: &str| {
            Some(m.clone().with_target("/from-parser"))
        });
        let keep = Parser::new(|_: &MirrorMessage, _: &str| None);
        let see_base = Parser::new(|m: &MirrorMessage, base: &str| {
            let mut m = m.clone();
            m.data = Some(json!(base));
            Some(m)
        });

        let msg = prepare(MirrorMessage::new(0), &[add_target, keep, see_base], "/x");
        assert_eq!(msg.target, vec!["/x/from-parser"]);
        assert_eq!(msg.data, Some(json!("/x")));
    }

    #[test]
    fn mirror_defaults_to_publish_on_base() {
        let pubsub = PubSub::new();
        let seen: Arc<Mutex<Vec<Message>>> = Default::default();
        let sink = seen.clone();
        pubsub
            .subscribe("/", move |m: &Message| sink.lock().unwrap().push(m.clone()))
            .unwrap();
        pubsub.subscribe("/a", |_: &Message| {}).unwrap();

        assert!(pubsub
            .mirror_default(MirrorMessage {
                data: None,
                timestamp: Some(5),
                ..Default::default()
            })
            .unwrap());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].is_publish());
        assert_eq!(seen[0].target(), &["/".to_string()]);
        assert_eq!(seen[0].data(), &json!({}));
        assert_eq!(seen[0].source_timestamp(), Some(5));
        assert_eq!(pubsub.stats().mirror_count, 1);
    }

    #[test]
    fn mirror_broadcast_wins_over_publish() {
        let pubsub = PubSub::new();
        let seen: Arc<Mutex<Vec<String>>> = Default::default();
        let sink = seen.clone();
        pubsub
            .subscribe("/a/b", move |m: &Message| {
                sink.lock().unwrap().push(m.current_target().to_string())
            })
            .unwrap();

        let msg = MirrorMessage::new(json!(1))
            .with_target("/a")
            .publishing()
            .broadcasting();
        assert!(pubsub.mirror(msg, &[], "").unwrap());
        assert_eq!(*seen.lock().unwrap(), vec!["/a/b".to_string()]);
    }

    #[test]
    fn mirror_rejects_relative_targets_without_base() {
        let pubsub = PubSub::new();
        let msg = MirrorMessage::new(1).with_target("relative");
        assert!(matches!(
            pubsub.mirror(msg, &[], ""),
            Err(PubSubError::ChannelFormat { .. })
        ));
    }

    #[test]
    fn message_converts_for_pubsub_to_pubsub_mirroring() {
        let pubsub = PubSub::new();
        let seen: Arc<Mutex<Vec<Message>>> = Default::default();
        let sink = seen.clone();
        pubsub
            .subscribe("/a", move |m: &Message| sink.lock().unwrap().push(m.clone()))
            .unwrap();
        pubsub.broadcast("/a", json!({"k": 1})).unwrap();

        let original = seen.lock().unwrap()[0].clone();
        let mirrored = MirrorMessage::from(&original);
        assert_eq!(mirrored.target, vec!["/a".to_string()]);
        assert!(mirrored.broadcast);
        assert_eq!(mirrored.timestamp, Some(original.timestamp()));
        assert_eq!(mirrored.data, Some(json!({"k": 1})));
    }
}
