use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use ahash::AHashSet;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;

use super::{
    registry::{Candidate, Registry},
    subscription::{Selector, Selectors, Subscription, Unsubscribe},
    DeliveryOptions, Listener, Message,
};
use crate::{
    channel::{ChannelSpec, ChannelToken, Channels, Targets, TokenKey},
    config::{ListenerPanicPolicy, PubSubConfig},
    error::{log_error, Result, StatusCode},
    filter::IntoFilter,
    mirror::SourceAdapter,
};

/// Направление обхода иерархии каналов.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Вверх: канал и все его предки.
    Publish,
    /// Вниз: канал и все его потомки.
    Broadcast,
}

/// Счётчики диспетчера.
#[derive(Debug, Default)]
struct Stats {
    publish_count: AtomicUsize,
    broadcast_count: AtomicUsize,
    mirror_count: AtomicUsize,
    delivery_count: AtomicUsize,
    /// Вызовы `publish`/`broadcast`, не доставленные ни одному слушателю.
    undelivered_count: AtomicUsize,
    listener_panics: AtomicUsize,
}

/// Снимок счётчиков, см. [`PubSub::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PubSubStats {
    pub publish_count: usize,
    pub broadcast_count: usize,
    pub mirror_count: usize,
    pub delivery_count: usize,
    pub undelivered_count: usize,
    pub listener_panics: usize,
}

pub(crate) struct Inner {
    registry: Arc<RwLock<Registry>>,
    config: PubSubConfig,
    pub(crate) adapters: DashMap<String, SourceAdapter, ahash::RandomState>,
    stats: Stats,
}

/// Иерархический pub/sub диспетчер.
///
/// `PubSub` является handle: клоны делят один реестр, поэтому слушатель
/// может захватить клон и подписываться, отписываться или публиковать прямо
/// во время доставки.
///
/// - `publish` доставляет в целевые каналы и всем их предкам, начиная с
///   самого глубокого.
/// - `broadcast` доставляет в целевые каналы и всем их потомкам.
/// - Glob-подписки (`/a/*`, `/a/**`) участвуют в обоих режимах; regex-подписки
///   получают только publish, цель которого они матчат.
///
/// Доставка синхронная. Набор слушателей фиксируется до вызова первого из
/// них, и блокировка реестра во время вызова слушателей не держится.
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use serde_json::json;
/// use topica::PubSub;
///
/// let pubsub = PubSub::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
/// pubsub
///     .subscribe("/orders", move |msg: &topica::Message| {
///         sink.lock().unwrap().push(msg.target()[0].clone());
///     })
///     .unwrap();
///
/// assert!(pubsub.publish("/orders/42", json!({"total": 10})).unwrap());
/// assert_eq!(*seen.lock().unwrap(), vec!["/orders/42".to_string()]);
/// ```
#[derive(Clone)]
pub struct PubSub {
    pub(crate) inner: Arc<Inner>,
}

impl Default for PubSub {
    fn default() -> Self {
        Self::new()
    }
}

impl PubSub {
    /// Создаёт диспетчер с настройками по умолчанию.
    pub fn new() -> Self {
        Self::from_validated(PubSubConfig::default())
    }

    /// Создаёт диспетчер с заданной конфигурацией.
    ///
    /// Возвращает `ChannelFormat`, если `default_base` не является каналом.
    pub fn with_config(config: PubSubConfig) -> Result<Self> {
        Ok(Self::from_validated(config.validate()?))
    }

    fn from_validated(config: PubSubConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Arc::new(RwLock::new(Registry::new())),
                config,
                adapters: DashMap::default(),
                stats: Stats::default(),
            }),
        }
    }

    pub fn config(&self) -> &PubSubConfig {
        &self.inner.config
    }

    /// Подписывает `listener` на один или несколько каналов.
    ///
    /// Каналы могут быть точными путями, glob-шаблонами или регулярными
    /// выражениями вперемешку. Одна и та же подписка регистрируется под
    /// каждым каналом; сообщение, дошедшее до неё через несколько каналов,
    /// доставляется один раз.
    pub fn subscribe<C, L>(
        &self,
        channels: C,
        listener: L,
    ) -> Result<Unsubscribe>
    where
        C: Into<Channels>,
        L: Into<Listener>,
    {
        self.subscribe_filtered(channels, None::<Value>, listener)
    }

    /// Как [`PubSub::subscribe`], но доставляет только данные, прошедшие
    /// `filter`.
    ///
    /// # Ошибки
    ///
    /// - `ChannelFormat` для канала, который не начинается с `/`;
    /// - `FilterType` / `InvalidFilter` для некорректного фильтра.
    ///
    /// При ошибке ничего не регистрируется.
    pub fn subscribe_filtered<C, F, L>(
        &self,
        channels: C,
        filter: F,
        listener: L,
    ) -> Result<Unsubscribe>
    where
        C: Into<Channels>,
        F: IntoFilter,
        L: Into<Listener>,
    {
        let channels = channels.into();
        let mut tokens: Vec<ChannelToken> = Vec::with_capacity(channels.len());
        let parsed: Result<()> = channels.iter().try_for_each(|spec| {
            let token = ChannelToken::parse(spec)?;
            if !tokens.iter().any(|t| t.key() == token.key()) {
                tokens.push(token);
            }
            Ok(())
        });
        let filter = match parsed.and_then(|()| filter.into_filter()) {
            Ok(filter) => filter,
            Err(err) => {
                tokens.into_iter().for_each(ChannelToken::release);
                return Err(err);
            }
        };
        let listener = listener.into();

        let keys: Vec<TokenKey> = tokens.iter().map(ChannelToken::key).collect();
        let names: Vec<String> = tokens.iter().map(ToString::to_string).collect();

        let id = {
            let mut registry = self.inner.registry.write();
            let id = registry.next_id();
            let subscription = Arc::new(Subscription {
                id,
                listener,
                filter,
            });
            for token in tokens {
                registry.insert(token, subscription.clone());
            }
            id
        };

        tracing::debug!(%id, channels = ?names, "subscribed");
        Ok(Unsubscribe::new(
            Arc::downgrade(&self.inner.registry),
            keys,
            id,
        ))
    }

    /// Удаляет подписки по каналу или по слушателю.
    ///
    /// Селектор-канал снимает все подписки, зарегистрированные ровно под
    /// этим каналом (сравнение после нормализации, regex по исходнику).
    /// Селектор-слушатель снимает все подписки этого слушателя.
    /// Некорректные каналы ничего не выбирают. Возвращает `true`, если
    /// что-то было удалено.
    pub fn unsubscribe<S: Into<Selectors>>(
        &self,
        selectors: S,
    ) -> bool {
        enum Target {
            Key(TokenKey),
            Listener(Listener),
        }

        let targets: Vec<Target> = selectors
            .into()
            .0
            .into_iter()
            .filter_map(|selector| match selector {
                Selector::Channel(spec) => match TokenKey::from_spec(&spec) {
                    Ok(key) => Some(Target::Key(key)),
                    Err(err) => {
                        log_error(&err, "ignoring malformed channel in unsubscribe");
                        None
                    }
                },
                Selector::Listener(listener) => Some(Target::Listener(listener)),
            })
            .collect();

        let mut removed = false;
        {
            let mut registry = self.inner.registry.write();
            for target in &targets {
                removed |= match target {
                    Target::Key(key) => registry.remove_key(key),
                    Target::Listener(listener) => registry.remove_listener(listener),
                };
            }
        }

        if removed {
            tracing::debug!(selectors = targets.len(), "unsubscribed");
        }
        removed
    }

    /// Публикует `data` в целевые каналы и всем их предкам.
    ///
    /// Цели должны быть обычными каналами; glob-шаблон даёт `ChannelType`.
    /// Возвращает `true`, если был вызван хотя бы один слушатель.
    pub fn publish<T, D>(
        &self,
        channels: T,
        data: D,
    ) -> Result<bool>
    where
        T: Into<Targets>,
        D: Into<Value>,
    {
        let targets = channels.into().resolve()?;
        self.inner.stats.publish_count.fetch_add(1, Ordering::Relaxed);
        Ok(self.dispatch(targets, data.into(), Mode::Publish, None))
    }

    /// Рассылает `data` в целевые каналы и всем их потомкам.
    ///
    /// Regex-подписки broadcast не получают.
    pub fn broadcast<T, D>(
        &self,
        channels: T,
        data: D,
    ) -> Result<bool>
    where
        T: Into<Targets>,
        D: Into<Value>,
    {
        let targets = channels.into().resolve()?;
        self.inner
            .stats
            .broadcast_count
            .fetch_add(1, Ordering::Relaxed);
        Ok(self.dispatch(targets, data.into(), Mode::Broadcast, None))
    }

    /// Маршрутизирует уже проверенное сообщение.
    pub(crate) fn dispatch(
        &self,
        targets: Vec<String>,
        data: Value,
        mode: Mode,
        source_timestamp: Option<i64>,
    ) -> bool {
        // Снимок под read-lock; слушатели вызываются уже без блокировки.
        let candidates = {
            let registry = self.inner.registry.read();
            match mode {
                Mode::Publish => registry.publish_candidates(&targets),
                Mode::Broadcast => registry.broadcast_candidates(&targets),
            }
        };

        let mut seen = AHashSet::new();
        let deliveries: Vec<Candidate> = candidates
            .into_iter()
            .filter(|c| c.subscription.filter.passes(&data))
            .filter(|c| seen.insert(c.subscription.listener.id()))
            .collect();

        let stats = &self.inner.stats;
        if deliveries.is_empty() {
            stats.undelivered_count.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        stats
            .delivery_count
            .fetch_add(deliveries.len(), Ordering::Relaxed);

        let data = Arc::new(data);
        let target: Arc<[String]> = targets.into();
        for candidate in &deliveries {
            let message = Message::build(
                data.clone(),
                DeliveryOptions {
                    target: target.clone(),
                    current_target: &candidate.token,
                    publish: mode == Mode::Publish,
                    broadcast: mode == Mode::Broadcast,
                    source_timestamp,
                },
            );
            if self.inner.config.trace_deliveries {
                tracing::trace!(
                    id = %candidate.subscription.id,
                    channel = %candidate.token,
                    phase = ?message.event_phase(),
                    "delivering message"
                );
            }
            self.invoke(&candidate.subscription.listener, &message);
        }

        true
    }

    fn invoke(
        &self,
        listener: &Listener,
        message: &Message,
    ) {
        match self.inner.config.listener_panic_policy {
            ListenerPanicPolicy::Propagate => listener.call(message),
            ListenerPanicPolicy::Isolate => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener.call(message)));
                if let Err(payload) = outcome {
                    self.inner
                        .stats
                        .listener_panics
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        code = StatusCode::ListenerPanicked.code(),
                        channel = message.current_target(),
                        panic = panic_message(payload.as_ref()),
                        "listener panicked, continuing delivery"
                    );
                }
            }
        }
    }

    pub(crate) fn record_mirror(&self) {
        self.inner.stats.mirror_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Есть ли подписка ровно под этим каналом, glob-шаблоном или regex.
    pub fn has_subscribers<C: Into<ChannelSpec>>(
        &self,
        channel: C,
    ) -> bool {
        match TokenKey::from_spec(&channel.into()) {
            Ok(key) => self.inner.registry.read().contains(&key),
            Err(_) => false,
        }
    }

    /// Число живых подписок. Подписка на несколько каналов считается один
    /// раз.
    pub fn subscription_count(&self) -> usize {
        self.inner.registry.read().subscription_count()
    }

    /// Число каналов, шаблонов и regex, под которыми есть хотя бы одна
    /// подписка.
    pub fn channel_count(&self) -> usize {
        self.inner.registry.read().channel_count()
    }

    pub fn stats(&self) -> PubSubStats {
        let s = &self.inner.stats;
        PubSubStats {
            publish_count: s.publish_count.load(Ordering::Relaxed),
            broadcast_count: s.broadcast_count.load(Ordering::Relaxed),
            mirror_count: s.mirror_count.load(Ordering::Relaxed),
            delivery_count: s.delivery_count.load(Ordering::Relaxed),
            undelivered_count: s.undelivered_count.load(Ordering::Relaxed),
            listener_panics: s.listener_panics.load(Ordering::Relaxed),
        }
    }

    /// Делят ли два handle один реестр.
    pub fn same(
        &self,
        other: &PubSub,
    ) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for PubSub {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("PubSub")
            .field("config", &self.inner.config)
            .field("channels", &self.channel_count())
            .field("subscriptions", &self.subscription_count())
            .field("adapters", &self.inner.adapters.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
