use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки pub/sub диспетчера.
///
/// Все варианты описывают нарушения входного контракта и возвращаются
/// синхронно в точке вызова; повторных попыток нет.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PubSubError {
    /// Канал не начинается с `/`.
    #[error("expected channel to start with '/', got '{channel}'")]
    ChannelFormat { channel: String },

    /// Канал допустимого формата, но недопустимого вида для этой операции
    /// (например, glob-шаблон в `publish`).
    #[error("channel '{channel}' is not allowed here: {reason}")]
    ChannelType { channel: String, reason: String },

    /// Glob-шаблон или регулярное выражение не компилируется.
    #[error("invalid channel pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Фильтр не является JSON-объектом.
    #[error("expected filter to be an object, got {found}")]
    FilterType { found: String },

    /// Фильтр содержит неизвестный оператор или некорректный операнд.
    #[error("invalid filter: {reason}")]
    InvalidFilter { reason: String },

    /// Слушатель не может быть вызван.
    #[error("expected listener to be callable: {reason}")]
    ListenerType { reason: String },

    /// Запрошенный по имени адаптер источника не зарегистрирован.
    #[error("source adapter '{name}' is not registered")]
    UnknownSourceAdapter { name: String },

    /// Ни один адаптер не подошёл к источнику событий.
    #[error("no registered source adapter supports this emitter")]
    NoSourceAdapter,

    /// Источник не поддерживает запрошенный метод подписки.
    #[error("emitter does not support subscription method '{method}'")]
    SourceUnsupported { method: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl PubSubError {
    pub fn channel_format(channel: impl Into<String>) -> Self {
        Self::ChannelFormat {
            channel: channel.into(),
        }
    }

    pub fn channel_type(
        channel: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ChannelType {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_filter(reason: impl Into<String>) -> Self {
        Self::InvalidFilter {
            reason: reason.into(),
        }
    }
}

impl ErrorExt for PubSubError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ChannelFormat { .. } => StatusCode::InvalidChannel,
            Self::ChannelType { .. } => StatusCode::ChannelTypeMismatch,
            Self::InvalidPattern { .. } => StatusCode::InvalidPattern,
            Self::FilterType { .. } => StatusCode::FilterNotObject,
            Self::InvalidFilter { .. } => StatusCode::InvalidFilter,
            Self::ListenerType { .. } => StatusCode::InvalidListener,
            Self::UnknownSourceAdapter { .. } => StatusCode::AdapterNotFound,
            Self::NoSourceAdapter => StatusCode::NoAdapterMatched,
            Self::SourceUnsupported { .. } => StatusCode::SourceUnsupported,
            Self::Config(_) => StatusCode::ConfigError,
        }
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "pubsub".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        match self {
            Self::ChannelFormat { channel } | Self::ChannelType { channel, .. } => {
                tags.push(("channel", channel.clone()));
            }
            Self::InvalidPattern { pattern, .. } => {
                tags.push(("pattern", pattern.clone()));
            }
            Self::UnknownSourceAdapter { name } => {
                tags.push(("adapter", name.clone()));
            }
            _ => {}
        }

        tags
    }
}

// === Преобразования ===

impl From<globset::Error> for PubSubError {
    fn from(err: globset::Error) -> Self {
        PubSubError::InvalidPattern {
            pattern: err.glob().unwrap_or_default().to_string(),
            reason: err.kind().to_string(),
        }
    }
}

/// Регулярные выражения из строк компилируются только в операторе
/// `$regex`, поэтому ошибка относится к фильтру.
impl From<regex::Error> for PubSubError {
    fn from(err: regex::Error) -> Self {
        PubSubError::InvalidFilter {
            reason: format!("'$regex' is not a valid regex: {err}"),
        }
    }
}
