use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "serde_repr")]
use serde_repr::{Deserialize_repr, Serialize_repr};
#[cfg(feature = "strum")]
use strum_macros::{AsRefStr, EnumIter};

/// Коды статуса для категоризации ошибок.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки
/// - 2xxx: Ошибки каналов
/// - 3xxx: Ошибки фильтров
/// - 4xxx: Слушатели и доставка
/// - 5xxx: Источники событий (mirror/source)
/// - 6xxx: Конфигурация
#[cfg_attr(feature = "strum", derive(AsRefStr, EnumIter))]
#[cfg_attr(feature = "serde_repr", derive(Serialize_repr, Deserialize_repr))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unsupported = 1001,
    Internal = 1003,
    InvalidArgs = 1004,

    // === 2xxx: Каналы ===
    InvalidChannel = 2000,
    ChannelTypeMismatch = 2001,
    InvalidPattern = 2002,

    // === 3xxx: Фильтры ===
    FilterNotObject = 3000,
    InvalidFilter = 3001,

    // === 4xxx: Слушатели ===
    InvalidListener = 4000,
    ListenerPanicked = 4001,

    // === 5xxx: Источники ===
    AdapterNotFound = 5000,
    NoAdapterMatched = 5001,
    SourceUnsupported = 5002,

    // === 6xxx: Конфигурация ===
    ConfigError = 6000,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Пытается получить вариант `StatusCode` из `u32`.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Вернёт `true`, если переданный `code` означает успешный результат.
    pub fn is_success(code: u32) -> bool {
        Self::Success as u32 == code
    }

    /// Ошибка во входных данных вызывающей стороны (каналы, фильтры,
    /// слушатели).
    pub fn is_input_error(&self) -> bool {
        let c = self.code();
        if (2000..=4000).contains(&c) {
            return true;
        }
        matches!(self, Self::InvalidArgs)
    }

    /// Ошибка подключения внешнего источника событий (диапазон 5xxx).
    pub fn is_source_error(&self) -> bool {
        (5000..=5999).contains(&self.code())
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::InvalidChannel
            | Self::ChannelTypeMismatch
            | Self::InvalidPattern
            | Self::FilterNotObject
            | Self::InvalidFilter
            | Self::InvalidListener
            | Self::InvalidArgs => LogLevel::Debug,
            Self::AdapterNotFound | Self::NoAdapterMatched | Self::SourceUnsupported => {
                LogLevel::Warn
            }
            Self::ListenerPanicked | Self::Internal | Self::ConfigError => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        #[cfg(feature = "strum")]
        {
            write!(f, "{} ({})", self.as_ref(), self.code())
        }
        #[cfg(not(feature = "strum"))]
        {
            write!(f, "{:?} ({})", self, self.code())
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
