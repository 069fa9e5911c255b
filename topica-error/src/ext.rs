use std::error::Error;

use crate::{LogLevel, StatusCode};

/// Расширение для ошибок диспетчера (object-safe).
///
/// Даёт статус-код ошибки и то, что из него выводится при логировании:
/// уровень, детальное сообщение и теги.
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// Статус-код ошибки.
    ///
    /// По умолчанию возвращает [`StatusCode::Internal`].
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }

    /// Уровень, с которым ошибку стоит писать в лог.
    fn log_level(&self) -> LogLevel {
        self.status_code().log_level()
    }

    /// Детализированное сообщение для логов.
    fn log_message(&self) -> String {
        format!("{self:?}")
    }

    /// Набор тегов (ключ, значение), сопровождающих запись в логе.
    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        vec![
            ("error_type", self.type_name()),
            ("status_code", self.status_code().to_string()),
        ]
    }

    /// Имя типа ошибки.
    fn type_name(&self) -> String {
        std::any::type_name::<Self>()
            .split("::")
            .last()
            .unwrap_or("Unknown")
            .to_string()
    }
}
