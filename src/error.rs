//! Типы ошибок крейта.
//!
//! Сама таксономия живёт в крейте `topica-error`; модуль реэкспортирует её
//! вместе с псевдонимом `Result`.

pub use topica_error::{ErrorExt, LogLevel, PubSubError, StatusCode};

pub type Result<T> = std::result::Result<T, PubSubError>;

/// Пишет ошибку, которую некому вернуть, с уровнем из её статус-кода.
pub(crate) fn log_error(
    err: &dyn ErrorExt,
    context: &str,
) {
    let code = err.status_code().code();
    let tags = err.metrics_tags();
    let detail = err.log_message();
    match err.log_level() {
        LogLevel::Trace => tracing::trace!(code, ?tags, %err, %detail, "{context}"),
        LogLevel::Debug => tracing::debug!(code, ?tags, %err, %detail, "{context}"),
        LogLevel::Info => tracing::info!(code, ?tags, %err, %detail, "{context}"),
        LogLevel::Warn => tracing::warn!(code, ?tags, %err, %detail, "{context}"),
        LogLevel::Error => tracing::error!(code, ?tags, %err, %detail, "{context}"),
    }
}
