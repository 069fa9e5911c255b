//! Логирование на базе `tracing`: фильтр `EnvFilter`, консольный вывод в
//! json/pretty/compact и неблокирующий файловый sink с ротацией.

pub mod config;
mod filters;
mod formatter;
pub mod handle;
pub mod sinks;

pub use config::{ConsoleConfig, FileConfig, LogFormat, LoggingConfig, RotationPeriod};
pub use handle::{LoggingHandle, LoggingStats};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{PubSubError, Result};

/// Инициализация логирования с конфигурацией.
///
/// Устанавливает глобальный subscriber; повторный вызов возвращает
/// [`PubSubError::Config`].
pub fn init_logging(mut config: LoggingConfig) -> Result<LoggingHandle> {
    config.apply_env_overrides();
    config.validate().map_err(PubSubError::Config)?;
    config
        .ensure_log_dir()
        .map_err(|e| PubSubError::Config(format!("cannot create log dir: {e}")))?;

    let env_filter = filters::build_filter_from_config(&config);
    let mut layers = Vec::new();

    // Console layer
    if config.console.enabled {
        layers.push(sinks::console::layer_with_config(&config));
    }

    // File layer
    let file_guard = if config.file.enabled {
        let (file_layer, guard) = sinks::file::layer_with_config(&config)
            .map_err(|e| PubSubError::Config(format!("cannot open log file: {e}")))?;
        layers.push(file_layer);
        Some(guard)
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .map_err(|e| PubSubError::Config(format!("logging already initialized: {e}")))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        log_dir = %config.log_dir.display(),
        console_enabled = config.console.enabled,
        file_enabled = config.file.enabled,
        "Logging system initialized"
    );

    Ok(LoggingHandle::new(file_guard))
}
