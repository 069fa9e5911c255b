use tracing_appender::{
    non_blocking,
    non_blocking::WorkerGuard,
    rolling::{InitError, RollingFileAppender, Rotation},
};
use tracing_subscriber::{layer::Layer as LayerTrait, registry::LookupSpan};

use crate::logging::{
    config::{LoggingConfig, RotationPeriod},
    formatter,
};

impl From<RotationPeriod> for Rotation {
    fn from(period: RotationPeriod) -> Self {
        match period {
            RotationPeriod::Minutely => Rotation::MINUTELY,
            RotationPeriod::Hourly => Rotation::HOURLY,
            RotationPeriod::Daily => Rotation::DAILY,
            RotationPeriod::Never => Rotation::NEVER,
        }
    }
}

/// Неблокирующий файловый layer с ротацией.
///
/// Возвращаемый `WorkerGuard` нужно держать живым: при его drop буфер
/// сбрасывается на диск.
pub fn layer_with_config<S>(
    config: &LoggingConfig
) -> Result<(Box<dyn LayerTrait<S> + Send + Sync>, WorkerGuard), InitError>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let appender = RollingFileAppender::builder()
        .rotation(config.file.rotation.into())
        .filename_prefix(&config.file.filename)
        .build(&config.log_dir)?;
    let (writer, guard) = non_blocking(appender);

    let layer = formatter::build_formatter(&config.console, config.file.format, false, writer);
    Ok((layer, guard))
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::{prelude::*, registry::Registry};

    use super::*;

    /// Тест проверяет, что события попадают в файл после drop guard-а.
    #[test]
    fn writes_events_to_log_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = LoggingConfig {
            log_dir: tmp.path().to_path_buf(),
            ..Default::default()
        };
        cfg.file.enabled = true;
        cfg.file.rotation = RotationPeriod::Never;

        let (layer, guard) = layer_with_config::<Registry>(&cfg).unwrap();
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("file sink smoke test");
        });
        drop(guard);

        let content = std::fs::read_to_string(tmp.path().join("topica.log")).unwrap();
        assert!(content.contains("file sink smoke test"));
    }
}
