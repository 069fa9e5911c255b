use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use super::PubSubConfig;
use crate::logging::LoggingConfig;

/// Файл конфигурации, который `Settings::load` ищет в текущем каталоге.
pub const DEFAULT_CONFIG_FILE: &str = "topica.toml";

/// Настройки приложения: диспетчер и логирование.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pubsub: PubSubConfig,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Загружает значения по умолчанию, затем `topica.toml` (если есть),
    /// затем переменные окружения `TOPICA_*`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// То же, что [`Settings::load`], но с явным путём к файлу. Отсутствие
    /// файла ошибкой не считается.
    ///
    /// Вложенные ключи в окружении разделяются `__`:
    /// `TOPICA_PUBSUB__LISTENER_PANIC_POLICY=isolate`.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            // Значения по умолчанию
            .set_default("pubsub.default_base", "/")?
            .set_default("pubsub.listener_panic_policy", "propagate")?
            .set_default("pubsub.trace_deliveries", false)?
            .add_source(File::from(path.as_ref()).required(false))
            // Переменные окружения с префиксом TOPICA_
            .add_source(
                Environment::with_prefix("TOPICA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        cfg.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use std::{env, io::Write};

    use serial_test::serial;

    use super::*;
    use crate::config::ListenerPanicPolicy;

    /// Тест проверяет значения по умолчанию без файла и переменных окружения.
    #[test]
    #[serial]
    fn defaults_without_file() {
        let settings = Settings::load_from("/nonexistent/topica.toml").unwrap();
        assert_eq!(settings.pubsub, PubSubConfig::default());
        assert_eq!(settings.logging.level, "info");
    }

    /// Тест проверяет чтение TOML-файла.
    #[test]
    #[serial]
    fn reads_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[pubsub]\ndefault_base = \"/bridge\"\nlistener_panic_policy = \"isolate\"\n\n[logging]\nlevel = \"debug\"\n"
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.pubsub.default_base, "/bridge");
        assert_eq!(
            settings.pubsub.listener_panic_policy,
            ListenerPanicPolicy::Isolate
        );
        assert_eq!(settings.logging.level, "debug");
    }

    /// Тест проверяет, что переменные окружения перекрывают значения по
    /// умолчанию.
    #[test]
    #[serial]
    fn environment_overrides() {
        env::set_var("TOPICA_PUBSUB__TRACE_DELIVERIES", "true");
        let settings = Settings::load_from("/nonexistent/topica.toml");
        env::remove_var("TOPICA_PUBSUB__TRACE_DELIVERIES");

        assert!(settings.unwrap().pubsub.trace_deliveries);
    }
}
