use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use tracing_appender::non_blocking::WorkerGuard;

/// Состояние LoggingHandle, разделяемое с наблюдателями.
#[derive(Debug, Default)]
pub struct LoggingMetrics {
    /// Флаг активного shutdown
    pub shutdown_in_progress: AtomicBool,
}

/// Статистика логирования.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggingStats {
    pub has_file_sink: bool,
    pub shutdown_in_progress: bool,
}

impl LoggingMetrics {
    pub fn is_shutdown_in_progress(&self) -> bool {
        self.shutdown_in_progress.load(Ordering::Acquire)
    }

    fn start_shutdown(&self) {
        self.shutdown_in_progress.store(true, Ordering::Release);
    }
}

/// Handle для управления lifecycle логирования.
///
/// Держит `WorkerGuard` файлового sink-а; пока handle жив, фоновый поток
/// записи продолжает работать. Буфер сбрасывается только в
/// [`LoggingHandle::shutdown`] (или при drop handle).
#[derive(Debug)]
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
    pub metrics: Arc<LoggingMetrics>,
    /// Сколько можно ждать сброса при shutdown (по умолчанию 5 секунд)
    shutdown_timeout: Duration,
}

impl LoggingHandle {
    pub fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self {
            file_guard,
            metrics: Arc::new(LoggingMetrics::default()),
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    /// Устанавливает порог, после которого долгий shutdown попадает в stderr.
    pub fn with_shutdown_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }

    /// Graceful shutdown: отпускает `WorkerGuard`, который дописывает
    /// файловый буфер и останавливает фоновый поток.
    pub fn shutdown(mut self) {
        self.metrics.start_shutdown();
        tracing::info!(
            file_sink = self.has_file_sink(),
            timeout_secs = self.shutdown_timeout.as_secs(),
            "Initiating logging shutdown"
        );

        let start = Instant::now();
        drop(self.file_guard.take());
        let elapsed = start.elapsed();

        if elapsed > self.shutdown_timeout {
            eprintln!(
                "WARNING: Logging shutdown took {}ms (timeout: {}ms)",
                elapsed.as_millis(),
                self.shutdown_timeout.as_millis()
            );
        }
    }

    pub fn stats(&self) -> LoggingStats {
        LoggingStats {
            has_file_sink: self.has_file_sink(),
            shutdown_in_progress: self.metrics.is_shutdown_in_progress(),
        }
    }
}

impl Drop for LoggingHandle {
    fn drop(&mut self) {
        if self.file_guard.is_some() && !self.metrics.is_shutdown_in_progress() {
            eprintln!(
                "WARNING: LoggingHandle dropped without explicit shutdown(). \
                 Some logs may be lost. Call .shutdown() for graceful cleanup."
            )
        }
    }
}
